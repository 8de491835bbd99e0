//! Named queries
//!
//! Host frameworks often expose checks as method-like names such as
//! `isAdmin`, `canEditPosts` or `allowedUpdatePost`. These are mapped to a
//! query kind and a target slug here, explicitly, and then executed through
//! [`Authorizer::dispatch`](super::Authorizer::dispatch).

use crate::config::QueryKind;
use std::collections::HashMap;

/// A parsed named query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    /// Which query to run
    pub kind: QueryKind,
    /// Role or permission slug to check
    pub target: String,
}

impl NamedQuery {
    pub fn new(kind: QueryKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }

    /// Parse a method-like name
    ///
    /// `is` maps to a role query, `can` to a permission query and `allowed`
    /// to an entity query. The CamelCase remainder becomes the slug, words
    /// joined by `separator`: `canEditPosts` with `.` is `edit.posts`.
    pub fn parse(name: &str, separator: char) -> Option<Self> {
        let (kind, rest) = if let Some(rest) = name.strip_prefix("is") {
            (QueryKind::RoleIs, rest)
        } else if let Some(rest) = name.strip_prefix("can") {
            (QueryKind::May, rest)
        } else if let Some(rest) = name.strip_prefix("allowed") {
            (QueryKind::Allowed, rest)
        } else {
            return None;
        };

        let target = snake_case(rest, separator);
        if target.is_empty() {
            return None;
        }

        Some(Self::new(kind, target))
    }
}

/// Convert CamelCase to lowercase words joined by `separator`
///
/// A separator is inserted before every uppercase letter that follows
/// another character. Whitespace separates words too: a letter starting a
/// new word counts as uppercase, then the whitespace is dropped.
pub fn snake_case(value: &str, separator: char) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut word_start = true;

    for ch in value.chars() {
        if ch.is_whitespace() {
            word_start = true;
            continue;
        }

        let boundary = ch.is_uppercase() || (word_start && ch.is_lowercase());
        if boundary && !out.is_empty() {
            out.push(separator);
        }
        word_start = false;
        out.extend(ch.to_lowercase());
    }

    out
}

/// Lookup table of explicitly registered names
///
/// Registered names take precedence over [`NamedQuery::parse`].
#[derive(Debug, Clone)]
pub struct QueryTable {
    separator: char,
    entries: HashMap<String, NamedQuery>,
}

impl QueryTable {
    pub fn new(separator: char) -> Self {
        Self {
            separator,
            entries: HashMap::new(),
        }
    }

    /// Register an alias
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: QueryKind,
        target: impl Into<String>,
    ) -> &mut Self {
        self.entries.insert(name.into(), NamedQuery::new(kind, target));
        self
    }

    /// Resolve a name to a query
    pub fn resolve(&self, name: &str) -> Option<NamedQuery> {
        self.entries
            .get(name)
            .cloned()
            .or_else(|| NamedQuery::parse(name, self.separator))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
