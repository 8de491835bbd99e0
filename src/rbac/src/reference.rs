//! Role and permission references
//!
//! Callers name roles and permissions by numeric id, by slug (optionally a
//! wildcard pattern such as `admin.*`), or by a list of either. Strings may
//! carry several references separated by `,` or `|`:
//!
//! ```
//! use cretoai_rbac::Reference;
//!
//! let refs = Reference::from("admin | editor,moderator").flatten();
//! assert_eq!(refs.len(), 3);
//! ```

use crate::types::PermissionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to one or more roles or permissions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    /// Match by numeric identifier
    Id(u64),
    /// Match by slug pattern (`*` matches any run of characters)
    Slug(String),
    /// Several references
    Many(Vec<Reference>),
}

impl Reference {
    /// Parse a delimiter-separated string of references
    ///
    /// Elements are separated by `,` or `|`, each delimiter optionally
    /// surrounded by a single space. A single element yields a non-list value.
    pub fn parse(input: &str) -> Self {
        let mut parts: Vec<Reference> = input
            .split([',', '|'])
            .map(|part| {
                let part = part.strip_prefix(' ').unwrap_or(part);
                let part = part.strip_suffix(' ').unwrap_or(part);
                Reference::Slug(part.to_string())
            })
            .collect();

        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Reference::Many(parts)
        }
    }

    /// Flatten into a list of single references
    ///
    /// Empty slugs are kept: they never match, so an empty element makes an
    /// all-of check fail instead of being skipped.
    pub fn flatten(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Reference>) {
        match self {
            Reference::Id(_) | Reference::Slug(_) => out.push(self.clone()),
            Reference::Many(refs) => refs.iter().for_each(|r| r.flatten_into(out)),
        }
    }

    /// Whether this reference matches a record with the given id and slug
    ///
    /// A list matches if any of its elements match. A slug pattern also
    /// matches when it equals the record id written in decimal.
    pub fn matches(&self, id: u64, slug: &str) -> bool {
        match self {
            Reference::Id(expected) => *expected == id,
            Reference::Slug(pattern) => {
                !pattern.is_empty()
                    && (matches_pattern(pattern, slug) || pattern.parse::<u64>() == Ok(id))
            }
            Reference::Many(refs) => refs.iter().any(|r| r.matches(id, slug)),
        }
    }

}

/// A single permission, named by id or exact slug
///
/// Entity checks take exactly one permission. Strings are used verbatim:
/// `"post.update,post.delete"` is one (unknown) slug, not a list, and `*`
/// is not expanded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    Id(PermissionId),
    Slug(String),
}

impl PermissionRef {
    /// Whether this is an empty slug, which never matches
    pub fn is_empty(&self) -> bool {
        matches!(self, PermissionRef::Slug(slug) if slug.is_empty())
    }

    /// Exact match on id or slug; a numeric slug also matches the id
    pub fn matches(&self, id: PermissionId, slug: &str) -> bool {
        match self {
            PermissionRef::Id(expected) => *expected == id,
            PermissionRef::Slug(value) => {
                !value.is_empty() && (value == slug || value.parse::<u64>() == Ok(id))
            }
        }
    }
}

/// Match a slug against a pattern where `*` matches any run of characters
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if pattern.contains('*') {
        let regex_pattern = regex::escape(pattern).replace(r"\*", ".*");
        if let Ok(regex) = regex::Regex::new(&format!("^{}$", regex_pattern)) {
            return regex.is_match(value);
        }
    }

    pattern == value
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Id(id) => write!(f, "{}", id),
            Reference::Slug(slug) => f.write_str(slug),
            Reference::Many(refs) => {
                for (idx, r) in refs.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", r)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for PermissionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionRef::Id(id) => write!(f, "{}", id),
            PermissionRef::Slug(slug) => f.write_str(slug),
        }
    }
}

impl From<PermissionId> for PermissionRef {
    fn from(id: PermissionId) -> Self {
        PermissionRef::Id(id)
    }
}

impl From<&str> for PermissionRef {
    fn from(slug: &str) -> Self {
        PermissionRef::Slug(slug.to_string())
    }
}

impl From<String> for PermissionRef {
    fn from(slug: String) -> Self {
        PermissionRef::Slug(slug)
    }
}

impl From<&String> for PermissionRef {
    fn from(slug: &String) -> Self {
        PermissionRef::Slug(slug.clone())
    }
}

impl From<u64> for Reference {
    fn from(id: u64) -> Self {
        Reference::Id(id)
    }
}

impl From<&str> for Reference {
    fn from(input: &str) -> Self {
        Reference::parse(input)
    }
}

impl From<String> for Reference {
    fn from(input: String) -> Self {
        Reference::parse(&input)
    }
}

impl From<&String> for Reference {
    fn from(input: &String) -> Self {
        Reference::parse(input)
    }
}

impl<T: Into<Reference>> From<Vec<T>> for Reference {
    fn from(items: Vec<T>) -> Self {
        Reference::Many(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Reference> + Clone> From<&[T]> for Reference {
    fn from(items: &[T]) -> Self {
        Reference::Many(items.iter().cloned().map(Into::into).collect())
    }
}
