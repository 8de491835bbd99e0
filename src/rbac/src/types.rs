//! Core RBAC types

use crate::error::{RbacError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique role identifier
pub type RoleId = u64;

/// Unique permission identifier
pub type PermissionId = u64;

/// Unique subject (user) identifier
pub type SubjectId = u64;

/// Role definition
///
/// Roles form a descendant hierarchy: a parent role grants everything its
/// descendants grant. The edges themselves live in the assignment store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    /// Unique role identifier
    pub id: RoleId,

    /// Unique, identifier-safe key (e.g., "admin.billing")
    pub slug: String,

    /// Human readable name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Informational level, higher is more privileged
    #[serde(default)]
    pub level: i32,
}

impl Role {
    /// Create a role, deriving the slug from the name with the default separator
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            slug: slugify(&name, '.'),
            name,
            description: None,
            level: 1,
        }
    }

    /// Override the generated slug
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Validate the role definition
    pub fn validate(&self) -> Result<()> {
        if self.slug.is_empty() {
            return Err(RbacError::InvalidInput(format!(
                "Role {} has an empty slug",
                self.id
            )));
        }
        if self.slug.contains(['*', ',', '|']) || self.slug.contains(char::is_whitespace) {
            return Err(RbacError::InvalidInput(format!(
                "Role slug '{}' contains reserved characters",
                self.slug
            )));
        }
        Ok(())
    }
}

/// Permission definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Unique permission identifier
    pub id: PermissionId,

    /// Unique, identifier-safe key (e.g., "posts.edit")
    pub slug: String,

    /// Human readable name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Entity-type tag this permission is scoped to (empty = not entity-scoped)
    #[serde(default)]
    pub model: String,
}

impl Permission {
    /// Create a permission, deriving the slug from the name with the default separator
    pub fn new(id: PermissionId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            slug: slugify(&name, '.'),
            name,
            description: None,
            model: String::new(),
        }
    }

    /// Override the generated slug
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Scope this permission to an entity type tag
    pub fn for_entity(mut self, type_tag: impl Into<String>) -> Self {
        self.model = type_tag.into();
        self
    }

    /// The entity-type tag, if this permission is entity-scoped
    pub fn entity_type(&self) -> Option<&str> {
        if self.model.is_empty() {
            None
        } else {
            Some(&self.model)
        }
    }

    /// Validate the permission definition
    pub fn validate(&self) -> Result<()> {
        if self.slug.is_empty() {
            return Err(RbacError::InvalidInput(format!(
                "Permission {} has an empty slug",
                self.id
            )));
        }
        if self.slug.contains(['*', ',', '|']) || self.slug.contains(char::is_whitespace) {
            return Err(RbacError::InvalidInput(format!(
                "Permission slug '{}' contains reserved characters",
                self.slug
            )));
        }
        Ok(())
    }
}

/// Assignment of a role or permission to a subject
///
/// `granted = false` is an explicit deny, which is not the same thing as the
/// assignment being absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment<T> {
    /// Subject the assignment belongs to
    pub subject: SubjectId,

    /// Role or permission identifier
    pub target: T,

    /// Grant (true) or deny (false)
    pub granted: bool,

    /// When the assignment was recorded
    pub created_at: DateTime<Utc>,
}

impl<T> Assignment<T> {
    pub fn new(subject: SubjectId, target: T, granted: bool) -> Self {
        Self {
            subject,
            target,
            granted,
            created_at: Utc::now(),
        }
    }
}

/// Role assignment row
pub type RoleAssignment = Assignment<RoleId>;

/// Permission assignment row
pub type PermissionAssignment = Assignment<PermissionId>;

/// Build an identifier-safe slug from a display name
///
/// Lowercases ASCII letters and collapses every run of other characters into
/// a single `separator`. Leading and trailing separators are trimmed.
pub fn slugify(name: &str, separator: char) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push(separator);
            }
            pending_separator = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}
