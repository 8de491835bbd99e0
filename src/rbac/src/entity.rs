//! Entities subject to instance-level checks
//!
//! Entity-scoped permissions carry a type tag (`Permission::model`). An
//! entity matches such a permission when its own tag is equal to it. Tags are
//! explicit strings chosen by the application, never derived from Rust type
//! names, so they stay stable across refactors and builds.

use crate::error::{RbacError, Result};
use crate::types::SubjectId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;

/// An entity instance the subject wants to act on
pub trait Entity: Send + Sync {
    /// Stable type tag matched against `Permission::model`
    fn type_tag(&self) -> &str;

    /// Value of the owner column, if present and numeric
    fn owner_id(&self, column: &str) -> Option<SubjectId>;
}

/// Dynamic entity backed by an attribute map
///
/// Owner values may be JSON numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity type tag
    #[serde(rename = "type")]
    pub type_tag: String,

    /// Entity attributes (owner column, etc.)
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl EntityRecord {
    /// Create a new entity record
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute to the entity
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Convenience for the conventional `user_id` owner column
    pub fn owned_by(self, owner: SubjectId) -> Self {
        self.with_attribute("user_id", owner)
    }
}

impl Entity for EntityRecord {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn owner_id(&self, column: &str) -> Option<SubjectId> {
        match self.attributes.get(column)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Registry mapping Rust types to stable entity type tags
///
/// Lets applications keep a single table of tags for their typed models and
/// implement [`Entity::type_tag`] by looking it up.
#[derive(Debug, Default)]
pub struct EntityTypeRegistry {
    tags: DashMap<TypeId, String>,
}

impl EntityTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tag for `T`
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is empty, if `T` is already registered, or
    /// if another type already uses the tag.
    pub fn register<T: 'static>(&self, tag: impl Into<String>) -> Result<()> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(RbacError::InvalidInput(
                "Entity type tag cannot be empty".to_string(),
            ));
        }
        if self.tags.iter().any(|entry| entry.value() == &tag) {
            return Err(RbacError::InvalidInput(format!(
                "Entity type tag '{}' is already registered",
                tag
            )));
        }

        match self.tags.entry(TypeId::of::<T>()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                Err(RbacError::InvalidInput(format!(
                    "Type {} is already registered as '{}'",
                    std::any::type_name::<T>(),
                    existing.get()
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tag);
                Ok(())
            }
        }
    }

    /// Tag registered for `T`
    pub fn tag_of<T: 'static>(&self) -> Option<String> {
        self.tags.get(&TypeId::of::<T>()).map(|tag| tag.clone())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
