//! Error types for the RBAC core

use crate::graph::GraphError;
use thiserror::Error;

/// RBAC errors
///
/// A failed role or permission check is never an error by itself: query
/// functions return `Ok(false)`. The `*Denied` variants are only produced by
/// the `require_*` guards, which turn a negative answer into a rejection that
/// carries the requested identifiers.
#[derive(Debug, Error)]
pub enum RbacError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed role or permission reference
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Role not found in the store
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Permission not found in the store
    #[error("Permission not found: {0}")]
    PermissionNotFound(String),

    /// Role graph error
    #[error("Role graph error: {0}")]
    Graph(#[from] GraphError),

    /// Assignment store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Subject lacks the requested role(s)
    #[error("You don't have a required [{0}] role.")]
    RoleDenied(String),

    /// Subject lacks the requested permission(s)
    #[error("You don't have a required [{0}] permission.")]
    PermissionDenied(String),

    /// Subject may not act on the entity
    #[error("You are not allowed to [{permission}] on entity of type [{entity_type}].")]
    EntityDenied {
        permission: String,
        entity_type: String,
    },

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RbacError {
    /// Returns true for the access-denied family of errors
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            Self::RoleDenied(_) | Self::PermissionDenied(_) | Self::EntityDenied { .. }
        )
    }
}

/// Result type for RBAC operations
pub type Result<T> = std::result::Result<T, RbacError>;
