//! # CretoAI RBAC Core
//!
//! Role and permission resolution for subjects (users, service accounts).
//!
//! ## Features
//!
//! - **Role hierarchy** with descendant closure over a DAG of roles
//! - **Grant / deny assignments** where deny always wins, at any depth
//! - **Direct permission overrides** on top of role permissions
//! - **Entity-level checks** with ownership bypass and type-scoped permissions
//! - **Simulation mode** for deterministic tests, configured per authorizer
//! - **Async-first design**: storage is an injected `AssignmentStore`
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::{Authorizer, InMemoryAssignmentStore, Permission, RbacConfig, Role};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryAssignmentStore::new();
//! store.insert_role(Role::new(1, "admin")).await?;
//! store.insert_role(Role::new(2, "editor")).await?;
//! store.add_child(1, 2).await?;
//! store.insert_permission(Permission::new(10, "posts.edit")).await?;
//! store.grant_permission_to_role(2, 10).await?;
//!
//! let authz = Authorizer::new(7, Arc::new(store), Arc::new(RbacConfig::default()));
//! authz.attach_role(1, true).await?;
//!
//! assert!(authz.role_is("admin|editor", true).await?);
//! assert!(authz.may("posts.edit", false).await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod graph;
pub mod reference;
pub mod resolver;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{PretendConfig, PretendOptions, QueryKind, RbacConfig};
pub use engine::{
    Authorizable, Authorizer, NamedQuery, QueryMetrics, QueryMetricsSnapshot, QueryTable,
    DEFAULT_OWNER_COLUMN,
};
pub use entity::{Entity, EntityRecord, EntityTypeRegistry};
pub use error::{RbacError, Result};
pub use graph::{GraphError, RoleGraph, RoleGraphBuilder};
pub use reference::{PermissionRef, Reference};
pub use resolver::{EffectiveSetResolver, PermissionSet, RoleSet};
pub use store::{AssignmentStore, InMemoryAssignmentStore};
pub use types::{
    Assignment, Permission, PermissionAssignment, PermissionId, Role, RoleAssignment, RoleId,
    SubjectId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
