//! Assignment storage
//!
//! The RBAC core does not persist anything itself. Role and permission
//! records, the role hierarchy and per-subject assignments are read through
//! the [`AssignmentStore`] trait, which a host application implements on top
//! of its database. [`InMemoryAssignmentStore`] is the reference
//! implementation used by tests and embedded deployments.

use crate::error::{RbacError, Result};
use crate::graph::RoleGraph;
use crate::types::{
    Permission, PermissionAssignment, PermissionId, Role, RoleAssignment, RoleId, SubjectId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Assignment store trait
///
/// Write operations return the number of assignment rows affected.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Role assignments of a subject as `(role, granted)` pairs
    async fn role_assignments(&self, subject: SubjectId) -> Result<Vec<(RoleId, bool)>>;

    /// Direct permission assignments of a subject as `(permission, granted)` pairs
    async fn permission_assignments(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<(PermissionId, bool)>>;

    /// Get a role by ID
    async fn role(&self, id: RoleId) -> Result<Option<Role>>;

    /// Get a permission by ID
    async fn permission(&self, id: PermissionId) -> Result<Option<Permission>>;

    /// Direct children of a role
    async fn role_children(&self, id: RoleId) -> Result<Vec<RoleId>>;

    /// Permissions attached directly to a role
    async fn role_permissions(&self, id: RoleId) -> Result<Vec<PermissionId>>;

    /// Record a role assignment unless one with the same polarity exists
    async fn attach_role_assignment(
        &self,
        subject: SubjectId,
        role: RoleId,
        granted: bool,
    ) -> Result<u64>;

    /// Remove assignments of `role`, or every role assignment when `None`
    async fn detach_role_assignment(&self, subject: SubjectId, role: Option<RoleId>)
        -> Result<u64>;

    /// Record a permission assignment unless one with the same polarity exists
    async fn attach_permission_assignment(
        &self,
        subject: SubjectId,
        permission: PermissionId,
        granted: bool,
    ) -> Result<u64>;

    /// Remove assignments of `permission`, or every permission assignment when `None`
    async fn detach_permission_assignment(
        &self,
        subject: SubjectId,
        permission: Option<PermissionId>,
    ) -> Result<u64>;
}

/// Role and permission records plus the hierarchy
#[derive(Debug, Default)]
struct Catalog {
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    children: HashMap<RoleId, Vec<RoleId>>,
    role_permissions: HashMap<RoleId, Vec<PermissionId>>,
}

impl Catalog {
    fn graph(&self) -> RoleGraph {
        let mut graph = RoleGraph::new();
        for (parent, children) in &self.children {
            graph.insert_node(*parent);
            for child in children {
                graph.insert_edge(*parent, *child);
            }
        }
        graph
    }
}

/// Per-subject assignment rows
#[derive(Debug, Default)]
struct Assignments {
    roles: Vec<RoleAssignment>,
    permissions: Vec<PermissionAssignment>,
}

/// In-memory assignment store implementation
#[derive(Clone, Default)]
pub struct InMemoryAssignmentStore {
    catalog: Arc<RwLock<Catalog>>,
    assignments: Arc<RwLock<Assignments>>,
}

impl InMemoryAssignmentStore {
    /// Create a new in-memory assignment store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a role, rejecting duplicate ids and slugs
    pub async fn insert_role(&self, role: Role) -> Result<()> {
        role.validate()?;

        let mut catalog = self.catalog.write().await;
        if catalog.roles.contains_key(&role.id) {
            return Err(RbacError::InvalidInput(format!("Duplicate role id: {}", role.id)));
        }
        if catalog.roles.values().any(|r| r.slug == role.slug) {
            return Err(RbacError::InvalidInput(format!(
                "Duplicate role slug: {}",
                role.slug
            )));
        }

        debug!("Inserting role {} ({})", role.id, role.slug);
        catalog.roles.insert(role.id, role);
        Ok(())
    }

    /// Store a permission, rejecting duplicate ids and slugs
    pub async fn insert_permission(&self, permission: Permission) -> Result<()> {
        permission.validate()?;

        let mut catalog = self.catalog.write().await;
        if catalog.permissions.contains_key(&permission.id) {
            return Err(RbacError::InvalidInput(format!(
                "Duplicate permission id: {}",
                permission.id
            )));
        }
        if catalog.permissions.values().any(|p| p.slug == permission.slug) {
            return Err(RbacError::InvalidInput(format!(
                "Duplicate permission slug: {}",
                permission.slug
            )));
        }

        debug!("Inserting permission {} ({})", permission.id, permission.slug);
        catalog.permissions.insert(permission.id, permission);
        Ok(())
    }

    /// Make `child` a descendant of `parent`
    ///
    /// Rejects unknown roles and edges that would close a cycle.
    pub async fn add_child(&self, parent: RoleId, child: RoleId) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        for role in [parent, child] {
            if !catalog.roles.contains_key(&role) {
                return Err(RbacError::RoleNotFound(role.to_string()));
            }
        }

        // Check the graph as it would look with the new edge
        let mut graph = catalog.graph();
        graph.insert_edge(parent, child);
        graph.detect_cycles()?;

        let children = catalog.children.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
        Ok(())
    }

    /// Attach a permission to a role
    pub async fn grant_permission_to_role(
        &self,
        role: RoleId,
        permission: PermissionId,
    ) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        if !catalog.roles.contains_key(&role) {
            return Err(RbacError::RoleNotFound(role.to_string()));
        }
        if !catalog.permissions.contains_key(&permission) {
            return Err(RbacError::PermissionNotFound(permission.to_string()));
        }

        let permissions = catalog.role_permissions.entry(role).or_default();
        if !permissions.contains(&permission) {
            permissions.push(permission);
        }
        Ok(())
    }

    /// Look up a role by slug
    pub async fn role_by_slug(&self, slug: &str) -> Option<Role> {
        let catalog = self.catalog.read().await;
        catalog.roles.values().find(|r| r.slug == slug).cloned()
    }

    /// Look up a permission by slug
    pub async fn permission_by_slug(&self, slug: &str) -> Option<Permission> {
        let catalog = self.catalog.read().await;
        catalog.permissions.values().find(|p| p.slug == slug).cloned()
    }

    /// All role assignment rows of a subject
    pub async fn role_rows(&self, subject: SubjectId) -> Vec<RoleAssignment> {
        let assignments = self.assignments.read().await;
        assignments
            .roles
            .iter()
            .filter(|a| a.subject == subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn role_assignments(&self, subject: SubjectId) -> Result<Vec<(RoleId, bool)>> {
        let assignments = self.assignments.read().await;
        Ok(assignments
            .roles
            .iter()
            .filter(|a| a.subject == subject)
            .map(|a| (a.target, a.granted))
            .collect())
    }

    async fn permission_assignments(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<(PermissionId, bool)>> {
        let assignments = self.assignments.read().await;
        Ok(assignments
            .permissions
            .iter()
            .filter(|a| a.subject == subject)
            .map(|a| (a.target, a.granted))
            .collect())
    }

    async fn role(&self, id: RoleId) -> Result<Option<Role>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.roles.get(&id).cloned())
    }

    async fn permission(&self, id: PermissionId) -> Result<Option<Permission>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.permissions.get(&id).cloned())
    }

    async fn role_children(&self, id: RoleId) -> Result<Vec<RoleId>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.children.get(&id).cloned().unwrap_or_default())
    }

    async fn role_permissions(&self, id: RoleId) -> Result<Vec<PermissionId>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.role_permissions.get(&id).cloned().unwrap_or_default())
    }

    async fn attach_role_assignment(
        &self,
        subject: SubjectId,
        role: RoleId,
        granted: bool,
    ) -> Result<u64> {
        let mut assignments = self.assignments.write().await;
        let exists = assignments
            .roles
            .iter()
            .any(|a| a.subject == subject && a.target == role && a.granted == granted);

        if exists {
            return Ok(0);
        }

        assignments
            .roles
            .push(RoleAssignment::new(subject, role, granted));
        Ok(1)
    }

    async fn detach_role_assignment(
        &self,
        subject: SubjectId,
        role: Option<RoleId>,
    ) -> Result<u64> {
        let mut assignments = self.assignments.write().await;
        let before = assignments.roles.len();
        assignments
            .roles
            .retain(|a| !(a.subject == subject && role.map_or(true, |r| r == a.target)));
        Ok((before - assignments.roles.len()) as u64)
    }

    async fn attach_permission_assignment(
        &self,
        subject: SubjectId,
        permission: PermissionId,
        granted: bool,
    ) -> Result<u64> {
        let mut assignments = self.assignments.write().await;
        let exists = assignments
            .permissions
            .iter()
            .any(|a| a.subject == subject && a.target == permission && a.granted == granted);

        if exists {
            return Ok(0);
        }

        assignments
            .permissions
            .push(PermissionAssignment::new(subject, permission, granted));
        Ok(1)
    }

    async fn detach_permission_assignment(
        &self,
        subject: SubjectId,
        permission: Option<PermissionId>,
    ) -> Result<u64> {
        let mut assignments = self.assignments.write().await;
        let before = assignments.permissions.len();
        assignments
            .permissions
            .retain(|a| !(a.subject == subject && permission.map_or(true, |p| p == a.target)));
        Ok((before - assignments.permissions.len()) as u64)
    }
}
