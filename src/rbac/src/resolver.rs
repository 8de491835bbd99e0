//! Effective role and permission resolution
//!
//! Resolution for one subject:
//!
//! ```text
//! granted roles ─┐                    ┌─ denied roles
//!                ▼                    ▼
//!        closure(granted)  −  closure(denied)   = effective roles
//!                │
//!                ▼
//!     role permissions ∪ direct grants − direct denies = effective permissions
//! ```
//!
//! Deny always wins over grant, at any depth of the hierarchy. A role or
//! permission with no assignment at all is simply not granted; absence never
//! revokes something granted through another path.
//!
//! Both sets are computed on first use and memoized for the lifetime of the
//! resolver. Later assignment changes are not picked up by a live resolver;
//! build a new one to observe them.

use crate::engine::metrics::QueryMetrics;
use crate::error::Result;
use crate::graph::RoleGraph;
use crate::store::AssignmentStore;
use crate::types::{Permission, PermissionId, Role, RoleId, SubjectId};
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Resolved roles keyed by id
pub type RoleSet = BTreeMap<RoleId, Role>;

/// Resolved permissions keyed by id
pub type PermissionSet = BTreeMap<PermissionId, Permission>;

/// Cached outcome of role resolution
#[derive(Debug, Clone, Default)]
struct RoleResolution {
    roles: RoleSet,
    denied_closure: HashSet<RoleId>,
}

/// Per-subject resolver with compute-once caches
///
/// Concurrent first access from several tasks performs the resolution once;
/// the other callers wait for the result.
pub struct EffectiveSetResolver {
    subject: SubjectId,
    store: Arc<dyn AssignmentStore>,
    roles: OnceCell<RoleResolution>,
    permissions: OnceCell<PermissionSet>,
    metrics: Option<Arc<QueryMetrics>>,
}

impl EffectiveSetResolver {
    /// Create a resolver for a subject
    pub fn new(subject: SubjectId, store: Arc<dyn AssignmentStore>) -> Self {
        Self {
            subject,
            store,
            roles: OnceCell::new(),
            permissions: OnceCell::new(),
            metrics: None,
        }
    }

    /// Record resolution loads in the given metrics collector
    pub fn with_metrics(mut self, metrics: Arc<QueryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The subject this resolver answers for
    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    /// The backing assignment store
    pub fn store(&self) -> &Arc<dyn AssignmentStore> {
        &self.store
    }

    /// Whether role resolution has already run
    pub fn is_resolved(&self) -> bool {
        self.roles.initialized()
    }

    /// Effective roles: granted roles and their descendants minus the denied closure
    pub async fn effective_roles(&self) -> Result<&RoleSet> {
        Ok(&self.role_resolution().await?.roles)
    }

    /// Denied roles together with all of their descendants
    pub async fn denied_closure(&self) -> Result<&HashSet<RoleId>> {
        Ok(&self.role_resolution().await?.denied_closure)
    }

    /// Union of the permissions attached to every effective role
    pub async fn role_permissions(&self) -> Result<PermissionSet> {
        let roles = self.effective_roles().await?;

        let per_role = try_join_all(roles.keys().map(|id| self.store.role_permissions(*id))).await?;
        let ids: BTreeSet<PermissionId> = per_role.into_iter().flatten().collect();

        self.load_permissions(ids).await
    }

    /// Effective permissions: role permissions and direct grants minus direct denies
    pub async fn effective_permissions(&self) -> Result<&PermissionSet> {
        self.permissions
            .get_or_try_init(|| self.resolve_permissions())
            .await
    }

    async fn role_resolution(&self) -> Result<&RoleResolution> {
        self.roles.get_or_try_init(|| self.resolve_roles()).await
    }

    async fn resolve_roles(&self) -> Result<RoleResolution> {
        let assignments = self.store.role_assignments(self.subject).await?;

        let granted: BTreeSet<RoleId> = assignments
            .iter()
            .filter(|(_, granted)| *granted)
            .map(|(role, _)| *role)
            .collect();
        let denied: BTreeSet<RoleId> = assignments
            .iter()
            .filter(|(_, granted)| !*granted)
            .map(|(role, _)| *role)
            .collect();

        let graph = RoleGraph::load(self.store.as_ref(), granted.iter().chain(denied.iter()).copied())
            .await?;

        let denied_closure = graph.closure(denied.iter().copied());
        let effective: BTreeSet<RoleId> = graph
            .closure(granted.iter().copied())
            .into_iter()
            .filter(|role| !denied_closure.contains(role))
            .collect();

        let records = try_join_all(effective.iter().map(|id| self.store.role(*id))).await?;
        let mut roles = RoleSet::new();
        for (id, record) in effective.iter().zip(records) {
            match record {
                Some(role) => {
                    roles.insert(*id, role);
                }
                None => warn!("Subject {} references unknown role {}", self.subject, id),
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_resolution();
        }

        debug!(
            "Resolved {} effective roles for subject {} ({} granted, {} denied closure)",
            roles.len(),
            self.subject,
            granted.len(),
            denied_closure.len()
        );

        Ok(RoleResolution {
            roles,
            denied_closure,
        })
    }

    async fn resolve_permissions(&self) -> Result<PermissionSet> {
        let from_roles = self.role_permissions().await?;
        let assignments = self.store.permission_assignments(self.subject).await?;

        let direct_denied: HashSet<PermissionId> = assignments
            .iter()
            .filter(|(_, granted)| !*granted)
            .map(|(permission, _)| *permission)
            .collect();
        let direct_granted: BTreeSet<PermissionId> = assignments
            .iter()
            .filter(|(_, granted)| *granted)
            .map(|(permission, _)| *permission)
            .filter(|permission| !from_roles.contains_key(permission))
            .collect();

        let mut permissions = from_roles;
        permissions.extend(self.load_permissions(direct_granted).await?);
        permissions.retain(|id, _| !direct_denied.contains(id));

        debug!(
            "Resolved {} effective permissions for subject {} ({} directly denied)",
            permissions.len(),
            self.subject,
            direct_denied.len()
        );

        Ok(permissions)
    }

    async fn load_permissions(&self, ids: BTreeSet<PermissionId>) -> Result<PermissionSet> {
        let records = try_join_all(ids.iter().map(|id| self.store.permission(*id))).await?;

        let mut permissions = PermissionSet::new();
        for (id, record) in ids.iter().zip(records) {
            match record {
                Some(permission) => {
                    permissions.insert(*id, permission);
                }
                None => warn!("Subject {} references unknown permission {}", self.subject, id),
            }
        }
        Ok(permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAssignmentStore;

    const ADMIN: RoleId = 1;
    const EDITOR: RoleId = 2;
    const AUTHOR: RoleId = 3;
    const POSTS_EDIT: PermissionId = 10;
    const POSTS_CREATE: PermissionId = 11;
    const USERS_BAN: PermissionId = 12;
    const SUBJECT: SubjectId = 42;

    async fn hierarchy() -> InMemoryAssignmentStore {
        let store = InMemoryAssignmentStore::new();
        store.insert_role(Role::new(ADMIN, "admin")).await.unwrap();
        store.insert_role(Role::new(EDITOR, "editor")).await.unwrap();
        store.insert_role(Role::new(AUTHOR, "author")).await.unwrap();
        store.add_child(ADMIN, EDITOR).await.unwrap();
        store.add_child(EDITOR, AUTHOR).await.unwrap();

        store.insert_permission(Permission::new(POSTS_EDIT, "posts.edit")).await.unwrap();
        store.insert_permission(Permission::new(POSTS_CREATE, "posts.create")).await.unwrap();
        store.insert_permission(Permission::new(USERS_BAN, "users.ban")).await.unwrap();
        store.grant_permission_to_role(EDITOR, POSTS_EDIT).await.unwrap();
        store.grant_permission_to_role(AUTHOR, POSTS_CREATE).await.unwrap();
        store
    }

    fn resolver(store: &InMemoryAssignmentStore) -> EffectiveSetResolver {
        EffectiveSetResolver::new(SUBJECT, Arc::new(store.clone()))
    }

    fn ids<V>(set: &BTreeMap<u64, V>) -> Vec<u64> {
        set.keys().copied().collect()
    }

    #[tokio::test]
    async fn test_no_assignments() {
        let store = hierarchy().await;
        let resolver = resolver(&store);

        assert!(resolver.effective_roles().await.unwrap().is_empty());
        assert!(resolver.effective_permissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_granted_role_includes_descendants() {
        let store = hierarchy().await;
        store.attach_role_assignment(SUBJECT, ADMIN, true).await.unwrap();
        let resolver = resolver(&store);

        assert_eq!(ids(resolver.effective_roles().await.unwrap()), vec![ADMIN, EDITOR, AUTHOR]);
        assert_eq!(
            ids(resolver.effective_permissions().await.unwrap()),
            vec![POSTS_EDIT, POSTS_CREATE]
        );
    }

    #[tokio::test]
    async fn test_denied_descendant_removes_subtree() {
        let store = hierarchy().await;
        store.attach_role_assignment(SUBJECT, ADMIN, true).await.unwrap();
        store.attach_role_assignment(SUBJECT, EDITOR, false).await.unwrap();
        let resolver = resolver(&store);

        assert_eq!(ids(resolver.effective_roles().await.unwrap()), vec![ADMIN]);
        assert_eq!(
            resolver.denied_closure().await.unwrap(),
            &HashSet::from([EDITOR, AUTHOR])
        );
        assert!(resolver.role_permissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_permission_grant_and_deny() {
        let store = hierarchy().await;
        store.attach_role_assignment(SUBJECT, EDITOR, true).await.unwrap();
        store.attach_permission_assignment(SUBJECT, USERS_BAN, true).await.unwrap();
        store.attach_permission_assignment(SUBJECT, POSTS_CREATE, false).await.unwrap();
        let resolver = resolver(&store);

        assert_eq!(
            ids(&resolver.role_permissions().await.unwrap()),
            vec![POSTS_EDIT, POSTS_CREATE]
        );
        assert_eq!(
            ids(resolver.effective_permissions().await.unwrap()),
            vec![POSTS_EDIT, USERS_BAN]
        );
    }

    #[tokio::test]
    async fn test_results_are_memoized() {
        let store = hierarchy().await;
        let resolver = resolver(&store);

        assert!(!resolver.is_resolved());
        assert!(resolver.effective_roles().await.unwrap().is_empty());
        assert!(resolver.is_resolved());

        // Later changes are invisible to a live resolver
        store.attach_role_assignment(SUBJECT, ADMIN, true).await.unwrap();
        assert!(resolver.effective_roles().await.unwrap().is_empty());

        let fresh = EffectiveSetResolver::new(SUBJECT, Arc::new(store.clone()));
        assert_eq!(fresh.effective_roles().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_role_is_skipped() {
        let store = hierarchy().await;
        store.attach_role_assignment(SUBJECT, 999, true).await.unwrap();
        store.attach_role_assignment(SUBJECT, AUTHOR, true).await.unwrap();
        let resolver = resolver(&store);

        assert_eq!(ids(resolver.effective_roles().await.unwrap()), vec![AUTHOR]);
    }

    #[tokio::test]
    async fn test_metrics_record_single_resolution() {
        let store = hierarchy().await;
        let metrics = Arc::new(QueryMetrics::new());
        let resolver = resolver(&store).with_metrics(metrics.clone());

        resolver.effective_roles().await.unwrap();
        resolver.effective_permissions().await.unwrap();

        assert_eq!(metrics.snapshot().resolutions, 1);
    }
}
