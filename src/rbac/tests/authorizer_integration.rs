//! Authorizer integration tests
//!
//! Subject capability, simulation config, compute-once caching under
//! concurrency and store failure propagation.

mod common;

use async_trait::async_trait;
use common::*;
use cretoai_rbac::{
    AssignmentStore, Authorizable, Authorizer, EntityRecord, EntityTypeRegistry,
    InMemoryAssignmentStore, Permission, PermissionId, QueryMetrics, QueryTable, RbacConfig,
    RbacError, Result, Role, RoleId, SubjectId,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Application user model carrying its authorizer
struct User {
    id: SubjectId,
    authorizer: Authorizer,
}

impl User {
    fn new(id: SubjectId, store: Arc<dyn AssignmentStore>, config: Arc<RbacConfig>) -> Self {
        Self {
            id,
            authorizer: Authorizer::new(id, store, config),
        }
    }
}

impl Authorizable for User {
    fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }
}

/// Typed model using the registry for its tag
struct Post {
    user_id: SubjectId,
    tag: String,
}

impl cretoai_rbac::Entity for Post {
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn owner_id(&self, column: &str) -> Option<SubjectId> {
        (column == "user_id").then_some(self.user_id)
    }
}

/// Store wrapper counting assignment reads
struct CountingStore {
    inner: InMemoryAssignmentStore,
    role_reads: AtomicUsize,
}

#[async_trait]
impl AssignmentStore for CountingStore {
    async fn role_assignments(&self, subject: SubjectId) -> Result<Vec<(RoleId, bool)>> {
        self.role_reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.role_assignments(subject).await
    }

    async fn permission_assignments(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<(PermissionId, bool)>> {
        self.inner.permission_assignments(subject).await
    }

    async fn role(&self, id: RoleId) -> Result<Option<Role>> {
        self.inner.role(id).await
    }

    async fn permission(&self, id: PermissionId) -> Result<Option<Permission>> {
        self.inner.permission(id).await
    }

    async fn role_children(&self, id: RoleId) -> Result<Vec<RoleId>> {
        self.inner.role_children(id).await
    }

    async fn role_permissions(&self, id: RoleId) -> Result<Vec<PermissionId>> {
        self.inner.role_permissions(id).await
    }

    async fn attach_role_assignment(
        &self,
        subject: SubjectId,
        role: RoleId,
        granted: bool,
    ) -> Result<u64> {
        self.inner.attach_role_assignment(subject, role, granted).await
    }

    async fn detach_role_assignment(
        &self,
        subject: SubjectId,
        role: Option<RoleId>,
    ) -> Result<u64> {
        self.inner.detach_role_assignment(subject, role).await
    }

    async fn attach_permission_assignment(
        &self,
        subject: SubjectId,
        permission: PermissionId,
        granted: bool,
    ) -> Result<u64> {
        self.inner
            .attach_permission_assignment(subject, permission, granted)
            .await
    }

    async fn detach_permission_assignment(
        &self,
        subject: SubjectId,
        permission: Option<PermissionId>,
    ) -> Result<u64> {
        self.inner
            .detach_permission_assignment(subject, permission)
            .await
    }
}

/// Store whose reads always fail
struct UnavailableStore;

#[async_trait]
impl AssignmentStore for UnavailableStore {
    async fn role_assignments(&self, _subject: SubjectId) -> Result<Vec<(RoleId, bool)>> {
        Err(RbacError::Store("connection refused".to_string()))
    }

    async fn permission_assignments(
        &self,
        _subject: SubjectId,
    ) -> Result<Vec<(PermissionId, bool)>> {
        Err(RbacError::Store("connection refused".to_string()))
    }

    async fn role(&self, _id: RoleId) -> Result<Option<Role>> {
        Ok(None)
    }

    async fn permission(&self, _id: PermissionId) -> Result<Option<Permission>> {
        Ok(None)
    }

    async fn role_children(&self, _id: RoleId) -> Result<Vec<RoleId>> {
        Ok(Vec::new())
    }

    async fn role_permissions(&self, _id: RoleId) -> Result<Vec<PermissionId>> {
        Ok(Vec::new())
    }

    async fn attach_role_assignment(&self, _: SubjectId, _: RoleId, _: bool) -> Result<u64> {
        Err(RbacError::Store("read only".to_string()))
    }

    async fn detach_role_assignment(&self, _: SubjectId, _: Option<RoleId>) -> Result<u64> {
        Err(RbacError::Store("read only".to_string()))
    }

    async fn attach_permission_assignment(
        &self,
        _: SubjectId,
        _: PermissionId,
        _: bool,
    ) -> Result<u64> {
        Err(RbacError::Store("read only".to_string()))
    }

    async fn detach_permission_assignment(
        &self,
        _: SubjectId,
        _: Option<PermissionId>,
    ) -> Result<u64> {
        Err(RbacError::Store("read only".to_string()))
    }
}

#[tokio::test]
async fn test_authorizable_user() -> anyhow::Result<()> {
    let store = blog_store().await;
    store.attach_role_assignment(7, EDITOR, true).await?;

    let user = User::new(7, Arc::new(store), Arc::new(RbacConfig::default()));

    assert_eq!(user.subject_id(), user.id);
    assert!(user.role_is("editor|admin", false).await?);
    assert!(user.role_is(vec![EDITOR, AUTHOR], true).await?);
    assert!(user.may("posts.edit,posts.create", true).await?);
    assert!(!user.may("comments.delete", false).await?);

    let registry = EntityTypeRegistry::new();
    registry.register::<Post>("post")?;
    let tag = registry.tag_of::<Post>().unwrap_or_default();

    let own = Post { user_id: 7, tag: tag.clone() };
    let other = Post { user_id: 8, tag };
    assert!(user.allowed("post.update", &own, true, "user_id").await?);
    assert!(!user.allowed("post.update", &other, true, "user_id").await?);
    Ok(())
}

#[tokio::test]
async fn test_pretend_config_from_json() -> anyhow::Result<()> {
    let store = blog_store().await;
    let config = RbacConfig::from_json_str(
        r#"{
            "separator": ".",
            "pretend": {
                "enabled": true,
                "options": { "roleIs": true, "may": false, "allowed": true }
            }
        }"#,
    )?;

    let user = User::new(3, Arc::new(store), Arc::new(config));

    assert!(user.role_is("anything", true).await?);
    assert!(!user.may("posts.edit", false).await?);
    assert!(user.allowed("x", &EntityRecord::new("post"), false, "user_id").await?);
    assert!(!user.authorizer().resolver().is_resolved());
    Ok(())
}

#[tokio::test]
async fn test_pretend_may_true_ignores_store() {
    let config = RbacConfig::default().with_pretend(cretoai_rbac::PretendOptions::all(true));
    let authz = Authorizer::new(1, Arc::new(UnavailableStore), Arc::new(config));

    assert!(authz.may("anything", false).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_first_access_resolves_once() {
    let inner = blog_store().await;
    inner.attach_role_assignment(9, ADMIN, true).await.unwrap();
    let store = Arc::new(CountingStore {
        inner,
        role_reads: AtomicUsize::new(0),
    });
    let metrics = Arc::new(QueryMetrics::new());
    let authz = Authorizer::new(9, store.clone(), Arc::new(RbacConfig::default()))
        .with_metrics(metrics.clone());

    let checks = ["admin", "editor", "author", "moderator"]
        .iter()
        .map(|slug| authz.has_role(*slug));
    let results = join_all(checks).await;

    assert!(results.into_iter().all(|r| r.unwrap()));
    assert_eq!(store.role_reads.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.snapshot().resolutions, 1);
    assert_eq!(metrics.snapshot().total_queries, 4);
}

#[tokio::test]
async fn test_shared_authorizer_across_tasks() {
    let store = blog_store().await;
    store.attach_role_assignment(9, MODERATOR, true).await.unwrap();
    let authz = Arc::new(Authorizer::new(
        9,
        Arc::new(store),
        Arc::new(RbacConfig::default()),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let authz = authz.clone();
            tokio::spawn(async move { authz.may("comments.delete", false).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let metrics = Arc::new(QueryMetrics::new());
    let authz = Authorizer::new(1, Arc::new(UnavailableStore), Arc::new(RbacConfig::default()))
        .with_metrics(metrics.clone());

    let err = authz.has_role("admin").await.unwrap_err();
    assert!(matches!(err, RbacError::Store(_)));
    assert!(!err.is_denied());
    assert!(authz.attach_role(1, true).await.is_err());
    assert_eq!(metrics.snapshot().errors, 1);
}

#[tokio::test]
async fn test_query_table_dispatch() {
    let store = blog_store().await;
    store.attach_role_assignment(4, AUTHOR, true).await.unwrap();
    let authz = Authorizer::new(4, Arc::new(store), Arc::new(RbacConfig::default()));

    let mut table = QueryTable::new(authz.config().separator);
    table.register("isWriter", cretoai_rbac::QueryKind::RoleIs, "author");

    let writer = table.resolve("isWriter").unwrap();
    let can_create = table.resolve("canPostsCreate").unwrap();
    let is_admin = table.resolve("isAdmin").unwrap();

    assert!(authz.dispatch(&writer, None).await.unwrap());
    assert!(authz.dispatch(&can_create, None).await.unwrap());
    assert!(!authz.dispatch(&is_admin, None).await.unwrap());
    assert!(table.resolve("deleteEverything").is_none());
}
