//! Shared fixtures for integration tests

#![allow(dead_code)]

use cretoai_rbac::{InMemoryAssignmentStore, Permission, PermissionId, Role, RoleId};
use std::sync::Once;

pub const ADMIN: RoleId = 1;
pub const EDITOR: RoleId = 2;
pub const AUTHOR: RoleId = 3;
pub const MODERATOR: RoleId = 4;

pub const POSTS_EDIT: PermissionId = 100;
pub const POSTS_CREATE: PermissionId = 101;
pub const COMMENTS_DELETE: PermissionId = 102;
pub const POST_UPDATE: PermissionId = 103;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Blog hierarchy
///
/// ```text
/// admin ─┬─> editor ──> author
///        └─> moderator
/// ```
///
/// editor: posts.edit, author: posts.create, moderator: comments.delete.
/// post.update is scoped to the "post" entity type and not attached to any role.
pub async fn blog_store() -> InMemoryAssignmentStore {
    init_tracing();

    let store = InMemoryAssignmentStore::new();
    store.insert_role(Role::new(ADMIN, "Admin").with_level(3)).await.unwrap();
    store.insert_role(Role::new(EDITOR, "Editor").with_level(2)).await.unwrap();
    store.insert_role(Role::new(AUTHOR, "Author")).await.unwrap();
    store.insert_role(Role::new(MODERATOR, "Moderator").with_level(2)).await.unwrap();

    store.add_child(ADMIN, EDITOR).await.unwrap();
    store.add_child(EDITOR, AUTHOR).await.unwrap();
    store.add_child(ADMIN, MODERATOR).await.unwrap();

    store.insert_permission(Permission::new(POSTS_EDIT, "Posts Edit")).await.unwrap();
    store.insert_permission(Permission::new(POSTS_CREATE, "Posts Create")).await.unwrap();
    store
        .insert_permission(Permission::new(COMMENTS_DELETE, "Comments Delete"))
        .await
        .unwrap();
    store
        .insert_permission(Permission::new(POST_UPDATE, "Post Update").for_entity("post"))
        .await
        .unwrap();

    store.grant_permission_to_role(EDITOR, POSTS_EDIT).await.unwrap();
    store.grant_permission_to_role(AUTHOR, POSTS_CREATE).await.unwrap();
    store.grant_permission_to_role(MODERATOR, COMMENTS_DELETE).await.unwrap();

    store
}
