//! Authorization query engine
//!
//! Answers role, permission and entity-level questions for one subject on
//! top of an [`EffectiveSetResolver`].
//!
//! # Architecture
//!
//! ```text
//! AssignmentStore → RoleGraph → EffectiveSetResolver → Authorizer → bool
//!                                                         ↓
//!                                                   [QueryMetrics]
//! ```
//!
//! Every query is total: a failed check is `Ok(false)`, malformed references
//! are treated as "no match", and `Err` is reserved for store failures.
//! Simulation mode, when enabled in [`RbacConfig`], answers each query with
//! the configured result for its kind without resolving anything.

pub mod metrics;
pub mod named;

pub use metrics::{QueryMetrics, QueryMetricsSnapshot};
pub use named::{NamedQuery, QueryTable};

use crate::config::{QueryKind, RbacConfig};
use crate::entity::Entity;
use crate::error::{RbacError, Result};
use crate::reference::{PermissionRef, Reference};
use crate::resolver::{EffectiveSetResolver, PermissionSet, RoleSet};
use crate::store::AssignmentStore;
use crate::types::{PermissionId, RoleId, SubjectId};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info};

/// Owner column consulted by entity checks unless told otherwise
pub const DEFAULT_OWNER_COLUMN: &str = "user_id";

/// Query engine bound to one subject
///
/// An `Authorizer` is request-scoped: effective sets are resolved on first
/// use and kept until the authorizer is dropped. Mutations made through it
/// are written to the store but do not refresh the cached sets.
pub struct Authorizer {
    resolver: EffectiveSetResolver,
    config: Arc<RbacConfig>,
    metrics: Option<Arc<QueryMetrics>>,
}

impl Authorizer {
    /// Create an authorizer for a subject
    pub fn new(subject: SubjectId, store: Arc<dyn AssignmentStore>, config: Arc<RbacConfig>) -> Self {
        debug!("Authorizer created for subject {}", subject);
        Self {
            resolver: EffectiveSetResolver::new(subject, store),
            config,
            metrics: None,
        }
    }

    /// Record queries and resolutions in the given collector
    pub fn with_metrics(mut self, metrics: Arc<QueryMetrics>) -> Self {
        self.resolver = self.resolver.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn subject(&self) -> SubjectId {
        self.resolver.subject()
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    pub fn resolver(&self) -> &EffectiveSetResolver {
        &self.resolver
    }

    /// Effective roles of the subject
    pub async fn roles(&self) -> Result<&RoleSet> {
        self.resolver.effective_roles().await
    }

    /// Effective permissions of the subject
    pub async fn permissions(&self) -> Result<&PermissionSet> {
        self.resolver.effective_permissions().await
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Whether the subject has the role (or any of the roles in a list)
    pub async fn has_role(&self, role: impl Into<Reference>) -> Result<bool> {
        let reference = role.into();
        if let Some(forced) = self.simulated(QueryKind::RoleIs) {
            return Ok(forced);
        }
        let result = self.match_roles(&reference.flatten(), false).await;
        self.record(QueryKind::RoleIs, result)
    }

    /// Whether the subject has at least one of the roles
    pub async fn has_any_role(&self, roles: impl Into<Reference>) -> Result<bool> {
        self.role_is(roles, false).await
    }

    /// Whether the subject has every one of the roles
    pub async fn has_all_roles(&self, roles: impl Into<Reference>) -> Result<bool> {
        self.role_is(roles, true).await
    }

    /// Role check over a single reference, a delimited string or a list
    pub async fn role_is(&self, roles: impl Into<Reference>, all: bool) -> Result<bool> {
        let reference = roles.into();
        if let Some(forced) = self.simulated(QueryKind::RoleIs) {
            return Ok(forced);
        }
        let result = self.match_roles(&reference.flatten(), all).await;
        self.record(QueryKind::RoleIs, result)
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Whether the subject has the permission (or any in a list)
    pub async fn has_permission(&self, permission: impl Into<Reference>) -> Result<bool> {
        let reference = permission.into();
        if let Some(forced) = self.simulated(QueryKind::May) {
            return Ok(forced);
        }
        let result = self.match_permissions(&reference.flatten(), false).await;
        self.record(QueryKind::May, result)
    }

    /// Whether the subject has at least one of the permissions
    pub async fn has_any_permission(&self, permissions: impl Into<Reference>) -> Result<bool> {
        self.may(permissions, false).await
    }

    /// Whether the subject has every one of the permissions
    pub async fn has_all_permissions(&self, permissions: impl Into<Reference>) -> Result<bool> {
        self.may(permissions, true).await
    }

    /// Permission check over a single reference, a delimited string or a list
    pub async fn may(&self, permissions: impl Into<Reference>, all: bool) -> Result<bool> {
        let reference = permissions.into();
        if let Some(forced) = self.simulated(QueryKind::May) {
            return Ok(forced);
        }
        let result = self.match_permissions(&reference.flatten(), all).await;
        self.record(QueryKind::May, result)
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Whether the subject may act on a specific entity
    ///
    /// With `owner` set, a subject whose id equals the entity's
    /// `owner_column` value is allowed outright. Otherwise an effective
    /// permission must be scoped to the entity's type tag and match the
    /// single `permission` by id or exact slug.
    pub async fn allowed(
        &self,
        permission: impl Into<PermissionRef>,
        entity: &dyn Entity,
        owner: bool,
        owner_column: &str,
    ) -> Result<bool> {
        let reference = permission.into();
        if let Some(forced) = self.simulated(QueryKind::Allowed) {
            return Ok(forced);
        }

        if owner && entity.owner_id(owner_column) == Some(self.subject()) {
            debug!(
                "Subject {} owns {} entity via '{}'",
                self.subject(),
                entity.type_tag(),
                owner_column
            );
            return self.record(QueryKind::Allowed, Ok(true));
        }

        let result = self.match_entity_permission(&reference, entity).await;
        self.record(QueryKind::Allowed, result)
    }

    /// Entity check with ownership bypass on the default owner column
    pub async fn is_allowed(
        &self,
        permission: impl Into<PermissionRef>,
        entity: &dyn Entity,
    ) -> Result<bool> {
        self.allowed(permission, entity, true, DEFAULT_OWNER_COLUMN).await
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    /// Fail with [`RbacError::RoleDenied`] unless the subject has any of the roles
    pub async fn require_role(&self, roles: impl Into<Reference>) -> Result<()> {
        let reference = roles.into();
        if self.role_is(reference.clone(), false).await? {
            Ok(())
        } else {
            Err(RbacError::RoleDenied(reference.to_string()))
        }
    }

    /// Fail with [`RbacError::PermissionDenied`] unless the subject has any of the permissions
    pub async fn require_permission(&self, permissions: impl Into<Reference>) -> Result<()> {
        let reference = permissions.into();
        if self.may(reference.clone(), false).await? {
            Ok(())
        } else {
            Err(RbacError::PermissionDenied(reference.to_string()))
        }
    }

    /// Fail with [`RbacError::EntityDenied`] unless the entity check passes
    pub async fn require_allowed(
        &self,
        permission: impl Into<PermissionRef>,
        entity: &dyn Entity,
        owner: bool,
        owner_column: &str,
    ) -> Result<()> {
        let reference = permission.into();
        if self
            .allowed(reference.clone(), entity, owner, owner_column)
            .await?
        {
            Ok(())
        } else {
            Err(RbacError::EntityDenied {
                permission: reference.to_string(),
                entity_type: entity.type_tag().to_string(),
            })
        }
    }

    /// Run a named query
    ///
    /// # Errors
    ///
    /// Entity queries need an entity; without one this is an `InvalidInput` error.
    pub async fn dispatch(&self, query: &NamedQuery, entity: Option<&dyn Entity>) -> Result<bool> {
        match query.kind {
            QueryKind::RoleIs => self.role_is(query.target.as_str(), false).await,
            QueryKind::May => self.may(query.target.as_str(), false).await,
            QueryKind::Allowed => {
                let entity = entity.ok_or_else(|| {
                    RbacError::InvalidInput(format!(
                        "Entity query '{}' requires an entity",
                        query.target
                    ))
                })?;
                self.is_allowed(query.target.as_str(), entity).await
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Grant (or explicitly deny) a role; no-op if the same assignment exists
    pub async fn attach_role(&self, role: RoleId, granted: bool) -> Result<u64> {
        let affected = self
            .resolver
            .store()
            .attach_role_assignment(self.subject(), role, granted)
            .await?;
        info!(
            "Attach role {} (granted={}) to subject {}: {} row(s)",
            role,
            granted,
            self.subject(),
            affected
        );
        Ok(affected)
    }

    /// Remove every assignment of a role
    pub async fn detach_role(&self, role: RoleId) -> Result<u64> {
        let affected = self
            .resolver
            .store()
            .detach_role_assignment(self.subject(), Some(role))
            .await?;
        info!("Detach role {} from subject {}: {} row(s)", role, self.subject(), affected);
        Ok(affected)
    }

    /// Remove every role assignment of the subject
    pub async fn detach_all_roles(&self) -> Result<u64> {
        let affected = self
            .resolver
            .store()
            .detach_role_assignment(self.subject(), None)
            .await?;
        info!("Detach all roles from subject {}: {} row(s)", self.subject(), affected);
        Ok(affected)
    }

    /// Grant (or explicitly deny) a permission; no-op if the same assignment exists
    pub async fn attach_permission(&self, permission: PermissionId, granted: bool) -> Result<u64> {
        let affected = self
            .resolver
            .store()
            .attach_permission_assignment(self.subject(), permission, granted)
            .await?;
        info!(
            "Attach permission {} (granted={}) to subject {}: {} row(s)",
            permission,
            granted,
            self.subject(),
            affected
        );
        Ok(affected)
    }

    /// Remove every assignment of a permission
    pub async fn detach_permission(&self, permission: PermissionId) -> Result<u64> {
        let affected = self
            .resolver
            .store()
            .detach_permission_assignment(self.subject(), Some(permission))
            .await?;
        info!(
            "Detach permission {} from subject {}: {} row(s)",
            permission,
            self.subject(),
            affected
        );
        Ok(affected)
    }

    /// Remove every direct permission assignment of the subject
    pub async fn detach_all_permissions(&self) -> Result<u64> {
        let affected = self
            .resolver
            .store()
            .detach_permission_assignment(self.subject(), None)
            .await?;
        info!("Detach all permissions from subject {}: {} row(s)", self.subject(), affected);
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn simulated(&self, kind: QueryKind) -> Option<bool> {
        let forced = self.config.pretend.forced(kind)?;
        debug!("Simulated {:?} query for subject {}: {}", kind, self.subject(), forced);
        if let Some(metrics) = &self.metrics {
            metrics.record_query(kind, forced, true);
        }
        Some(forced)
    }

    fn record(&self, kind: QueryKind, result: Result<bool>) -> Result<bool> {
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(allowed) => metrics.record_query(kind, *allowed, false),
                Err(_) => metrics.record_error(),
            }
        }
        result
    }

    async fn match_roles(&self, references: &[Reference], all: bool) -> Result<bool> {
        if references.is_empty() {
            debug!("Empty role reference for subject {}", self.subject());
            return Ok(false);
        }

        let roles = self.resolver.effective_roles().await?;
        let has = |reference: &Reference| {
            roles
                .values()
                .any(|role| reference.matches(role.id, &role.slug))
        };

        Ok(if all {
            references.iter().all(has)
        } else {
            references.iter().any(has)
        })
    }

    async fn match_permissions(&self, references: &[Reference], all: bool) -> Result<bool> {
        if references.is_empty() {
            debug!("Empty permission reference for subject {}", self.subject());
            return Ok(false);
        }

        let permissions = self.resolver.effective_permissions().await?;
        let has = |reference: &Reference| {
            permissions
                .values()
                .any(|permission| reference.matches(permission.id, &permission.slug))
        };

        Ok(if all {
            references.iter().all(has)
        } else {
            references.iter().any(has)
        })
    }

    async fn match_entity_permission(
        &self,
        reference: &PermissionRef,
        entity: &dyn Entity,
    ) -> Result<bool> {
        let tag = entity.type_tag();
        if tag.is_empty() || reference.is_empty() {
            debug!("Invalid entity check for subject {}", self.subject());
            return Ok(false);
        }

        let permissions = self.resolver.effective_permissions().await?;
        Ok(permissions.values().any(|permission| {
            permission.entity_type() == Some(tag)
                && reference.matches(permission.id, &permission.slug)
        }))
    }
}

/// Authorization capability for subject types
///
/// A subject record (typically a user model) carries an [`Authorizer`] built
/// for its own id and exposes the query surface through it.
pub trait Authorizable: Send + Sync {
    /// The authorizer bound to this subject
    fn authorizer(&self) -> &Authorizer;

    fn subject_id(&self) -> SubjectId {
        self.authorizer().subject()
    }

    fn role_is<'a>(&'a self, roles: impl Into<Reference>, all: bool) -> BoxFuture<'a, Result<bool>> {
        let reference = roles.into();
        Box::pin(async move { self.authorizer().role_is(reference, all).await })
    }

    fn may<'a>(&'a self, permissions: impl Into<Reference>, all: bool) -> BoxFuture<'a, Result<bool>> {
        let reference = permissions.into();
        Box::pin(async move { self.authorizer().may(reference, all).await })
    }

    fn allowed<'a>(
        &'a self,
        permission: impl Into<PermissionRef>,
        entity: &'a dyn Entity,
        owner: bool,
        owner_column: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        let reference = permission.into();
        Box::pin(async move {
            self.authorizer()
                .allowed(reference, entity, owner, owner_column)
                .await
        })
    }
}
