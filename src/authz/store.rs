use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::capability::{CapabilityLevel, ResourceKind};
use crate::models::grant::PermissionGrant;

/// Direct `(resource, user) -> capability` assignments for one resource kind.
///
/// Implementations must keep at most one grant per `(resource_id, user_id)`
/// and enforce that atomically; `grant` is an upsert.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Resource kind whose grants this store holds.
    fn kind(&self) -> ResourceKind;

    /// Direct grant for the pair, `None` when there is none.
    async fn find_by_resource_and_user(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<PermissionGrant>>;

    async fn find_by_id(&self, grant_id: Uuid) -> AppResult<Option<PermissionGrant>>;

    /// Creates the grant, or replaces the capability of the existing one.
    ///
    /// Fails with `ReferenceNotFound` when the resource or the user is unknown.
    async fn grant(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
        capability: CapabilityLevel,
    ) -> AppResult<PermissionGrant>;

    /// `None` when no grant has this id.
    async fn update_capability(
        &self,
        grant_id: Uuid,
        capability: CapabilityLevel,
    ) -> AppResult<Option<PermissionGrant>>;

    /// Whether a row was removed.
    async fn revoke(&self, grant_id: Uuid) -> AppResult<bool>;

    /// Whether a row was removed.
    async fn revoke_by_resource_and_user(&self, resource_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    async fn list_by_resource(&self, resource_id: Uuid) -> AppResult<Vec<PermissionGrant>>;

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PermissionGrant>>;
}

/// One grant store per resource kind, fixed at construction.
#[derive(Clone)]
pub struct GrantStores {
    organization: Arc<dyn GrantStore>,
    project: Arc<dyn GrantStore>,
    document: Arc<dyn GrantStore>,
}

impl GrantStores {
    pub fn new(
        organization: Arc<dyn GrantStore>,
        project: Arc<dyn GrantStore>,
        document: Arc<dyn GrantStore>,
    ) -> Self {
        debug_assert_eq!(organization.kind(), ResourceKind::Organization, "organization grant store has wrong kind");
        debug_assert_eq!(project.kind(), ResourceKind::Project, "project grant store has wrong kind");
        debug_assert_eq!(document.kind(), ResourceKind::Document, "document grant store has wrong kind");

        Self {
            organization,
            project,
            document,
        }
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &Arc<dyn GrantStore> {
        match kind {
            ResourceKind::Organization => &self.organization,
            ResourceKind::Project => &self.project,
            ResourceKind::Document => &self.document,
        }
    }

    /// Every direct grant held by `user_id`, across all kinds.
    pub async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        let mut grants = Vec::new();
        for kind in ResourceKind::ALL {
            grants.extend(self.for_kind(kind).list_by_user(user_id).await?);
        }
        Ok(grants)
    }
}
