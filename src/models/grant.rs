use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};
use crate::models::capability::{CapabilityLevel, ResourceKind, ResourceRef};

// =============================================================================
// PERMISSION GRANT
// =============================================================================

/// A direct grant of a capability to a user on one resource.
///
/// At most one grant exists per `(resource_kind, resource_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionGrant {
    pub id: Uuid,
    pub resource_kind: ResourceKind,
    pub resource_id: Uuid,
    pub user_id: Uuid,
    pub capability: CapabilityLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionGrant {
    pub fn resource(&self) -> ResourceRef {
        ResourceRef::new(self.resource_kind, self.resource_id)
    }
}

impl Loggable for PermissionGrant {
    fn entity_type(&self) -> &'static str {
        match self.resource_kind {
            ResourceKind::Organization => "organization_permission",
            ResourceKind::Project => "project_permission",
            ResourceKind::Document => "document_permission",
        }
    }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantPermissionRequest {
    pub user_id: Uuid,
    #[schema(example = "CREATE")]
    pub capability: CapabilityLevel,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePermissionRequest {
    #[schema(example = "MANAGE")]
    pub capability: CapabilityLevel,
}

// =============================================================================
// EFFECTIVE CAPABILITY (computed)
// =============================================================================

/// One level of the ancestry chain walked during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LevelContribution {
    pub resource: ResourceRef,
    /// Direct grant at this level, if any.
    pub direct: Option<CapabilityLevel>,
}

/// Result of resolving a user's effective capability on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Resolution {
    pub user_id: Uuid,
    pub resource: ResourceRef,
    /// Highest capability along the chain; absent when no level grants anything.
    pub effective: Option<CapabilityLevel>,
    /// Walked levels, target first.
    pub chain: Vec<LevelContribution>,
}

impl Resolution {
    pub fn allows(&self, required: CapabilityLevel) -> bool {
        self.effective.map(|level| level.implies(required)).unwrap_or(false)
    }

    /// View safe to show the user it was resolved for: the target level plus
    /// the ancestors holding one of the user's own grants. Ancestors without a
    /// grant are dropped so the ids above the target are not revealed.
    pub fn for_holder(mut self) -> Self {
        let mut levels = std::mem::take(&mut self.chain).into_iter();
        self.chain = levels
            .next()
            .into_iter()
            .chain(levels.filter(|level| level.direct.is_some()))
            .collect();
        self
    }
}
