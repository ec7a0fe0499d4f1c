use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Root of the ownership hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationCreateRequest {
    #[schema(example = "Acme Engineering")]
    pub name: String,
    pub description: Option<String>,
}

/// Partial update shared by organizations, projects and documents.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResourceUpdateRequest {
    #[schema(example = "Renamed")]
    pub name: Option<String>,
    pub description: Option<String>,
}
