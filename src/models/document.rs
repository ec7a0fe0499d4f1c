use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub mime: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentCreateRequest {
    #[schema(example = "site-plan.pdf")]
    pub name: String,
    #[schema(example = "application/pdf")]
    pub mime: Option<String>,
}

/// A stored revision of a document. Not securable on its own: access is
/// decided on the owning document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentVersion {
    pub id: Uuid,
    /// Empty while an upload is still pending.
    pub document_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentVersionUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}
