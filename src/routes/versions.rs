//! Document versions. Access is decided on the owning document: version ids
//! are translated by the guard before resolution.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::catalog;
use crate::errors::{AppError, AppResult};
use crate::models::document::{DocumentVersion, DocumentVersionUpdateRequest};

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentVersionCreateRequest {
    #[schema(example = "site-plan-rev2.pdf")]
    pub name: String,
    #[serde(default)]
    pub size: i64,
}

#[utoipa::path(
    post,
    path = "/documents/{id}/versions",
    tag = "Document versions",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentVersionCreateRequest,
    responses(
        (status = 201, description = "Version created", body = DocumentVersion),
        (status = 403, description = "CREATE on the document required")
    )
)]
pub async fn create_version(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<DocumentVersionCreateRequest>,
) -> AppResult<(StatusCode, Json<DocumentVersion>)> {
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if payload.size < 0 {
        return Err(AppError::bad_request("size must not be negative"));
    }

    let version = catalog::create_version(&state.pool, Some(document_id), payload.name.trim(), payload.size).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

#[utoipa::path(
    get,
    path = "/document-versions/{id}",
    tag = "Document versions",
    params(("id" = Uuid, Path, description = "Document version id")),
    responses(
        (status = 200, description = "Version detail", body = DocumentVersion),
        (status = 403, description = "INVITE on the owning document required"),
        (status = 404, description = "Version missing or not attached to a document")
    )
)]
pub async fn get_version(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<DocumentVersion>> {
    catalog::get_version(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("document version not found"))
}

#[utoipa::path(
    get,
    path = "/documents/{id}/versions/latest",
    tag = "Document versions",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Newest version of the document", body = DocumentVersion),
        (status = 403, description = "INVITE on the document required"),
        (status = 404, description = "Document has no versions")
    )
)]
pub async fn latest_version(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentVersion>> {
    catalog::latest_version(&state.pool, document_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("document has no versions"))
}

#[utoipa::path(
    put,
    path = "/document-versions/{id}",
    tag = "Document versions",
    params(("id" = Uuid, Path, description = "Document version id")),
    request_body = DocumentVersionUpdateRequest,
    responses(
        (status = 200, description = "Version updated", body = DocumentVersion),
        (status = 403, description = "CREATE on the owning document required"),
        (status = 404, description = "Version missing or not attached to a document")
    )
)]
pub async fn update_version(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentVersionUpdateRequest>,
) -> AppResult<Json<DocumentVersion>> {
    catalog::update_version(&state.pool, id, payload.name.as_deref(), payload.description.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("document version not found"))
}

#[utoipa::path(
    delete,
    path = "/document-versions/{id}",
    tag = "Document versions",
    params(("id" = Uuid, Path, description = "Document version id")),
    responses(
        (status = 204, description = "Version deleted"),
        (status = 403, description = "MANAGE on the owning document required"),
        (status = 404, description = "Version missing or not attached to a document")
    )
)]
pub async fn delete_version(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    if !catalog::delete_version(&state.pool, id).await? {
        return Err(AppError::not_found("document version not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
