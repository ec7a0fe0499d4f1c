//! Organization, project and document endpoints. Every route taking an id is
//! mounted behind the access guard in `app.rs`; handlers here assume the
//! caller has already been authorized.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::catalog;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::capability::ResourceKind;
use crate::models::document::{Document, DocumentCreateRequest};
use crate::models::organization::{Organization, OrganizationCreateRequest, ResourceUpdateRequest};
use crate::models::project::{Project, ProjectCreateRequest};

fn require_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    Ok(())
}

async fn rename(state: &AppState, kind: ResourceKind, id: Uuid, payload: &ResourceUpdateRequest) -> AppResult<()> {
    if let Some(name) = payload.name.as_deref() {
        require_name(name)?;
    }
    let found = catalog::rename(
        &state.pool,
        kind,
        id,
        payload.name.as_deref(),
        payload.description.as_deref(),
    )
    .await?;
    if !found {
        return Err(AppError::not_found(format!("{kind} not found")));
    }
    Ok(())
}

async fn deactivate(state: &AppState, kind: ResourceKind, id: Uuid) -> AppResult<StatusCode> {
    if !catalog::deactivate(&state.pool, kind, id).await? {
        return Err(AppError::not_found(format!("{kind} not found")));
    }
    tracing::info!(%kind, %id, "resource deactivated");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ORGANIZATIONS
// =============================================================================

/// Any authenticated user may create an organization and becomes its manager.
#[utoipa::path(
    post,
    path = "/organizations",
    tag = "Organizations",
    request_body = OrganizationCreateRequest,
    responses(
        (status = 201, description = "Organization created", body = Organization),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<OrganizationCreateRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    require_name(&payload.name)?;

    let (organization, grant) = catalog::create_organization_with_manager(
        &state.pool,
        payload.name.trim(),
        payload.description.as_deref(),
        auth.user_id,
    )
    .await?;
    log_activity(
        &state.event_bus,
        "granted",
        Some(auth.user_id),
        &grant,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(organization)))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization detail", body = Organization),
        (status = 403, description = "INVITE required")
    )
)]
pub async fn get_organization(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Organization>> {
    catalog::get_organization(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("organization not found"))
}

#[utoipa::path(
    put,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = ResourceUpdateRequest,
    responses(
        (status = 200, description = "Organization updated", body = Organization),
        (status = 403, description = "CREATE required")
    )
)]
pub async fn update_organization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResourceUpdateRequest>,
) -> AppResult<Json<Organization>> {
    rename(&state, ResourceKind::Organization, id, &payload).await?;
    get_organization(State(state), Path(id)).await
}

#[utoipa::path(
    delete,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Organization deactivated; grants are kept"),
        (status = 403, description = "MANAGE required")
    )
)]
pub async fn deactivate_organization(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    deactivate(&state, ResourceKind::Organization, id).await
}

// =============================================================================
// PROJECTS
// =============================================================================

#[utoipa::path(
    post,
    path = "/organizations/{id}/projects",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 403, description = "CREATE on the organization required")
    )
)]
pub async fn create_project(
    State(state): State<AppState>,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    require_name(&payload.name)?;
    let project = catalog::create_project(
        &state.pool,
        organization_id,
        payload.name.trim(),
        payload.description.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 403, description = "INVITE required")
    )
)]
pub async fn get_project(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Project>> {
    catalog::get_project(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("project not found"))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ResourceUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 403, description = "CREATE required")
    )
)]
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResourceUpdateRequest>,
) -> AppResult<Json<Project>> {
    rename(&state, ResourceKind::Project, id, &payload).await?;
    get_project(State(state), Path(id)).await
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deactivated; grants are kept"),
        (status = 403, description = "MANAGE required")
    )
)]
pub async fn deactivate_project(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    deactivate(&state, ResourceKind::Project, id).await
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[utoipa::path(
    post,
    path = "/projects/{id}/documents",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = DocumentCreateRequest,
    responses(
        (status = 201, description = "Document created", body = Document),
        (status = 403, description = "CREATE on the project required")
    )
)]
pub async fn create_document(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<DocumentCreateRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    require_name(&payload.name)?;
    let document =
        catalog::create_document(&state.pool, project_id, payload.name.trim(), payload.mime.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document detail", body = Document),
        (status = 403, description = "INVITE required")
    )
)]
pub async fn get_document(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Document>> {
    catalog::get_document(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("document not found"))
}

#[utoipa::path(
    put,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = ResourceUpdateRequest,
    responses(
        (status = 200, description = "Document renamed", body = Document),
        (status = 403, description = "CREATE required")
    )
)]
pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResourceUpdateRequest>,
) -> AppResult<Json<Document>> {
    rename(&state, ResourceKind::Document, id, &payload).await?;
    get_document(State(state), Path(id)).await
}

#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document deactivated; grants are kept"),
        (status = 403, description = "MANAGE required")
    )
)]
pub async fn deactivate_document(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    deactivate(&state, ResourceKind::Document, id).await
}
