//! Permission administration and capability queries.
//!
//! The same handlers serve all three resource kinds: the guard resolves the
//! target and hands it over as a [`ResourceRef`] extension.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::capability::{ResourceKind, ResourceRef};
use crate::models::grant::{GrantPermissionRequest, PermissionGrant, Resolution, UpdatePermissionRequest};

#[utoipa::path(
    get,
    path = "/{kind}/{id}/permissions",
    tag = "Permissions",
    params(
        ("kind" = String, Path, description = "organizations, projects or documents"),
        ("id" = Uuid, Path, description = "Resource id")
    ),
    responses(
        (status = 200, description = "Direct grants on the resource", body = [PermissionGrant]),
        (status = 403, description = "MANAGE required")
    )
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceRef>,
) -> AppResult<Json<Vec<PermissionGrant>>> {
    let grants = state.grants.for_kind(resource.kind).list_by_resource(resource.id).await?;
    Ok(Json(grants))
}

#[utoipa::path(
    post,
    path = "/{kind}/{id}/permissions",
    tag = "Permissions",
    params(
        ("kind" = String, Path, description = "organizations, projects or documents"),
        ("id" = Uuid, Path, description = "Resource id")
    ),
    request_body = GrantPermissionRequest,
    responses(
        (status = 201, description = "Grant created or its capability replaced", body = PermissionGrant),
        (status = 403, description = "MANAGE required"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Extension(resource): Extension<ResourceRef>,
    Json(payload): Json<GrantPermissionRequest>,
) -> AppResult<(StatusCode, Json<PermissionGrant>)> {
    let store = state.grants.for_kind(resource.kind);
    let previous = store.find_by_resource_and_user(resource.id, payload.user_id).await?;
    let grant = store.grant(resource.id, payload.user_id, payload.capability).await?;

    tracing::info!(
        actor = %auth.user_id,
        %resource,
        user_id = %payload.user_id,
        capability = %payload.capability,
        "capability granted"
    );
    log_activity(
        &state.event_bus,
        "granted",
        Some(auth.user_id),
        &grant,
        previous.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(grant)))
}

#[utoipa::path(
    delete,
    path = "/{kind}/{id}/permissions/users/{user_id}",
    tag = "Permissions",
    params(
        ("kind" = String, Path, description = "organizations, projects or documents"),
        ("id" = Uuid, Path, description = "Resource id"),
        ("user_id" = Uuid, Path, description = "User whose grant is revoked")
    ),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 403, description = "MANAGE required"),
        (status = 404, description = "No grant for this user")
    )
)]
pub async fn revoke_user_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Extension(resource): Extension<ResourceRef>,
    Path((_resource_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let store = state.grants.for_kind(resource.kind);
    let existing = store.find_by_resource_and_user(resource.id, user_id).await?;

    if !store.revoke_by_resource_and_user(resource.id, user_id).await? {
        return Err(AppError::not_found("permission not found"));
    }

    if let Some(grant) = existing {
        log_revoked(&state, auth.user_id, &grant, &headers);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{kind}-permissions/{id}",
    tag = "Permissions",
    params(
        ("kind" = String, Path, description = "organization, project or document"),
        ("id" = Uuid, Path, description = "Grant id")
    ),
    responses(
        (status = 200, description = "Grant detail", body = PermissionGrant),
        (status = 403, description = "MANAGE on the granted resource required"),
        (status = 404, description = "Grant not found")
    )
)]
pub async fn get_grant(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceRef>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PermissionGrant>> {
    state
        .grants
        .for_kind(resource.kind)
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("permission not found"))
}

#[utoipa::path(
    put,
    path = "/{kind}-permissions/{id}",
    tag = "Permissions",
    params(
        ("kind" = String, Path, description = "organization, project or document"),
        ("id" = Uuid, Path, description = "Grant id")
    ),
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Capability replaced", body = PermissionGrant),
        (status = 403, description = "MANAGE on the granted resource required"),
        (status = 404, description = "Grant not found")
    )
)]
pub async fn update_grant(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Extension(resource): Extension<ResourceRef>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePermissionRequest>,
) -> AppResult<Json<PermissionGrant>> {
    let store = state.grants.for_kind(resource.kind);
    let previous = store.find_by_id(id).await?;
    let grant = store
        .update_capability(id, payload.capability)
        .await?
        .ok_or_else(|| AppError::not_found("permission not found"))?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &grant,
        previous.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(grant))
}

#[utoipa::path(
    delete,
    path = "/{kind}-permissions/{id}",
    tag = "Permissions",
    params(
        ("kind" = String, Path, description = "organization, project or document"),
        ("id" = Uuid, Path, description = "Grant id")
    ),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 403, description = "MANAGE on the granted resource required"),
        (status = 404, description = "Grant not found")
    )
)]
pub async fn revoke_grant(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Extension(resource): Extension<ResourceRef>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let store = state.grants.for_kind(resource.kind);
    let existing = store.find_by_id(id).await?;

    if !store.revoke(id).await? {
        return Err(AppError::not_found("permission not found"));
    }

    if let Some(grant) = existing {
        log_revoked(&state, auth.user_id, &grant, &headers);
    }
    Ok(StatusCode::NO_CONTENT)
}

fn log_revoked(state: &AppState, actor: Uuid, grant: &PermissionGrant, headers: &HeaderMap) {
    tracing::info!(%actor, resource = %grant.resource(), user_id = %grant.user_id, "capability revoked");
    log_activity(
        &state.event_bus,
        "revoked",
        Some(actor),
        grant,
        None,
        Some(RequestContext::from_headers(headers)),
    );
}

// =============================================================================
// CAPABILITY QUERIES
// =============================================================================

/// Caller's own resolution on the resource.
///
/// Forbidden when the caller holds nothing along the chain, whether or not the
/// resource exists; otherwise ancestors without one of the caller's grants are
/// left out of the chain.
async fn effective(state: &AppState, auth: &AuthUser, kind: ResourceKind, id: Uuid) -> AppResult<Json<Resolution>> {
    let resource = ResourceRef::new(kind, id);
    let resolution = state.guard.resolver().explain(auth.user_id, resource).await;

    if resolution.effective.is_none() {
        tracing::info!(user_id = %auth.user_id, %resource, "effective capability denied");
        return Err(AppError::forbidden(format!("no capability on {resource}")));
    }

    Ok(Json(resolution.for_holder()))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/effective-capability",
    tag = "Permissions",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Caller's resolution chain", body = Resolution),
        (status = 403, description = "Caller holds no capability here")
    )
)]
pub async fn organization_effective(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Resolution>> {
    effective(&state, &auth, ResourceKind::Organization, id).await
}

#[utoipa::path(
    get,
    path = "/projects/{id}/effective-capability",
    tag = "Permissions",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Caller's resolution chain", body = Resolution),
        (status = 403, description = "Caller holds no capability here")
    )
)]
pub async fn project_effective(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Resolution>> {
    effective(&state, &auth, ResourceKind::Project, id).await
}

#[utoipa::path(
    get,
    path = "/documents/{id}/effective-capability",
    tag = "Permissions",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Caller's resolution chain", body = Resolution),
        (status = 403, description = "Caller holds no capability here")
    )
)]
pub async fn document_effective(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Resolution>> {
    effective(&state, &auth, ResourceKind::Document, id).await
}

#[utoipa::path(
    get,
    path = "/me/permissions",
    tag = "Permissions",
    responses(
        (status = 200, description = "Caller's direct grants on every kind", body = [PermissionGrant]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_permissions(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<PermissionGrant>>> {
    Ok(Json(state.grants.list_by_user(auth.user_id).await?))
}
