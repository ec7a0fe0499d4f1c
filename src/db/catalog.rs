//! Minimal entity persistence behind the protected routes, the CLI and
//! test seeding.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers::{
    document_from_row, document_version_from_row, grant_from_row, organization_from_row, project_from_row,
    user_from_row,
};
use crate::errors::{AppError, AppResult};
use crate::models::capability::{CapabilityLevel, ResourceKind};
use crate::models::document::{Document, DocumentVersion};
use crate::models::grant::PermissionGrant;
use crate::models::organization::Organization;
use crate::models::project::Project;
use crate::models::user::User;
use crate::utils::{to_db_timestamp, utc_now};

// =============================================================================
// USERS
// =============================================================================

pub async fn create_user(pool: &SqlitePool, username: &str, email: &str) -> AppResult<User> {
    let id = Uuid::new_v4();
    let now = to_db_timestamp(utc_now());

    sqlx::query("INSERT INTO users (id, username, email, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)")
        .bind(id.to_string())
        .bind(username)
        .bind(email)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(|err| match err.as_database_error() {
            Some(db) if db.is_unique_violation() => AppError::conflict("username or email already taken"),
            _ => AppError::from(err),
        })?;

    get_user(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("user vanished after insert"))
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> AppResult<Option<User>> {
    let row = sqlx::query("SELECT id, username, email, is_active, created_at, updated_at FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// `false` for unknown users as well as deactivated ones.
pub async fn user_is_active(pool: &SqlitePool, id: Uuid) -> AppResult<bool> {
    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(active.unwrap_or(false))
}

pub async fn deactivate_user(pool: &SqlitePool, id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(to_db_timestamp(utc_now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// ORGANIZATIONS / PROJECTS / DOCUMENTS
// =============================================================================

async fn insert_organization(
    conn: &mut SqliteConnection,
    id: Uuid,
    name: &str,
    description: Option<&str>,
) -> AppResult<()> {
    let now = to_db_timestamp(utc_now());

    sqlx::query(
        "INSERT INTO organizations (id, name, description, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(description)
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn create_organization(pool: &SqlitePool, name: &str, description: Option<&str>) -> AppResult<Organization> {
    let id = Uuid::new_v4();
    let mut conn = pool.acquire().await?;
    insert_organization(&mut conn, id, name, description).await?;

    get_organization(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("organization vanished after insert"))
}

/// Creates the organization and the manager's MANAGE grant on it in one
/// transaction; neither exists if either insert fails.
pub async fn create_organization_with_manager(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
    manager_id: Uuid,
) -> AppResult<(Organization, PermissionGrant)> {
    let id = Uuid::new_v4();
    let now = to_db_timestamp(utc_now());
    let mut tx = pool.begin().await?;

    insert_organization(&mut tx, id, name, description).await?;

    let row = sqlx::query(
        "INSERT INTO organization_permissions (id, organization_id, user_id, capability, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         RETURNING id, organization_id, user_id, capability, created_at, updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(id.to_string())
    .bind(manager_id.to_string())
    .bind(CapabilityLevel::Manage.as_str())
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| reference_error(err, "user", manager_id))?;
    let grant = grant_from_row(&row, ResourceKind::Organization)?;

    tx.commit().await?;

    let organization = get_organization(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("organization vanished after insert"))?;
    Ok((organization, grant))
}

pub async fn get_organization(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Organization>> {
    let row = sqlx::query(
        "SELECT id, name, description, is_active, created_at, updated_at, removed_at FROM organizations WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(organization_from_row).transpose()
}

pub async fn create_project(
    pool: &SqlitePool,
    organization_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> AppResult<Project> {
    let id = Uuid::new_v4();
    let now = to_db_timestamp(utc_now());

    sqlx::query(
        "INSERT INTO projects (id, organization_id, name, description, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(id.to_string())
    .bind(organization_id.to_string())
    .bind(name)
    .bind(description)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|err| reference_error(err, "organization", organization_id))?;

    get_project(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("project vanished after insert"))
}

pub async fn get_project(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Project>> {
    let row = sqlx::query(
        "SELECT id, organization_id, name, description, is_active, created_at, updated_at, removed_at FROM projects WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(project_from_row).transpose()
}

pub async fn create_document(pool: &SqlitePool, project_id: Uuid, name: &str, mime: Option<&str>) -> AppResult<Document> {
    let id = Uuid::new_v4();
    let now = to_db_timestamp(utc_now());

    sqlx::query(
        "INSERT INTO documents (id, project_id, name, mime, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(id.to_string())
    .bind(project_id.to_string())
    .bind(name)
    .bind(mime)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|err| reference_error(err, "project", project_id))?;

    get_document(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("document vanished after insert"))
}

pub async fn get_document(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Document>> {
    let row = sqlx::query(
        "SELECT id, project_id, name, mime, is_active, created_at, updated_at, removed_at FROM documents WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(document_from_row).transpose()
}

/// Updates name and/or description. Documents have no description column,
/// so only the name applies to them. Returns whether the row exists.
pub async fn rename(
    pool: &SqlitePool,
    kind: ResourceKind,
    id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
) -> AppResult<bool> {
    let sql = match kind {
        ResourceKind::Document => "UPDATE documents SET name = COALESCE(?, name), updated_at = ? WHERE id = ?".to_string(),
        _ => format!(
            "UPDATE {} SET name = COALESCE(?, name), description = COALESCE(?, description), updated_at = ? WHERE id = ?",
            kind.entity_table()
        ),
    };

    let mut query = sqlx::query(&sql).bind(name);
    if kind != ResourceKind::Document {
        query = query.bind(description);
    }
    let result = query
        .bind(to_db_timestamp(utc_now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Soft-deactivates the entity. Grants on it are left in place and keep
/// resolving.
pub async fn deactivate(pool: &SqlitePool, kind: ResourceKind, id: Uuid) -> AppResult<bool> {
    let now = to_db_timestamp(utc_now());
    let sql = format!(
        "UPDATE {} SET is_active = 0, removed_at = ?, updated_at = ? WHERE id = ?",
        kind.entity_table()
    );

    let result = sqlx::query(&sql)
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// DOCUMENT VERSIONS
// =============================================================================

pub async fn create_version(
    pool: &SqlitePool,
    document_id: Option<Uuid>,
    name: &str,
    size: i64,
) -> AppResult<DocumentVersion> {
    let id = Uuid::new_v4();
    let now = to_db_timestamp(utc_now());

    sqlx::query(
        "INSERT INTO document_versions (id, document_id, name, size, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(document_id.map(|id| id.to_string()))
    .bind(name)
    .bind(size)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|err| reference_error(err, "document", document_id.unwrap_or_default()))?;

    get_version(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("document version vanished after insert"))
}

pub async fn get_version(pool: &SqlitePool, id: Uuid) -> AppResult<Option<DocumentVersion>> {
    let row = sqlx::query(
        "SELECT id, document_id, name, description, size, created_at, updated_at FROM document_versions WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(document_version_from_row).transpose()
}

/// Most recently created version attached to the document.
pub async fn latest_version(pool: &SqlitePool, document_id: Uuid) -> AppResult<Option<DocumentVersion>> {
    let row = sqlx::query(
        "SELECT id, document_id, name, description, size, created_at, updated_at FROM document_versions \
         WHERE document_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
    )
    .bind(document_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(document_version_from_row).transpose()
}

pub async fn update_version(
    pool: &SqlitePool,
    id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
) -> AppResult<Option<DocumentVersion>> {
    sqlx::query(
        "UPDATE document_versions SET name = COALESCE(?, name), description = COALESCE(?, description), updated_at = ? WHERE id = ?",
    )
    .bind(name)
    .bind(description)
    .bind(to_db_timestamp(utc_now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    get_version(pool, id).await
}

pub async fn delete_version(pool: &SqlitePool, id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM document_versions WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn reference_error(err: sqlx::Error, what: &str, id: Uuid) -> AppError {
    match err.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => AppError::reference_not_found(format!("{what} {id} not found")),
        _ => AppError::from(err),
    }
}
