use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::capability::{CapabilityLevel, ResourceKind};
use crate::models::document::{Document, DocumentVersion};
use crate::models::grant::PermissionGrant;
use crate::models::organization::Organization;
use crate::models::project::Project;
use crate::models::user::User;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 (2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP, optional fractional seconds
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

pub fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, AppError> {
    let raw: String = get(row, column)?;
    parse_uuid(&raw)
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, AppError> {
    let raw: Option<String> = get(row, column)?;
    raw.as_deref().map(parse_uuid).transpose()
}

/// Grant row from one of the `*_permissions` tables; the resource column
/// depends on `kind`.
pub fn grant_from_row(row: &SqliteRow, kind: ResourceKind) -> Result<PermissionGrant, AppError> {
    let capability_s: String = get(row, "capability")?;
    let capability: CapabilityLevel = capability_s
        .parse()
        .map_err(|_| AppError::internal(format!("invalid capability: {}", capability_s)))?;
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(PermissionGrant {
        id: get_uuid(row, "id")?,
        resource_kind: kind,
        resource_id: get_uuid(row, kind.grant_column())?,
        user_id: get_uuid(row, "user_id")?,
        capability,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn organization_from_row(row: &SqliteRow) -> Result<Organization, AppError> {
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(Organization {
        id: get_uuid(row, "id")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        is_active: get(row, "is_active")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
        removed_at: parse_opt_datetime(get(row, "removed_at")?)?,
    })
}

pub fn project_from_row(row: &SqliteRow) -> Result<Project, AppError> {
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(Project {
        id: get_uuid(row, "id")?,
        organization_id: get_uuid(row, "organization_id")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        is_active: get(row, "is_active")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
        removed_at: parse_opt_datetime(get(row, "removed_at")?)?,
    })
}

pub fn document_from_row(row: &SqliteRow) -> Result<Document, AppError> {
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(Document {
        id: get_uuid(row, "id")?,
        project_id: get_uuid(row, "project_id")?,
        name: get(row, "name")?,
        mime: get(row, "mime")?,
        is_active: get(row, "is_active")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
        removed_at: parse_opt_datetime(get(row, "removed_at")?)?,
    })
}

pub fn document_version_from_row(row: &SqliteRow) -> Result<DocumentVersion, AppError> {
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(DocumentVersion {
        id: get_uuid(row, "id")?,
        document_id: get_opt_uuid(row, "document_id")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        size: get(row, "size")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(User {
        id: get_uuid(row, "id")?,
        username: get(row, "username")?,
        email: get(row, "email")?,
        is_active: get(row, "is_active")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}
