use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::store::{GrantStore, GrantStores};
use crate::errors::{AppError, AppResult};
use crate::models::capability::{CapabilityLevel, ResourceKind};
use crate::models::grant::PermissionGrant;
use crate::db::row_parsers::grant_from_row;
use crate::utils::{to_db_timestamp, utc_now};

/// Grant store over the `<kind>_permissions` table of one resource kind.
///
/// The table's `UNIQUE(<kind>_id, user_id)` constraint backs the
/// one-grant-per-pair rule; `grant` upserts against it in one statement.
#[derive(Debug, Clone)]
pub struct SqliteGrantStore {
    pool: SqlitePool,
    kind: ResourceKind,
}

impl SqliteGrantStore {
    pub fn new(pool: SqlitePool, kind: ResourceKind) -> Self {
        Self { pool, kind }
    }

    fn columns(&self) -> String {
        format!(
            "id, {}, user_id, capability, created_at, updated_at",
            self.kind.grant_column()
        )
    }

    async fn exists(&self, table: &str, id: Uuid) -> AppResult<bool> {
        let found = sqlx::query(&format!("SELECT 1 FROM {table} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

/// One SQLite-backed store per resource kind over the same pool.
pub fn grant_stores(pool: &SqlitePool) -> GrantStores {
    let store = |kind: ResourceKind| -> Arc<dyn GrantStore> { Arc::new(SqliteGrantStore::new(pool.clone(), kind)) };
    GrantStores::new(
        store(ResourceKind::Organization),
        store(ResourceKind::Project),
        store(ResourceKind::Document),
    )
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_foreign_key_violation())
        .unwrap_or(false)
}

#[async_trait]
impl GrantStore for SqliteGrantStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn find_by_resource_and_user(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<PermissionGrant>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? AND user_id = ?",
            self.columns(),
            self.kind.grant_table(),
            self.kind.grant_column()
        );

        let row = sqlx::query(&sql)
            .bind(resource_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| grant_from_row(&row, self.kind)).transpose()
    }

    async fn find_by_id(&self, grant_id: Uuid) -> AppResult<Option<PermissionGrant>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            self.columns(),
            self.kind.grant_table()
        );

        let row = sqlx::query(&sql)
            .bind(grant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| grant_from_row(&row, self.kind)).transpose()
    }

    async fn grant(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
        capability: CapabilityLevel,
    ) -> AppResult<PermissionGrant> {
        if !self.exists(self.kind.entity_table(), resource_id).await? {
            return Err(AppError::reference_not_found(format!(
                "{} {resource_id} not found",
                self.kind
            )));
        }
        if !self.exists("users", user_id).await? {
            return Err(AppError::reference_not_found(format!("user {user_id} not found")));
        }

        let now = to_db_timestamp(utc_now());
        let column = self.kind.grant_column();
        let sql = format!(
            "INSERT INTO {table} (id, {column}, user_id, capability, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT({column}, user_id) DO UPDATE SET \
             capability = excluded.capability, updated_at = excluded.updated_at \
             RETURNING {columns}",
            table = self.kind.grant_table(),
            columns = self.columns(),
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(resource_id.to_string())
            .bind(user_id.to_string())
            .bind(capability.as_str())
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                // Resource or user removed between the checks and the insert.
                if is_foreign_key_violation(&err) {
                    AppError::reference_not_found(format!("{} {resource_id} or user {user_id} not found", self.kind))
                } else {
                    AppError::from(err)
                }
            })?;

        let grant = grant_from_row(&row, self.kind)?;
        tracing::debug!(grant_id = %grant.id, resource = %grant.resource(), %user_id, %capability, "grant stored");
        Ok(grant)
    }

    async fn update_capability(
        &self,
        grant_id: Uuid,
        capability: CapabilityLevel,
    ) -> AppResult<Option<PermissionGrant>> {
        let sql = format!(
            "UPDATE {} SET capability = ?, updated_at = ? WHERE id = ? RETURNING {}",
            self.kind.grant_table(),
            self.columns()
        );

        let row = sqlx::query(&sql)
            .bind(capability.as_str())
            .bind(to_db_timestamp(utc_now()))
            .bind(grant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| grant_from_row(&row, self.kind)).transpose()
    }

    async fn revoke(&self, grant_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.kind.grant_table()))
            .bind(grant_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_by_resource_and_user(&self, resource_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND user_id = ?",
            self.kind.grant_table(),
            self.kind.grant_column()
        );

        let result = sqlx::query(&sql)
            .bind(resource_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_resource(&self, resource_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.columns(),
            self.kind.grant_table(),
            self.kind.grant_column()
        );

        let rows = sqlx::query(&sql)
            .bind(resource_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| grant_from_row(row, self.kind)).collect()
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = ?",
            self.columns(),
            self.kind.grant_table()
        );

        let rows = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| grant_from_row(row, self.kind)).collect()
    }
}
