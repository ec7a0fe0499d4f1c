use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::authz::ancestry::{AncestryResolver, EntityLookup};
use crate::authz::reference::{ReferenceKind, ReferenceTranslator};
use crate::db::row_parsers::parse_uuid;
use crate::errors::LookupError;
use crate::models::capability::ResourceKind;

/// Parent-id lookup over the entity table of one resource kind.
///
/// Deactivated rows are still found; only a missing row is `ResourceNotFound`.
#[derive(Debug, Clone)]
pub struct SqliteEntityLookup {
    pool: SqlitePool,
    kind: ResourceKind,
}

impl SqliteEntityLookup {
    pub fn new(pool: SqlitePool, kind: ResourceKind) -> Self {
        Self { pool, kind }
    }

    fn parent_column(&self) -> Option<&'static str> {
        match self.kind {
            ResourceKind::Organization => None,
            ResourceKind::Project => Some("organization_id"),
            ResourceKind::Document => Some("project_id"),
        }
    }
}

#[async_trait]
impl EntityLookup for SqliteEntityLookup {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn parent_of(&self, id: Uuid) -> Result<Option<Uuid>, LookupError> {
        let column = self.parent_column().unwrap_or("NULL");
        let sql = format!(
            "SELECT {column} AS parent_id FROM {} WHERE id = ?",
            self.kind.entity_table()
        );

        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LookupError::ResourceNotFound { kind: self.kind, id })?;

        let parent: Option<String> = row.try_get("parent_id")?;
        Ok(parent.as_deref().map(parse_uuid).transpose()?)
    }
}

/// Ancestry over the three entity tables.
pub fn ancestry(pool: &SqlitePool) -> AncestryResolver {
    let lookup = |kind: ResourceKind| -> Arc<dyn EntityLookup> { Arc::new(SqliteEntityLookup::new(pool.clone(), kind)) };
    AncestryResolver::new(
        lookup(ResourceKind::Organization),
        lookup(ResourceKind::Project),
        lookup(ResourceKind::Document),
    )
}

/// Document version -> owning document.
#[derive(Debug, Clone)]
pub struct DocumentVersionOwner {
    pool: SqlitePool,
}

impl DocumentVersionOwner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceTranslator for DocumentVersionOwner {
    fn owner_kind(&self) -> ResourceKind {
        ResourceKind::Document
    }

    async fn owner_of(&self, reference_id: Uuid) -> Result<Option<Uuid>, LookupError> {
        let row = sqlx::query("SELECT document_id FROM document_versions WHERE id = ?")
            .bind(reference_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LookupError::ReferenceNotFound {
                reference: ReferenceKind::DocumentVersion.as_str(),
                id: reference_id,
            })?;

        let document_id: Option<String> = row.try_get("document_id")?;
        Ok(document_id.as_deref().map(parse_uuid).transpose()?)
    }
}
