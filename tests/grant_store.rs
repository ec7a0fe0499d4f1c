use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

use doc_access::db::{catalog, grant_store};
use doc_access::errors::AppError;
use doc_access::models::capability::CapabilityLevel::{Create, Invite, Manage};
use doc_access::models::capability::ResourceKind;

async fn setup() -> Result<(TempDir, SqlitePool)> {
    let dir = tempdir()?;
    let db_path = dir.path().join("test.db");

    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

#[tokio::test]
async fn regranting_replaces_capability_in_place() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let user = catalog::create_user(&pool, "bob", "bob@example.com").await?.id;
    let org = catalog::create_organization(&pool, "Acme", None).await?.id;
    let store = grant_store::grant_stores(&pool).for_kind(ResourceKind::Organization).clone();

    let first = store.grant(org, user, Invite).await?;
    let second = store.grant(org, user, Manage).await?;

    assert_eq!(first.id, second.id, "upsert must keep the original row");
    assert_eq!(second.capability, Manage);
    assert_eq!(store.list_by_resource(org).await?.len(), 1);

    let found = store.find_by_resource_and_user(org, user).await?;
    assert_eq!(found.map(|g| g.capability), Some(Manage));
    Ok(())
}

#[tokio::test]
async fn revoke_reports_whether_a_row_was_removed() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let user = catalog::create_user(&pool, "carol", "carol@example.com").await?.id;
    let org = catalog::create_organization(&pool, "Acme", None).await?.id;
    let project = catalog::create_project(&pool, org, "Tower", None).await?.id;
    let store = grant_store::grant_stores(&pool).for_kind(ResourceKind::Project).clone();

    let grant = store.grant(project, user, Create).await?;
    assert!(store.revoke(grant.id).await?);
    assert!(!store.revoke(grant.id).await?);
    assert!(!store.revoke_by_resource_and_user(project, user).await?);
    assert!(store.find_by_id(grant.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn granting_on_unknown_references_fails() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let user = catalog::create_user(&pool, "dave", "dave@example.com").await?.id;
    let org = catalog::create_organization(&pool, "Acme", None).await?.id;
    let project = catalog::create_project(&pool, org, "Tower", None).await?.id;
    let document = catalog::create_document(&pool, project, "Plan", None).await?.id;
    let store = grant_store::grant_stores(&pool).for_kind(ResourceKind::Document).clone();

    let missing_resource = store.grant(Uuid::new_v4(), user, Invite).await;
    assert!(matches!(missing_resource, Err(AppError::ReferenceNotFound(_))));

    let missing_user = store.grant(document, Uuid::new_v4(), Invite).await;
    assert!(matches!(missing_user, Err(AppError::ReferenceNotFound(_))));

    assert!(store.list_by_resource(document).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn update_of_missing_grant_returns_none() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let store = grant_store::grant_stores(&pool).for_kind(ResourceKind::Organization).clone();

    assert!(store.update_capability(Uuid::new_v4(), Manage).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn update_changes_only_the_capability() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let user = catalog::create_user(&pool, "erin", "erin@example.com").await?.id;
    let org = catalog::create_organization(&pool, "Acme", None).await?.id;
    let store = grant_store::grant_stores(&pool).for_kind(ResourceKind::Organization).clone();

    let grant = store.grant(org, user, Invite).await?;
    let updated = store
        .update_capability(grant.id, Create)
        .await?
        .expect("grant exists");

    assert_eq!(updated.id, grant.id);
    assert_eq!(updated.resource_id, org);
    assert_eq!(updated.user_id, user);
    assert_eq!(updated.capability, Create);
    assert_eq!(updated.created_at, grant.created_at);
    Ok(())
}

#[tokio::test]
async fn list_by_user_spans_every_kind() -> Result<()> {
    let (_dir, pool) = setup().await?;
    let user = catalog::create_user(&pool, "frank", "frank@example.com").await?.id;
    let org = catalog::create_organization(&pool, "Acme", None).await?.id;
    let project = catalog::create_project(&pool, org, "Tower", None).await?.id;
    let document = catalog::create_document(&pool, project, "Plan", None).await?.id;
    let stores = grant_store::grant_stores(&pool);

    stores.for_kind(ResourceKind::Organization).grant(org, user, Invite).await?;
    stores.for_kind(ResourceKind::Document).grant(document, user, Manage).await?;

    let grants = stores.list_by_user(user).await?;
    let mut kinds: Vec<_> = grants.iter().map(|g| g.resource_kind).collect();
    kinds.sort_by_key(|kind| kind.as_str());
    assert_eq!(kinds, vec![ResourceKind::Document, ResourceKind::Organization]);
    Ok(())
}

#[tokio::test]
async fn organization_is_not_created_without_its_manager() -> Result<()> {
    let (_dir, pool) = setup().await?;

    let result = catalog::create_organization_with_manager(&pool, "Ghost", None, Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::ReferenceNotFound(_))));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM organizations").fetch_one(&pool).await?;
    assert_eq!(count, 0);

    let user = catalog::create_user(&pool, "erin", "erin@example.com").await?.id;
    let (org, grant) = catalog::create_organization_with_manager(&pool, "Acme", Some("HQ"), user).await?;
    assert_eq!(grant.resource_id, org.id);
    assert_eq!(grant.user_id, user);
    assert_eq!(grant.capability, Manage);

    let stored = grant_store::grant_stores(&pool)
        .for_kind(ResourceKind::Organization)
        .find_by_resource_and_user(org.id, user)
        .await?;
    assert_eq!(stored.map(|g| g.id), Some(grant.id));
    Ok(())
}
