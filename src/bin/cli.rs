use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use doc_access::authz::PermissionResolver;
use doc_access::db::{self, catalog, grant_store, lookups};
use doc_access::jwt::JwtConfig;
use doc_access::models::capability::{CapabilityLevel, ResourceKind, ResourceRef};

#[derive(Parser, Debug)]
#[command(author, version, about = "doc-access administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Register a user
    CreateUser { username: String, email: String },
    /// Grant (or replace) a capability on a resource
    Grant {
        /// organization, project or document
        kind: ResourceKind,
        resource_id: Uuid,
        user_id: Uuid,
        /// INVITE, CREATE or MANAGE
        capability: CapabilityLevel,
    },
    /// Remove a user's direct grant on a resource
    Revoke {
        kind: ResourceKind,
        resource_id: Uuid,
        user_id: Uuid,
    },
    /// Print the effective capability and the chain it was resolved from
    Effective {
        kind: ResourceKind,
        resource_id: Uuid,
        user_id: Uuid,
    },
    /// Issue a bearer token for a user
    Token { user_id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Fall back to the crate-local `.env` when started outside the repo root.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CreateUser { username, email } => {
            let pool = get_pool().await?;
            let user = catalog::create_user(&pool, &username, &email).await?;
            println!("{}", user.id);
        }
        Commands::Grant {
            kind,
            resource_id,
            user_id,
            capability,
        } => {
            let pool = get_pool().await?;
            let grant = grant_store::grant_stores(&pool)
                .for_kind(kind)
                .grant(resource_id, user_id, capability)
                .await?;
            println!("{} {} on {} for {}", grant.id, grant.capability, grant.resource(), grant.user_id);
        }
        Commands::Revoke {
            kind,
            resource_id,
            user_id,
        } => {
            let pool = get_pool().await?;
            let removed = grant_store::grant_stores(&pool)
                .for_kind(kind)
                .revoke_by_resource_and_user(resource_id, user_id)
                .await?;
            if removed {
                println!("Revoked");
            } else {
                println!("No grant to revoke");
            }
        }
        Commands::Effective {
            kind,
            resource_id,
            user_id,
        } => {
            let pool = get_pool().await?;
            let resolver = PermissionResolver::new(grant_store::grant_stores(&pool), lookups::ancestry(&pool));
            let resolution = resolver.explain(user_id, ResourceRef::new(kind, resource_id)).await;

            for level in &resolution.chain {
                let direct = level.direct.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
                println!("{:<50} {}", level.resource, direct);
            }
            match resolution.effective {
                Some(capability) => println!("effective: {capability}"),
                None => println!("effective: none"),
            }
        }
        Commands::Token { user_id } => {
            let jwt = JwtConfig::from_env()?;
            println!("{}", jwt.encode(user_id)?);
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    db::connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let table = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
