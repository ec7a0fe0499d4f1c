use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{secured, AccessGuard, GrantStores, PermissionResolver, ReferenceKind, ReferenceRegistry, Requirement};
use crate::db::{grant_store, lookups, DocumentVersionOwner};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::models::capability::CapabilityLevel::{Create, Invite, Manage};
use crate::models::capability::ResourceKind;
use crate::routes::{health, permissions, resources, versions};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub grants: GrantStores,
    pub guard: Arc<AccessGuard>,
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires the SQLite-backed grant stores, ancestry and reference
    /// translators into one guard.
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        let grants = grant_store::grant_stores(&pool);
        let references = ReferenceRegistry::new()
            .with(
                ReferenceKind::DocumentVersion,
                Arc::new(DocumentVersionOwner::new(pool.clone())),
            )
            .with_grant_owners(&grants);
        let resolver = PermissionResolver::new(grants.clone(), lookups::ancestry(&pool));

        Self {
            pool,
            jwt: Arc::new(jwt),
            grants,
            guard: Arc::new(AccessGuard::new(resolver, references)),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/health", get(health::health))
        .merge(resource_routes(&state))
        .merge(version_routes(&state))
        .merge(permission_routes(&state))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

fn resource_routes(state: &AppState) -> Router<AppState> {
    let org = |capability| Requirement::new(ResourceKind::Organization, capability);
    let project = |capability| Requirement::new(ResourceKind::Project, capability);
    let document = |capability| Requirement::new(ResourceKind::Document, capability);

    Router::new()
        .route("/organizations", post(resources::create_organization))
        .route(
            "/organizations/:id",
            secured(state, org(Invite), get(resources::get_organization))
                .merge(secured(state, org(Create), put(resources::update_organization)))
                .merge(secured(state, org(Manage), delete(resources::deactivate_organization))),
        )
        .route(
            "/organizations/:id/projects",
            secured(state, org(Create), post(resources::create_project)),
        )
        .route(
            "/projects/:id",
            secured(state, project(Invite), get(resources::get_project))
                .merge(secured(state, project(Create), put(resources::update_project)))
                .merge(secured(state, project(Manage), delete(resources::deactivate_project))),
        )
        .route(
            "/projects/:id/documents",
            secured(state, project(Create), post(resources::create_document)),
        )
        .route(
            "/documents/:id",
            secured(state, document(Invite), get(resources::get_document))
                .merge(secured(state, document(Create), put(resources::update_document)))
                .merge(secured(state, document(Manage), delete(resources::deactivate_document))),
        )
}

fn version_routes(state: &AppState) -> Router<AppState> {
    let via_version =
        |capability| Requirement::new(ResourceKind::Document, capability).via(ReferenceKind::DocumentVersion);

    Router::new()
        .route(
            "/documents/:id/versions",
            secured(
                state,
                Requirement::new(ResourceKind::Document, Create),
                post(versions::create_version),
            ),
        )
        .route(
            "/documents/:id/versions/latest",
            secured(
                state,
                Requirement::new(ResourceKind::Document, Invite),
                get(versions::latest_version),
            ),
        )
        .route(
            "/document-versions/:id",
            secured(state, via_version(Invite), get(versions::get_version))
                .merge(secured(state, via_version(Create), put(versions::update_version)))
                .merge(secured(state, via_version(Manage), delete(versions::delete_version))),
        )
}

/// Administration routes for every kind, MANAGE throughout.
fn permission_routes(state: &AppState) -> Router<AppState> {
    let mut router = Router::new().route("/me/permissions", get(permissions::my_permissions));

    for kind in ResourceKind::ALL {
        let on_resource = Requirement::new(kind, Manage);
        let on_grant = Requirement::new(kind, Manage).via(ReferenceKind::grant(kind));
        let plural = kind.entity_table();

        let effective = match kind {
            ResourceKind::Organization => get(permissions::organization_effective),
            ResourceKind::Project => get(permissions::project_effective),
            ResourceKind::Document => get(permissions::document_effective),
        };

        router = router
            .route(
                &format!("/{plural}/:id/permissions"),
                secured(state, on_resource, get(permissions::list_permissions))
                    .merge(secured(state, on_resource, post(permissions::grant_permission))),
            )
            .route(
                &format!("/{plural}/:id/permissions/users/:user_id"),
                secured(state, on_resource, delete(permissions::revoke_user_permission)),
            )
            .route(
                &format!("/{kind}-permissions/:id"),
                secured(state, on_grant, get(permissions::get_grant))
                    .merge(secured(state, on_grant, put(permissions::update_grant)))
                    .merge(secured(state, on_grant, delete(permissions::revoke_grant))),
            )
            .route(&format!("/{plural}/:id/effective-capability"), effective);
    }

    router
}
