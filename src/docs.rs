use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes::{health, permissions, resources, versions};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		resources::create_organization,
		resources::get_organization,
		resources::update_organization,
		resources::deactivate_organization,
		resources::create_project,
		resources::get_project,
		resources::update_project,
		resources::deactivate_project,
		resources::create_document,
		resources::get_document,
		resources::update_document,
		resources::deactivate_document,
		versions::create_version,
		versions::get_version,
		versions::latest_version,
		versions::update_version,
		versions::delete_version,
		permissions::list_permissions,
		permissions::grant_permission,
		permissions::revoke_user_permission,
		permissions::get_grant,
		permissions::update_grant,
		permissions::revoke_grant,
		permissions::organization_effective,
		permissions::project_effective,
		permissions::document_effective,
		permissions::my_permissions
	),
	components(
		schemas(
			health::HealthResponse,
			models::capability::CapabilityLevel,
			models::capability::ResourceKind,
			models::capability::ResourceRef,
			models::grant::PermissionGrant,
			models::grant::GrantPermissionRequest,
			models::grant::UpdatePermissionRequest,
			models::grant::LevelContribution,
			models::grant::Resolution,
			models::organization::Organization,
			models::organization::OrganizationCreateRequest,
			models::organization::ResourceUpdateRequest,
			models::project::Project,
			models::project::ProjectCreateRequest,
			models::document::Document,
			models::document::DocumentCreateRequest,
			models::document::DocumentVersion,
			models::document::DocumentVersionUpdateRequest,
			versions::DocumentVersionCreateRequest
		)
	),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Organizations", description = "Hierarchy root"),
		(name = "Projects", description = "Projects within an organization"),
		(name = "Documents", description = "Documents within a project"),
		(name = "Document versions", description = "Revisions, secured through their document"),
		(name = "Permissions", description = "Capability grants and effective capability queries")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	let root = doc
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))?;
	ensure_security_components(root);
	root.entry("security").or_insert_with(|| json!([{ "bearerAuth": [] }]));
	mark_public(root, "/api/health");
	root.insert("servers".to_string(), json!([{ "url": format!("http://localhost:{port}") }]));

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(root: &mut Map<String, Value>) {
	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));

	if let Some(components) = components.as_object_mut() {
		let schemes = components
			.entry("securitySchemes")
			.or_insert_with(|| Value::Object(Map::new()));
		if let Some(schemes) = schemes.as_object_mut() {
			schemes.insert(
				"bearerAuth".to_string(),
				json!({ "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }),
			);
		}
	}
}

/// Clears the global bearer requirement on every operation of `path`.
fn mark_public(root: &mut Map<String, Value>, path: &str) {
	let Some(item) = root
		.get_mut("paths")
		.and_then(|paths| paths.get_mut(path))
		.and_then(Value::as_object_mut)
	else {
		return;
	};

	for operation in item.values_mut() {
		if let Some(operation) = operation.as_object_mut() {
			operation.insert("security".to_string(), json!([]));
		}
	}
}
