use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{CapabilitySet, DisplayRole, StoredCapabilities};
use crate::models;
use crate::routes::{auth, health, members, permissions, perspective, projects, users};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		auth::me,
		auth::logout,
		perspective::get_perspective,
		perspective::switch_perspective,
		perspective::end_perspective,
		projects::list_projects,
		projects::create_project,
		projects::get_project,
		permissions::list_permissions,
		permissions::my_permissions,
		permissions::check_permission,
		members::list_members,
		members::add_member,
		members::upsert_member,
		members::remove_member,
		users::list_users,
		users::create_user,
		users::update_user
	),
	components(
		schemas(
			health::HealthResponse,
			CapabilitySet,
			StoredCapabilities,
			DisplayRole,
			models::user::User,
			models::user::UserCreateRequest,
			models::user::UserUpdateRequest,
			models::user::MeResponse,
			models::project::Project,
			models::project::ProjectCreateRequest,
			models::project::ProjectWithAccess,
			models::membership::ProjectMembership,
			models::membership::TeamContext,
			models::membership::MemberAccess,
			models::membership::MemberRoster,
			models::membership::AddMemberRequest,
			models::membership::UpsertMembershipRequest,
			models::perspective::PerspectiveRequest,
			models::perspective::PerspectiveStatus,
			models::permission::PermissionSummary,
			models::permission::PermissionCheck
		)
	),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Auth", description = "Current session"),
		(name = "Perspective", description = "Administrator view-as-user"),
		(name = "Projects", description = "Projects visible to the context user"),
		(name = "Permissions", description = "Effective capability lookups"),
		(name = "Members", description = "Project membership administration"),
		(name = "Users", description = "User directory")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

	normalize_path_operations(&mut doc);
	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
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

fn normalize_path_operations(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		let snapshot = paths.clone();
		for (path, item) in snapshot {
			if let Some(ops) = item.as_object() {
				let mut normalized = Map::new();
				for (method, val) in ops {
					let key = method.to_lowercase();
					if let Some(existing) = normalized.get_mut(&key) {
						merge_values(existing, val);
					} else {
						normalized.insert(key, val.clone());
					}
				}
				paths.insert(path, Value::Object(normalized));
			}
		}
	}
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else {
		return;
	};

	let components = root.entry("components").or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else {
		return;
	};

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));
	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			"bearerAuth".to_string(),
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			}),
		);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}
