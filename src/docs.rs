use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, middleware, models, routes, token};

pub const BEARER_SCHEME: &str = "bearer_auth";

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::login,
		routes::auth::logout,
		routes::auth::me,
		routes::roles::list_roles,
		routes::roles::create_role,
		routes::roles::get_role,
		routes::roles::update_role,
		routes::roles::delete_role,
		routes::roles::remove_role_permissions,
		routes::roles::get_role_metadata,
		routes::roles::seed_role,
		routes::roles::sync_template,
		routes::permissions::list_permissions,
		routes::permissions::create_permission,
		routes::permissions::get_permission,
		routes::permissions::update_permission,
		routes::permissions::delete_permission,
		routes::permissions::assign_permission_apis,
		routes::permissions::assign_permission_menus,
		routes::permissions::list_permission_groups,
		routes::permissions::create_permission_group,
		routes::assignments::list_user_assignments,
		routes::assignments::replace_user_assignments,
		routes::assignments::remove_user_assignments,
		routes::assignments::list_membership_assignments,
		routes::assignments::replace_membership_assignments,
		routes::assignments::remove_membership_assignments,
		routes::resources::list_api_resources,
		routes::resources::create_api_resource,
		routes::resources::delete_api_resource,
		routes::resources::refresh_api_cache,
		routes::resources::list_menus,
		routes::resources::create_menu,
		routes::resources::compiled_policies,
		routes::resources::reset_policies
	),
	components(
		schemas(
			models::user::User,
			models::user::GrantType,
			models::user::LoginRequest,
			models::user::LoginResponse,
			models::role::Role,
			models::role::DataScope,
			models::role::SwitchStatus,
			models::role::SyncPolicy,
			models::role::RoleCreateRequest,
			models::role::RoleUpdateRequest,
			models::role::RoleMetadata,
			models::role::SeedFromTemplateRequest,
			models::permission::Permission,
			models::permission::PermissionCreateRequest,
			models::permission::PermissionUpdateRequest,
			models::permission::AssignIdsRequest,
			models::permission::PermissionGroup,
			models::permission::PermissionGroupCreateRequest,
			models::resource::ApiResource,
			models::resource::ApiResourceCreateRequest,
			models::resource::Menu,
			models::resource::MenuCreateRequest,
			models::assignment::Assignment,
			models::assignment::AssignmentInput,
			models::assignment::ReplaceAssignmentsRequest,
			models::assignment::RemoveAssignmentsRequest,
			authz::AuthorizerData,
			token::UserTokenPayload,
			middleware::Viewer,
			routes::auth::MessageResponse,
			routes::health::HealthResponse,
			routes::roles::SyncResponse,
			routes::assignments::RemovedResponse,
			routes::resources::ResetPoliciesResponse
		)
	),
	tags(
		(name = "Auth", description = "Login, logout and the current token payload"),
		(name = "Roles", description = "Roles, templates and their permission sets"),
		(name = "Permissions", description = "Permissions, groups and their API/menu sets"),
		(name = "Assignments", description = "Time-bounded user and membership assignments"),
		(name = "Resources", description = "API resources and menus"),
		(name = "Policies", description = "Compiled policies and engine reload"),
		(name = "Health", description = "Liveness")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_openapi_version(&mut doc);
	add_request_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let json_route = get(move || {
		let doc = doc.clone();
		async move { Json(doc) }
	});

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn root(doc: &mut Value) -> Option<&mut Map<String, Value>> {
	doc.as_object_mut()
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = root(doc) else { return; };
	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else { return; };
	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));

	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			BEARER_SCHEME.to_string(),
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			}),
		);
	}
}

fn ensure_openapi_version(doc: &mut Value) {
	if let Some(root) = root(doc) {
		root.entry("openapi")
			.or_insert_with(|| Value::String("3.1.0".to_string()));
	}
}

fn request_example(reference: &str) -> Option<Value> {
	match reference {
		"#/components/schemas/LoginRequest" => Some(json!({
			"grant_type": "password",
			"username": "admin",
			"password": "S3cureP@ssw0rd",
			"device_id": "console"
		})),
		"#/components/schemas/RoleCreateRequest" => Some(json!({
			"code": "auditor",
			"name": "Auditor",
			"data_scope": "UNIT_AND_CHILD",
			"permissions": [1, 2]
		})),
		"#/components/schemas/PermissionCreateRequest" => Some(json!({
			"code": "order:export",
			"name": "Export orders",
			"api_ids": [7, 9]
		})),
		"#/components/schemas/ReplaceAssignmentsRequest" => Some(json!({
			"tenant_id": 5,
			"items": [{ "target_id": 3, "is_primary": true, "end_at": "2026-12-31T00:00:00Z" }]
		})),
		_ => None,
	}
}

fn add_request_examples(doc: &mut Value) {
	let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) else { return; };

	for item in paths.values_mut() {
		let Some(operations) = item.as_object_mut() else { continue; };
		for operation in operations.values_mut() {
			let Some(app_json) = operation
				.pointer_mut("/requestBody/content/application~1json")
				.and_then(Value::as_object_mut)
			else {
				continue;
			};
			let example = app_json
				.get("schema")
				.and_then(|schema| schema.get("$ref"))
				.and_then(Value::as_str)
				.and_then(request_example);
			if let Some(example) = example {
				app_json.insert("example".to_string(), example);
			}
		}
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{port}");

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
