#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use tenant_authz::authz::EngineKind;
use tenant_authz::jwt::JwtConfig;
use tenant_authz::models::assignment::AssignmentInput;
use tenant_authz::models::permission::PermissionCreateRequest;
use tenant_authz::models::resource::{ApiResource, ApiResourceCreateRequest};
use tenant_authz::models::role::{DataScope, Role, RoleCreateRequest};
use tenant_authz::models::user::User;
use tenant_authz::store::{permission, resource, role, user, AssignmentStore};
use tenant_authz::utils::hash_password;
use tenant_authz::AppConfig;

pub const TEST_PASSWORD: &str = "S3cureP@ssw0rd";

/// Migrated SQLite database in a temp dir. Keep the `TempDir` alive for the test.
pub async fn setup_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempdir()?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

pub fn test_config(engine: EngineKind) -> AppConfig {
    AppConfig::new(JwtConfig::new("test-secret")).with_engine(engine)
}

pub async fn create_role(pool: &SqlitePool, tenant_id: u32, code: &str, scope: DataScope) -> Result<Role> {
    let req = RoleCreateRequest {
        tenant_id: Some(tenant_id),
        code: Some(code.to_string()),
        name: Some(code.to_string()),
        data_scope: Some(scope),
        ..Default::default()
    };
    Ok(role::create(pool, req, None).await?)
}

pub async fn create_api(pool: &SqlitePool, method: &str, path: &str) -> Result<ApiResource> {
    let req = ApiResourceCreateRequest {
        path: path.to_string(),
        method: method.to_string(),
        module: Some("test".to_string()),
        operation: Some(format!("{method} {path}")),
        description: None,
        scope: None,
    };
    Ok(resource::create_api(pool, req).await?)
}

/// Permission in `tenant_id` bound to exactly `api_ids`.
pub async fn create_permission(pool: &SqlitePool, tenant_id: u32, code: &str, api_ids: &[u32]) -> Result<u32> {
    let req = PermissionCreateRequest {
        tenant_id: Some(tenant_id),
        code: Some(code.to_string()),
        name: Some(code.to_string()),
        api_ids: Some(api_ids.to_vec()),
        ..Default::default()
    };
    Ok(permission::create(pool, req).await?.id)
}

pub async fn create_user(pool: &SqlitePool, tenant_id: u32, username: &str) -> Result<User> {
    let hash = hash_password(TEST_PASSWORD)?;
    Ok(user::create(pool, tenant_id, username, &hash).await?)
}

pub async fn assign_roles(pool: &SqlitePool, user_id: u32, tenant_id: u32, role_ids: &[u32]) -> Result<()> {
    let rows: Vec<AssignmentInput> = role_ids.iter().copied().map(AssignmentInput::target).collect();
    AssignmentStore::user_roles()
        .replace(pool, user_id, tenant_id, &rows, None)
        .await?;
    Ok(())
}

pub async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, Value)> {
    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    Ok(builder.body(Body::from(serde_json::to_vec(body)?))?)
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    Ok(builder.body(Body::empty())?)
}
