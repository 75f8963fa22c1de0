mod common;

use anyhow::Result;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use tenant_authz::app::build_router;
use tenant_authz::authz::EngineKind;
use tenant_authz::middleware::{self, OPERATOR_ID_HEADER, TENANT_ID_HEADER};
use tenant_authz::{create_app_with, AppConfig, AppState};
use tenant_authz::models::role::{DataScope, RoleUpdateRequest};
use tenant_authz::models::user::TENANT_STATUS_ON;
use tenant_authz::store::{permission_graph, role, user};

use common::{
    assign_roles, create_api, create_permission, create_role, create_user, empty_request, json_request, send,
    setup_pool, test_config, TEST_PASSWORD,
};

struct Fixture {
    tenant_id: u32,
    user_id: u32,
    permission_id: u32,
}

/// Tenant `acme` with user `alice`, a tenant admin allowed to call `/me`, `/logout`
/// and the role listing.
async fn seed_tenant_admin(pool: &SqlitePool) -> Result<Fixture> {
    let tenant = user::create_tenant(pool, "acme", TENANT_STATUS_ON).await?;
    let alice = create_user(pool, tenant.id, "alice").await?;

    let me = create_api(pool, "GET", "/admin/v1/me").await?;
    let logout = create_api(pool, "POST", "/admin/v1/logout").await?;
    let roles = create_api(pool, "GET", "/admin/v1/roles").await?;
    let permission_id = create_permission(pool, tenant.id, "console:basic", &[me.id, logout.id, roles.id]).await?;

    let admin = create_role(pool, tenant.id, "tenant_admin", DataScope::UnitAndChild).await?;
    role::update(
        pool,
        admin.id,
        RoleUpdateRequest {
            permissions: Some(vec![permission_id]),
            ..Default::default()
        },
        None,
    )
    .await?;
    assign_roles(pool, alice.id, tenant.id, &[admin.id]).await?;

    Ok(Fixture {
        tenant_id: tenant.id,
        user_id: alice.id,
        permission_id,
    })
}

async fn app(pool: &SqlitePool) -> Result<Router> {
    Ok(create_app_with(pool.clone(), test_config(EngineKind::RuleBased)).await?)
}

async fn login(app: &Router, username: &str) -> Result<(StatusCode, Value)> {
    let body = json!({ "username": username, "password": TEST_PASSWORD });
    send(app, json_request("POST", "/admin/v1/login", None, &body)?).await
}

fn access_token(body: &Value) -> String {
    body["access_token"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn login_issues_a_token_pair_with_resolved_authority() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let fixture = seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;

    let (status, body) = login(&app, "alice").await?;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    assert_eq!(body["token_type"], "Bearer");
    assert!(!access_token(&body).is_empty());
    assert!(body["refresh_token"].as_str().is_some_and(|token| !token.is_empty()));

    let payload = &body["payload"];
    assert_eq!(payload["user_id"], fixture.user_id);
    assert_eq!(payload["tenant_id"], fixture.tenant_id);
    assert_eq!(payload["roles"], json!(["tenant_admin"]));
    assert_eq!(payload["data_scope"], "UNIT_AND_CHILD");
    assert_eq!(payload["is_tenant_admin"], true);
    Ok(())
}

#[tokio::test]
async fn me_returns_the_token_payload() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let fixture = seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;
    let (_, body) = login(&app, "alice").await?;
    let token = access_token(&body);

    let (status, me) = send(&app, empty_request("GET", "/admin/v1/me", Some(&token))?).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user_id"], fixture.user_id);
    assert_eq!(me["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_unauthorized() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;

    let body = json!({ "username": "alice", "password": "not-the-password" });
    let (status, _) = send(&app, json_request("POST", "/admin/v1/login", None, &body)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = login(&app, "mallory").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn missing_or_forged_token_is_rejected() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;

    let (status, body) = send(&app, empty_request("GET", "/admin/v1/me", None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(&app, empty_request("GET", "/admin/v1/me", Some("not-a-jwt"))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn routes_outside_the_role_policies_are_forbidden() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;
    let (_, body) = login(&app, "alice").await?;
    let token = access_token(&body);

    let (status, roles) = send(&app, empty_request("GET", "/admin/v1/roles", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roles.as_array().map(Vec::len), Some(1));

    let (status, body) = send(&app, empty_request("GET", "/admin/v1/permissions", Some(&token))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    Ok(())
}

#[tokio::test]
async fn disabled_authorization_only_requires_a_token() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_tenant_admin(&pool).await?;
    let mut config = test_config(EngineKind::RuleBased);
    config.authz.enable_authz = false;
    let app = create_app_with(pool.clone(), config).await?;
    let (_, body) = login(&app, "alice").await?;
    let token = access_token(&body);

    let (status, _) = send(&app, empty_request("GET", "/admin/v1/permissions", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, empty_request("GET", "/admin/v1/permissions", None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_access_token() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;
    let (_, body) = login(&app, "alice").await?;
    let token = access_token(&body);

    let (status, body) = send(&app, empty_request("POST", "/admin/v1/logout", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out");

    let (status, body) = send(&app, empty_request("GET", "/admin/v1/me", Some(&token))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token");
    Ok(())
}

#[tokio::test]
async fn refresh_token_is_single_use() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;
    let (_, body) = login(&app, "alice").await?;
    let refresh_token = body["refresh_token"].as_str().unwrap_or_default().to_string();

    let refresh = json!({
        "grant_type": "refresh_token",
        "username": "alice",
        "refresh_token": refresh_token
    });
    let (status, renewed) = send(&app, json_request("POST", "/admin/v1/login", None, &refresh)?).await?;
    assert_eq!(status, StatusCode::OK, "refresh failed: {renewed}");
    assert!(!access_token(&renewed).is_empty());
    assert_ne!(renewed["refresh_token"], refresh["refresh_token"]);

    let (status, _) = send(&app, json_request("POST", "/admin/v1/login", None, &refresh)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn disabled_users_and_tenants_cannot_sign_in() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let fixture = seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;

    user::set_status(&pool, fixture.user_id, "DISABLED").await?;
    let (status, _) = login(&app, "alice").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    user::set_status(&pool, fixture.user_id, "NORMAL").await?;
    sqlx::query("UPDATE tenants SET status = 'OFF' WHERE id = ?")
        .bind(fixture.tenant_id)
        .execute(&pool)
        .await?;
    let (status, _) = login(&app, "alice").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn users_without_an_admin_role_are_refused() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let fixture = seed_tenant_admin(&pool).await?;
    let viewer = create_role(&pool, fixture.tenant_id, "viewer", DataScope::SelfOnly).await?;
    let bob = create_user(&pool, fixture.tenant_id, "bob").await?;
    assign_roles(&pool, bob.id, fixture.tenant_id, &[viewer.id]).await?;
    let app = app(&pool).await?;

    let (status, body) = login(&app, "bob").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    Ok(())
}

#[tokio::test]
async fn policy_reset_picks_up_new_grants() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let root = create_user(&pool, 0, "root").await?;
    let me = create_api(&pool, "GET", "/admin/v1/me").await?;
    let reset = create_api(&pool, "POST", "/admin/v1/policies/reset").await?;
    let permission_id = create_permission(&pool, 0, "platform:ops", &[me.id, reset.id]).await?;
    let platform = create_role(&pool, 0, "super_admin", DataScope::All).await?;
    role::update(
        &pool,
        platform.id,
        RoleUpdateRequest {
            permissions: Some(vec![permission_id]),
            ..Default::default()
        },
        None,
    )
    .await?;
    assign_roles(&pool, root.id, 0, &[platform.id]).await?;

    let app = app(&pool).await?;
    let (status, body) = login(&app, "root").await?;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    assert_eq!(body["payload"]["is_platform_admin"], true);
    let token = access_token(&body);

    let (status, _) = send(&app, empty_request("GET", "/admin/v1/menus", Some(&token))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // granted in the store, not yet visible to the engine
    let menus = create_api(&pool, "GET", "/admin/v1/menus").await?;
    permission_graph::assign_apis_to_permission(&pool, 0, permission_id, &[me.id, reset.id, menus.id]).await?;
    let (status, _) = send(&app, empty_request("GET", "/admin/v1/menus", Some(&token))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, empty_request("POST", "/admin/v1/policies/reset", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engine"], "rule-based");
    assert_eq!(body["rules"], 3);

    let (status, _) = send(&app, empty_request("GET", "/admin/v1/menus", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn store_changes_wait_for_a_reload() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let fixture = seed_tenant_admin(&pool).await?;
    let app = app(&pool).await?;
    let (_, body) = login(&app, "alice").await?;
    let token = access_token(&body);

    let (status, _) = send(&app, empty_request("GET", "/admin/v1/me", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);

    // bypasses the HTTP write paths, so nothing triggers a reload
    permission_graph::assign_apis_to_permission(&pool, fixture.tenant_id, fixture.permission_id, &[]).await?;
    let (status, _) = send(&app, empty_request("GET", "/admin/v1/me", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK, "engine must keep its rules until reloaded");
    Ok(())
}

async fn echo_forwarded_ids(headers: HeaderMap) -> Json<Value> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string);
    Json(json!({ "tenant": header(TENANT_ID_HEADER), "operator": header(OPERATOR_ID_HEADER) }))
}

/// Admin router plus a `GET /admin/v1/echo` route behind the same authorization layer.
async fn app_with_echo(pool: &SqlitePool, config: AppConfig) -> Result<Router> {
    let state = AppState::new(pool.clone(), config);
    state.authorizer.reset_policies(&state.pool).await?;

    let echo = Router::new()
        .route("/admin/v1/echo", get(echo_forwarded_ids))
        .route_layer(from_fn_with_state(state.clone(), middleware::authorize))
        .with_state(state.clone());
    Ok(build_router(state).merge(echo))
}

#[tokio::test]
async fn tenant_and_operator_ids_are_forwarded_when_enabled() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let fixture = seed_tenant_admin(&pool).await?;
    let echo = create_api(&pool, "GET", "/admin/v1/echo").await?;
    let echo_permission = create_permission(&pool, fixture.tenant_id, "console:echo", &[echo.id]).await?;
    let admin = role::find_by_code(&pool, fixture.tenant_id, "tenant_admin")
        .await?
        .expect("seeded role");
    role::update(
        &pool,
        admin.id,
        RoleUpdateRequest {
            permissions: Some(vec![fixture.permission_id, echo_permission]),
            ..Default::default()
        },
        None,
    )
    .await?;

    let mut config = test_config(EngineKind::RuleBased);
    config.authz.inject_tenant_id = true;
    config.authz.inject_operator_id = true;
    let app = app_with_echo(&pool, config).await?;
    let (_, body) = login(&app, "alice").await?;
    let token = access_token(&body);

    let (status, seen) = send(&app, empty_request("GET", "/admin/v1/echo", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK, "echo failed: {seen}");
    assert_eq!(seen["tenant"], fixture.tenant_id.to_string());
    assert_eq!(seen["operator"], fixture.user_id.to_string());

    let app = app_with_echo(&pool, test_config(EngineKind::RuleBased)).await?;
    let (_, body) = login(&app, "alice").await?;
    let token = access_token(&body);

    let (status, seen) = send(&app, empty_request("GET", "/admin/v1/echo", Some(&token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["tenant"], Value::Null);
    assert_eq!(seen["operator"], Value::Null);
    Ok(())
}
