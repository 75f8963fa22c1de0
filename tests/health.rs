mod common;

use anyhow::Result;
use axum::http::StatusCode;

use tenant_authz::authz::EngineKind;
use tenant_authz::create_app_with;

use common::{empty_request, send, setup_pool, test_config};

#[tokio::test]
async fn health_endpoint_reports_db_ok() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let app = create_app_with(pool.clone(), test_config(EngineKind::QueryBased)).await?;

    // public: no bearer token
    let (status, body) = send(&app, empty_request("GET", "/admin/v1/health", None)?).await?;

    assert_eq!(status, StatusCode::OK, "health endpoint did not return 200");
    assert_eq!(body["db_ok"], true, "expected db_ok: true, got: {body}");
    assert_eq!(body["engine"], "query-based");
    Ok(())
}

#[tokio::test]
async fn unknown_routes_are_not_found() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let app = create_app_with(pool.clone(), test_config(EngineKind::Noop)).await?;

    let (status, _) = send(&app, empty_request("GET", "/admin/v1/nowhere", None)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
