use serde_json::Value;

#[test]
fn openapi_documents_the_admin_surface() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = tenant_authz::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let schemas = v
        .pointer("/components/schemas")
        .and_then(Value::as_object)
        .expect("components.schemas must exist");
    for name in ["Role", "Permission", "UserTokenPayload", "LoginResponse", "AuthorizerData"] {
        assert!(schemas.contains_key(name), "OpenAPI schemas missing '{name}'");
    }

    let payload = schemas["UserTokenPayload"]
        .get("properties")
        .and_then(Value::as_object)
        .expect("UserTokenPayload.properties must exist");
    for key in ["user_id", "tenant_id", "roles", "data_scope", "is_platform_admin", "is_tenant_admin"] {
        assert!(payload.contains_key(key), "UserTokenPayload missing '{key}'");
    }

    assert!(
        v.pointer(&format!("/components/securitySchemes/{}", tenant_authz::docs::BEARER_SCHEME)).is_some(),
        "bearer security scheme missing"
    );
    assert_eq!(v["servers"][0]["url"], "http://localhost:8000");

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for path in ["/admin/v1/login", "/admin/v1/roles/{id}", "/admin/v1/policies/reset"] {
        assert!(paths.contains_key(path), "OpenAPI path missing '{path}'");
    }

    let login_example = v.pointer("/paths/~1admin~1v1~1login/post/requestBody/content/application~1json/example");
    assert_eq!(login_example.and_then(|e| e.get("username")), Some(&Value::from("admin")));

    Ok(())
}
