//! Per-request authentication and authorization, plus the operation log.

use std::time::Instant;

use axum::async_trait;
use axum::extract::{FromRequestParts, MatchedPath, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{AuthzRequest, DEFAULT_DOMAIN};
use crate::errors::{AppError, AppResult};
use crate::models::role::DataScope;
use crate::token::{payload_from_claims, TokenCategory, UserTokenPayload};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const OPERATOR_ID_HEADER: &str = "x-operator-id";

/// Operations reachable without a token, as `(method, route template)`.
pub const PUBLIC_OPERATIONS: [(Method, &str); 2] = [
    (Method::POST, "/admin/v1/login"),
    (Method::GET, "/admin/v1/health"),
];

/// Authorization context of the current request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Viewer {
    pub user_id: u32,
    pub username: Option<String>,
    pub tenant_id: u32,
    pub org_unit_id: Option<u32>,
    pub trace_id: String,
    pub data_scope: DataScope,
    pub roles: Vec<String>,
    pub is_platform_admin: bool,
    pub is_tenant_admin: bool,
}

impl Viewer {
    pub fn from_payload(payload: &UserTokenPayload, trace_id: String) -> Self {
        Self {
            user_id: payload.user_id,
            username: payload.username.clone(),
            tenant_id: payload.tenant(),
            org_unit_id: payload.org_unit_id,
            trace_id,
            data_scope: payload.data_scope.unwrap_or_default(),
            roles: payload.roles.clone(),
            is_platform_admin: payload.is_platform_admin(),
            is_tenant_admin: payload.is_tenant_admin(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Viewer>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("no authenticated viewer"))
    }
}

/// The bearer token the request was authenticated with.
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn trace_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn matched_route(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

pub fn is_public(method: &Method, route: &str) -> bool {
    PUBLIC_OPERATIONS
        .iter()
        .any(|(public_method, public_route)| public_method == method && *public_route == route)
}

/// Validates a signed access token against the revocation store and decodes its payload.
pub fn check_access_token(state: &AppState, token: &str) -> AppResult<UserTokenPayload> {
    let claims = state.jwt.decode(token)?;
    let payload = payload_from_claims(&claims);

    if payload.user_id == 0 {
        return Err(AppError::token("token carries no user"));
    }
    if !state.tokens.exists(TokenCategory::Access, payload.user_id, token) {
        return Err(AppError::token("access token expired or revoked"));
    }
    if state.tokens.is_blocked(payload.user_id, token) {
        return Err(AppError::token("access token blocked"));
    }

    Ok(payload)
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: u32) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Rejects unauthenticated requests, exposes the [`Viewer`], and asks the policy engine
/// whether the caller's roles may invoke the matched route.
pub async fn authorize(State(state): State<AppState>, mut req: Request, next: Next) -> AppResult<Response> {
    let route = matched_route(&req);
    let method = req.method().clone();

    if is_public(&method, &route) {
        return Ok(next.run(req).await);
    }

    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::unauthorized("bearer token missing"))?
        .to_string();
    let payload = check_access_token(&state, &token)?;
    let viewer = Viewer::from_payload(&payload, trace_id(req.headers()));

    if state.settings.authz.inject_tenant_id {
        insert_header(req.headers_mut(), TENANT_ID_HEADER, viewer.tenant_id);
    }
    if state.settings.authz.inject_operator_id {
        insert_header(req.headers_mut(), OPERATOR_ID_HEADER, viewer.user_id);
    }

    if state.settings.authz.enable_authz {
        let request = AuthzRequest {
            subjects: payload.roles.clone(),
            path: route.clone(),
            method: method.as_str().to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
        };

        let allowed = match state.authorizer.is_authorized(&request).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::error!(error = %err, route = %route, "policy engine failed");
                false
            }
        };

        if !allowed {
            tracing::info!(
                user_id = viewer.user_id,
                tenant_id = viewer.tenant_id,
                trace_id = %viewer.trace_id,
                method = %method,
                route = %route,
                "request denied by policy"
            );
            return Err(AppError::forbidden(format!("{method} {route} is not permitted")));
        }
    }

    req.extensions_mut().insert(AccessToken(token));
    req.extensions_mut().insert(payload);
    req.extensions_mut().insert(viewer);

    Ok(next.run(req).await)
}

/// Converts an axum route (`/roles/:id`) to the stored API template form (`/roles/{id}`).
pub fn route_template(route: &str) -> String {
    route
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Logs one line per request enriched with the API resource's operation and module.
pub async fn operation_log(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let route = route_template(&matched_route(&req));

    let api = match state.api_cache.lookup(&state.pool, method.as_str(), &route).await {
        Ok(api) => api,
        Err(err) => {
            tracing::debug!(error = %err, "api resource lookup failed");
            None
        }
    };

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        route = %route,
        status = response.status().as_u16(),
        operation = api.as_ref().and_then(|a| a.operation.as_deref()).unwrap_or("-"),
        module = api.as_ref().and_then(|a| a.module.as_deref()).unwrap_or("-"),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "operation"
    );

    response
}
