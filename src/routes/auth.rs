use axum::extract::{Extension, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::resolver;
use crate::errors::{AppError, AppResult};
use crate::middleware::Viewer;
use crate::models::user::{
    DbUser, GrantType, LoginRequest, LoginResponse, PLATFORM_TENANT_ID, TENANT_STATUS_ON, USER_STATUS_NORMAL,
};
use crate::store::user;
use crate::token::{claims_from_payload, TokenCategory, UserTokenPayload};
use crate::utils::verify_password;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/admin/v1/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials or refresh token"),
        (status = 403, description = "User, tenant or role set not allowed into the admin console")
    )
)]
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> AppResult<Json<LoginResponse>> {
    let db_user = user::find_by_username(&state.pool, &req.username)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    match req.grant_type {
        GrantType::Password => {
            let password = req
                .password
                .as_deref()
                .ok_or_else(|| AppError::bad_request("password is required"))?;
            if !verify_password(password, &db_user.password_hash)? {
                return Err(AppError::unauthorized("invalid credentials"));
            }
        }
        GrantType::RefreshToken => {
            let refresh_token = req
                .refresh_token
                .as_deref()
                .ok_or_else(|| AppError::bad_request("refresh_token is required"))?;
            if !state.tokens.remove(TokenCategory::Refresh, db_user.id, refresh_token) {
                return Err(AppError::token("refresh token expired or revoked"));
            }
        }
    }

    let response = issue_tokens(&state, db_user, req.client_id, req.device_id).await?;
    Ok(Json(response))
}

async fn ensure_user_may_sign_in(state: &AppState, db_user: &DbUser) -> AppResult<()> {
    if db_user.status != USER_STATUS_NORMAL {
        return Err(AppError::forbidden("user is disabled"));
    }

    if db_user.tenant_id != PLATFORM_TENANT_ID {
        let tenant = user::find_tenant(&state.pool, db_user.tenant_id)
            .await?
            .ok_or_else(|| AppError::forbidden("tenant does not exist"))?;
        if tenant.status != TENANT_STATUS_ON {
            return Err(AppError::forbidden("tenant is disabled"));
        }
    }

    Ok(())
}

/// Resolves the user's authority, signs an access token and issues a refresh token.
async fn issue_tokens(
    state: &AppState,
    db_user: DbUser,
    client_id: Option<String>,
    device_id: Option<String>,
) -> AppResult<LoginResponse> {
    ensure_user_may_sign_in(state, &db_user).await?;

    let authority = resolver::resolve(&state.pool, db_user.id, db_user.tenant_id).await?;

    let mut payload = UserTokenPayload::new(
        db_user.username.clone(),
        db_user.id,
        db_user.tenant_id,
        None,
        Vec::new(),
        None,
        client_id,
        device_id,
        false,
        false,
    );
    authority.apply(&mut payload);

    let settings = state.tokens.settings();
    let access_token = state
        .jwt
        .encode(&claims_from_payload(&payload), settings.access_token_expires)?;
    state.tokens.add(TokenCategory::Access, db_user.id, &access_token);
    let refresh_token = state.tokens.generate_refresh_token(db_user.id);

    tracing::info!(
        user_id = db_user.id,
        tenant_id = db_user.tenant_id,
        roles = ?payload.roles,
        "user signed in"
    );

    Ok(LoginResponse {
        token_type: "Bearer".to_string(),
        access_token,
        refresh_token,
        expires_in: settings.access_token_expires.as_secs(),
        refresh_expires_in: settings.refresh_token_expires.as_secs(),
        payload,
    })
}

#[utoipa::path(
    post,
    path = "/admin/v1/logout",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "All tokens of the caller revoked", body = MessageResponse))
)]
pub async fn logout(State(state): State<AppState>, viewer: Viewer) -> AppResult<Json<MessageResponse>> {
    state.tokens.remove_all(viewer.user_id);
    tracing::info!(user_id = viewer.user_id, trace_id = %viewer.trace_id, "user signed out");

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/admin/v1/me",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Decoded token payload", body = UserTokenPayload))
)]
pub async fn me(Extension(payload): Extension<UserTokenPayload>) -> AppResult<Json<UserTokenPayload>> {
    Ok(Json(payload))
}
