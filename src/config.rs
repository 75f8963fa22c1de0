use std::time::Duration;

use crate::authz::EngineKind;
use crate::errors::AppError;
use crate::jwt::JwtConfig;

pub const DEFAULT_ACCESS_TOKEN_EXPIRES_SECS: u64 = 15 * 60;
pub const DEFAULT_REFRESH_TOKEN_EXPIRES_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_ACCESS_TOKEN_KEY_PREFIX: &str = "admin_uat_";
pub const DEFAULT_REFRESH_TOKEN_KEY_PREFIX: &str = "admin_urt_";

/// Token lifetimes and revocation-store key prefixes.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_token_expires: Duration,
    pub refresh_token_expires: Duration,
    pub access_token_key_prefix: String,
    pub refresh_token_key_prefix: String,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_token_expires: Duration::from_secs(DEFAULT_ACCESS_TOKEN_EXPIRES_SECS),
            refresh_token_expires: Duration::from_secs(DEFAULT_REFRESH_TOKEN_EXPIRES_SECS),
            access_token_key_prefix: DEFAULT_ACCESS_TOKEN_KEY_PREFIX.to_string(),
            refresh_token_key_prefix: DEFAULT_REFRESH_TOKEN_KEY_PREFIX.to_string(),
        }
    }
}

/// Middleware switches and the selected policy engine.
#[derive(Debug, Clone)]
pub struct AuthzSettings {
    pub engine: EngineKind,
    pub enable_authz: bool,
    pub inject_tenant_id: bool,
    pub inject_operator_id: bool,
}

impl Default for AuthzSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::Noop,
            enable_authz: true,
            inject_tenant_id: false,
            inject_operator_id: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub tokens: TokenSettings,
    pub authz: AuthzSettings,
}

impl AppConfig {
    pub fn new(jwt: JwtConfig) -> Self {
        Self {
            jwt,
            tokens: TokenSettings::default(),
            authz: AuthzSettings::default(),
        }
    }

    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.authz.engine = engine;
        self
    }

    pub fn from_env() -> Result<Self, AppError> {
        let jwt = JwtConfig::from_env()?;

        let tokens = TokenSettings {
            access_token_expires: Duration::from_secs(env_u64(
                "ACCESS_TOKEN_EXPIRES_SECS",
                DEFAULT_ACCESS_TOKEN_EXPIRES_SECS,
            )?),
            refresh_token_expires: Duration::from_secs(env_u64(
                "REFRESH_TOKEN_EXPIRES_SECS",
                DEFAULT_REFRESH_TOKEN_EXPIRES_SECS,
            )?),
            access_token_key_prefix: std::env::var("ACCESS_TOKEN_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_ACCESS_TOKEN_KEY_PREFIX.to_string()),
            refresh_token_key_prefix: std::env::var("REFRESH_TOKEN_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_REFRESH_TOKEN_KEY_PREFIX.to_string()),
        };

        let authz = AuthzSettings {
            engine: EngineKind::parse(&std::env::var("AUTHZ_ENGINE").unwrap_or_default()),
            enable_authz: env_bool("AUTHZ_ENABLED", true),
            inject_tenant_id: env_bool("AUTHZ_INJECT_TENANT_ID", false),
            inject_operator_id: env_bool("AUTHZ_INJECT_OPERATOR_ID", false),
        };

        Ok(Self { jwt, tokens, authz })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, AppError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|_| AppError::configuration(format!("{key} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
