use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::token::UserTokenClaims;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Arc::new(secret.into()),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        if secret.is_empty() {
            return Err(AppError::configuration("JWT_SECRET must not be empty"));
        }

        Ok(Self::new(secret.into_bytes()))
    }

    /// Signs `claims` (HS256), stamping `iat` and `exp = iat + ttl`.
    pub fn encode(&self, claims: &Map<String, Value>, ttl: Duration) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        let mut claims = claims.clone();
        claims.insert("iat".into(), Value::from(now));
        claims.insert("exp".into(), Value::from(now.saturating_add(ttl)));

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    fn validation() -> Validation {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation
    }

    /// Verifies the signature and expiry and reads the typed claims.
    pub fn decode(&self, token: &str) -> Result<UserTokenClaims, AppError> {
        jsonwebtoken::decode::<UserTokenClaims>(token, &DecodingKey::from_secret(&self.secret), &Self::validation())
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }

    /// Verifies the token and returns its raw claim map.
    pub fn decode_map(&self, token: &str) -> Result<Map<String, Value>, AppError> {
        jsonwebtoken::decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&self.secret), &Self::validation())
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{claims_from_payload, payload_from_claims, payload_from_map, UserTokenPayload};

    #[test]
    fn signed_payload_decodes_through_both_paths() {
        let jwt = JwtConfig::new("unit-test-secret");
        let payload = UserTokenPayload::new(
            "alice",
            3,
            5,
            None,
            vec!["tenant_admin".into()],
            None,
            None,
            Some("device-1".into()),
            false,
            true,
        );

        let token = jwt.encode(&claims_from_payload(&payload), Duration::from_secs(60)).unwrap();

        let typed = payload_from_claims(&jwt.decode(&token).unwrap());
        let mapped = payload_from_map(&jwt.decode_map(&token).unwrap()).unwrap();
        assert_eq!(typed, payload);
        assert_eq!(mapped, payload);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtConfig::new("one")
            .encode(&Map::new(), Duration::from_secs(60))
            .unwrap();
        let err = JwtConfig::new("two").decode(&token).unwrap_err();
        assert_eq!(err.kind(), "token");
    }
}
