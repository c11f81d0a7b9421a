//! HS256 tokens
//!
//! Two token shapes share one secret:
//! - bearer tokens from the identity service, `{sub, exp}`, authenticate API calls
//! - playback access keys, `{userId, iat, exp}`, let viewers open private streams

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessClaims {
    user_id: Uuid,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct BearerClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_secs),
        }
    }

    fn validation() -> Validation {
        Validation::new(Algorithm::HS256)
    }

    /// Playback access key for `user_id`.
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + self.access_ttl;
        let claims = AccessClaims {
            user_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign access token: {e}")))?;

        Ok(IssuedToken {
            access_token,
            expires_at,
        })
    }

    /// User id carried by a playback access key.
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid> {
        decode::<AccessClaims>(token, &self.decoding, &Self::validation())
            .map(|data| data.claims.user_id)
            .map_err(|e| AppError::Forbidden(format!("invalid access key: {e}")))
    }

    /// User id (`sub`) carried by an API bearer token.
    pub fn verify_bearer(&self, token: &str) -> Result<Uuid> {
        let data = decode::<BearerClaims>(token, &self.decoding, &Self::validation())
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::Unauthorized("token subject is not a user id".to_string()))
    }

    /// Bearer token as the identity service would mint it. Used by local
    /// tooling and tests.
    pub fn issue_bearer(&self, user_id: Uuid, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = BearerClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign bearer token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", 2 * 60 * 60)
    }

    #[test]
    fn access_token_round_trip() {
        let user = Uuid::new_v4();
        let issued = service().issue_access_token(user).unwrap();

        assert_eq!(service().verify_access_token(&issued.access_token).unwrap(), user);
        let ttl = issued.expires_at - Utc::now();
        assert!(ttl > Duration::minutes(119) && ttl <= Duration::hours(2));
    }

    #[test]
    fn access_key_from_another_secret_is_forbidden() {
        let issued = TokenService::new("other", 60)
            .issue_access_token(Uuid::new_v4())
            .unwrap();
        assert!(matches!(
            service().verify_access_token(&issued.access_token),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn expired_bearer_is_unauthorized() {
        let token = service()
            .issue_bearer(Uuid::new_v4(), Duration::hours(-2))
            .unwrap();
        assert!(matches!(
            service().verify_bearer(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn token_shapes_are_not_interchangeable() {
        let user = Uuid::new_v4();
        let bearer = service().issue_bearer(user, Duration::minutes(5)).unwrap();
        let access = service().issue_access_token(user).unwrap().access_token;

        assert_eq!(service().verify_bearer(&bearer).unwrap(), user);
        assert!(service().verify_bearer(&access).is_err());
        assert!(service().verify_access_token(&bearer).is_err());
    }
}
