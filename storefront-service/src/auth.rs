use std::time::Duration;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::*;
use thiserror::Error;

use crate::api::{ApiError, AppState};
use crate::store::{finish, Store, UserDirectory};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User email.
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("unknown user")]
    UnknownSubject,
}

/// HS256 keys for verifying bearer tokens.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?;
        Ok(data.claims)
    }

    /// Signs a token for `email`. Used by tooling and tests; logins live elsewhere.
    pub fn issue(&self, email: &str, ttl: Duration) -> anyhow::Result<String> {
        let claims = Claims {
            sub: email.to_string(),
            exp: (Utc::now().timestamp() as u64 + ttl.as_secs()) as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// The caller of a request, resolved from its bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.tokens.verify(token)?;

        let mut tx = state.store.begin().await.map_err(OrderError::from)?;
        let result = tx
            .principal_by_email(&claims.sub)
            .await
            .map_err(OrderError::from);
        let principal = finish(tx, result).await?.ok_or(AuthError::UnknownSubject)?;

        Ok(AuthUser(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_the_same_secret() {
        let keys = TokenKeys::new("test-secret");
        let token = keys.issue("a@example.com", Duration::from_secs(60)).unwrap();
        assert_eq!(keys.verify(&token).unwrap().sub, "a@example.com");
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = TokenKeys::new("other")
            .issue("a@example.com", Duration::from_secs(60))
            .unwrap();
        assert!(matches!(
            TokenKeys::new("test-secret").verify(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new("test-secret");
        let claims = Claims {
            sub: "a@example.com".to_string(),
            exp: (Utc::now().timestamp() - 3600) as usize,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(TokenKeys::new("s").verify("not.a.jwt").is_err());
    }
}
