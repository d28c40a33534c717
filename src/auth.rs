use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::{Role, UserStatus},
    repository::RepositoryState,
};

/// Claims
///
/// Payload of a session token. Signed with the server secret and checked on
/// every protected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID, used to resolve the current role and status.
    pub sub: Uuid,
    /// Expiration Time (exp): the token is rejected after this instant.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("password hashing failed")]
    PasswordHash,
}

/// TokenService
///
/// Issues and verifies session tokens (HS256 JWT). Built once from `AppConfig`
/// and shared through `AppState`. There is no revocation list: expiry is the
/// only bound on a token's lifetime.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: ttl_hours * 3600,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.jwt_ttl_hours)
    }

    /// issue
    ///
    /// Produces a signed token binding `user_id` and an expiry `ttl` from now.
    pub fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now as usize,
            exp: (now + self.ttl_secs) as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    /// verify
    ///
    /// Checks signature and expiry and returns the identity the token was issued for.
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims.sub)
            .map_err(AuthError::InvalidToken)
    }
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored hash. A malformed hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Returns the token of an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers take it as an
/// argument and pass it to the checks in `access`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse an identity already attached to the request by `auth_middleware`.
/// 2. Extract the bearer token and verify it.
/// 3. Load the user to pick up the current role and status; users that were
///    removed or suspended after the token was issued are rejected.
///
/// Rejection: `AppError::Unauthenticated` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<AuthUser>() {
            return Ok(identity.clone());
        }

        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthenticated)?;

        let user_id = TokenService::from_ref(state).verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthenticated
        })?;

        let repo = RepositoryState::from_ref(state);
        let user = repo
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        match user.status {
            UserStatus::Active => {}
            UserStatus::Suspended => {
                tracing::info!(user_id = %user.id, "Suspended user presented a token");
                return Err(AppError::Unauthenticated);
            }
        }

        let identity = AuthUser {
            id: user.id,
            role: user.role,
        };
        parts.extensions.insert(identity.clone());
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify_resolves_identity() {
        let tokens = TokenService::new("unit-test-secret", 1);
        let id = Uuid::new_v4();

        let token = tokens.issue(id).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), id);
    }

    #[test]
    fn test_different_secrets_reject() {
        let issuer = TokenService::new("secret-one", 1);
        let verifier = TokenService::new("secret-two", 1);

        let token = issuer.issue(Uuid::new_v4()).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }
}
