//! Unified error handling for route handlers.
//!
//! Every handler returns `Result<T, AppError>`. Store and storage failures are
//! translated into the nearest taxonomy entry here; nothing is retried.

use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    auth::AuthError, models::MessageResponse, repository::RepositoryError, storage::StorageError,
};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, expired or badly signed token, or an identity that no longer resolves.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Valid identity, wrong role or not the owner.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The target id does not resolve.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing field, enum violation, duplicate or constraint violation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown email or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The image storage provider failed.
    #[error("Storage error: {0}")]
    Upstream(#[from] StorageError),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate(msg) | RepositoryError::Constraint(msg) => {
                Self::Validation(msg)
            }
            RepositoryError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken(_) => Self::Unauthenticated,
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Signing(e) => Self::Internal(format!("token signing failed: {e}")),
            AuthError::PasswordHash => Self::Internal("password hashing failed".to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::Validation(err.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(err: MultipartRejection) -> Self {
        Self::Validation(err.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        Self::Validation(err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        Self::Validation(err.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            // Ownership and role failures share 401 with authentication failures.
            Self::Unauthenticated | Self::Forbidden(_) | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "Server error".to_string()
            }
            Self::Upstream(_) => {
                tracing::error!(error = %self, "Image storage failed");
                "Image storage error".to_string()
            }
            Self::Unauthenticated => "No valid token, authorization denied".to_string(),
            Self::Forbidden(msg) | Self::NotFound(msg) | Self::Validation(msg) => msg.clone(),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
        };

        (status, Json(MessageResponse::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(status_of(AppError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AppError::Forbidden("User not authorized".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(AppError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AppError::NotFound("Car not found".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AppError::Validation("brand is required".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Upstream(StorageError::Unavailable("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_repository_errors_map_to_taxonomy() {
        let dup: AppError = RepositoryError::Duplicate("email already registered".into()).into();
        assert!(matches!(dup, AppError::Validation(ref m) if m == "email already registered"));

        let constraint: AppError = RepositoryError::Constraint("unknown seller".into()).into();
        assert!(matches!(constraint, AppError::Validation(_)));

        let db: AppError = RepositoryError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(db, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_internal_details_are_not_leaked() {
        let response = AppError::Internal("relation \"cars\" does not exist".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let msg: MessageResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(msg.msg, "Server error");
    }
}
