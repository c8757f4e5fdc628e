//! API Error Types
//!
//! Every failure leaves the service as `{"error": "<message>"}` with the
//! matching status code. Library errors convert by variant.

use crate::auth::{InvalidCredentials, TokenError};
use crate::storage::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid or expired token, or bad credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("{0}")]
    Forbidden(String),

    /// Absent record or route (404).
    #[error("{0}")]
    NotFound(String),

    /// Store or signing failure (500). Logged, never shown to the client.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Internal(cause) => {
                error!(error = %cause, "internal server error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => Self::NotFound(format!("{entity} not found")),
            StoreError::InvalidReference(message) => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::Unauthorized("Invalid or expired token".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<InvalidCredentials> for ApiError {
    fn from(_: InvalidCredentials) -> Self {
        Self::Unauthorized("Invalid username or password".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::Forbidden("Read-only access".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await, json!({ "error": "Read-only access" }));
    }

    #[tokio::test]
    async fn test_internal_cause_is_hidden() {
        let response = ApiError::Internal("disk on fire".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Internal server error");
    }

    #[test]
    fn test_store_errors_classified_by_variant() {
        let not_found: ApiError = StoreError::NotFound {
            entity: "Patient",
            id: 3,
        }
        .into();
        assert!(matches!(&not_found, ApiError::NotFound(m) if m == "Patient not found"));

        let reference: ApiError = StoreError::InvalidReference("no such patient".into()).into();
        assert_eq!(reference.status(), StatusCode::BAD_REQUEST);

        let io: ApiError = StoreError::Io(std::io::Error::other("full")).into();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_token_errors() {
        assert_eq!(ApiError::from(TokenError::Invalid).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(TokenError::MissingKey).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::from(InvalidCredentials).status(), StatusCode::UNAUTHORIZED);
    }
}
