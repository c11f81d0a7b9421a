/// Error types for stream-service
///
/// Every failure path ends in `AppError`, which renders as the shared
/// `error_types::ErrorResponse` envelope. Provider, database and internal
/// failures are logged in full and answered with a generic message.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use thiserror::Error;

use crate::models::{Platform, StreamStatus, Transition};
use crate::providers::ProviderError;
use crate::security::webhook_signature::SignatureError;

/// Result type for stream-service operations
pub type Result<T> = std::result::Result<T, AppError>;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again later.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No valid {0} credential is linked to the project owner")]
    Credential(Platform),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid webhook signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Cannot {transition} a stream that is {status}")]
    InvalidState {
        transition: Transition,
        status: StreamStatus,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Media provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn error_type_and_code(&self) -> (&'static str, &'static str) {
        match self {
            AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::VALIDATION_FAILED),
            AppError::Credential(_) => (kinds::VALIDATION_ERROR, error_codes::CREDENTIAL_MISSING),
            AppError::Unauthorized(_) => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID),
            AppError::Forbidden(_) => (kinds::AUTHORIZATION_ERROR, error_codes::ACCESS_DENIED),
            AppError::Signature(_) => (kinds::AUTHENTICATION_ERROR, error_codes::SIGNATURE_INVALID),
            AppError::NotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::STREAM_NOT_FOUND),
            AppError::InvalidState { .. } => {
                (kinds::CONFLICT_ERROR, error_codes::INVALID_STATE_TRANSITION)
            }
            AppError::Conflict(_) => (kinds::CONFLICT_ERROR, error_codes::VERSION_CONFLICT),
            AppError::Provider(_) => (kinds::SERVER_ERROR, error_codes::PROVIDER_ERROR),
            AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
            AppError::Internal(_) => (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR),
        }
    }

    /// Message returned to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Provider(_) | AppError::Database(_) | AppError::Internal(_) => {
                GENERIC_FAILURE.to_string()
            }
            AppError::Signature(_) => "Invalid webhook signature".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Credential(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::Signature(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Provider(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let (error_type, code) = self.error_type_and_code();
        let mut response = ErrorResponse::new(
            status.canonical_reason().unwrap_or("Error"),
            &self.public_message(),
            status.as_u16(),
            error_type,
            code,
        );
        if let AppError::Credential(platform) = self {
            response = response.with_details(format!("platform={}", platform.as_str()));
        }

        HttpResponse::build(status).json(response)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::Credential(Platform::Twitch).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidState {
                transition: Transition::Activate,
                status: StreamStatus::Terminated,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Signature(SignatureError::Mismatch).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn provider_detail_is_not_leaked() {
        let err = AppError::Provider(ProviderError::Status {
            status: 502,
            body: "upstream stack trace".into(),
        });
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], error_codes::PROVIDER_ERROR);
        assert!(!json["message"].as_str().unwrap().contains("stack trace"));
    }

    #[test]
    fn invalid_state_message_names_both_sides() {
        let err = AppError::InvalidState {
            transition: Transition::Suspend,
            status: StreamStatus::Suspended,
        };
        assert_eq!(err.public_message(), "Cannot suspend a stream that is suspended");
    }
}
