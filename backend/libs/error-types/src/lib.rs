use serde::{Deserialize, Serialize};

/// Error envelope returned by every HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short human-readable category ("Not Found", "Conflict")
    pub error: String,

    /// Message safe to show to the caller
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Broad class used by clients for routing, see [`error_types`]
    pub error_type: String,

    /// Stable machine-readable code, see [`error_codes`]
    pub code: String,

    /// Extra detail (validation field messages and similar)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

/// Stable error codes
pub mod error_codes {
    // Streams
    pub const STREAM_NOT_FOUND: &str = "STREAM_NOT_FOUND";
    pub const INVALID_STATE_TRANSITION: &str = "INVALID_STATE_TRANSITION";
    pub const VERSION_CONFLICT: &str = "VERSION_CONFLICT";

    // Multistream targets
    pub const CREDENTIAL_MISSING: &str = "CREDENTIAL_MISSING";

    // Input
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";

    // Authentication
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const SIGNATURE_INVALID: &str = "SIGNATURE_INVALID";

    // Upstream/System
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Standard error classes
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Not Found",
            "Stream not found",
            404,
            error_types::NOT_FOUND_ERROR,
            error_codes::STREAM_NOT_FOUND,
        );

        assert_eq!(error.status, 404);
        assert_eq!(error.error_type, error_types::NOT_FOUND_ERROR);
        assert_eq!(error.code, error_codes::STREAM_NOT_FOUND);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let error = ErrorResponse::new(
            "Conflict",
            "Stream was modified concurrently",
            409,
            error_types::CONFLICT_ERROR,
            error_codes::VERSION_CONFLICT,
        );

        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("details").is_none());

        let json = serde_json::to_value(error.with_details("version 3 != 4".into())).unwrap();
        assert_eq!(json["details"], "version 3 != 4");
    }
}
