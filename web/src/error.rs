//! Error types for web handlers.
//!
//! [`AppError`] bridges engine and registration errors to HTTP responses.
//! Server errors are logged with their source; clients only see a code and a
//! message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatepass_core::registration::RegistrationError;
use gatepass_runtime::GateError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Data>, AppError> {
///     let mark = state.engine.force_mark_individual(id, now).await?;
///     Ok(Json(mark))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT")
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::TicketNotFound(id) => Self::not_found("Ticket", id),
            GateError::StorageUnavailable { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "Gate storage is temporarily unavailable, please retry".to_string(),
                "STORAGE_UNAVAILABLE",
            )
            .with_source(err.into()),
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::DuplicateEmail(_) => Self::conflict(err.to_string()),
            RegistrationError::CodeSpaceExhausted { .. } | RegistrationError::Storage(_) => {
                Self::unavailable("Registration is temporarily unavailable, please retry")
                    .with_source(err.into())
            }
            RegistrationError::MissingName { .. }
            | RegistrationError::MissingDesignation
            | RegistrationError::InvalidEmail(_)
            | RegistrationError::TooManyCompanions { .. }
            | RegistrationError::DayOutsideEvent(_) => Self::validation(err.to_string()),
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred".to_string(),
            "INTERNAL_SERVER_ERROR",
        )
        .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatepass_core::store::StoreError;
    use gatepass_core::types::TicketId;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Missing code");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Missing code");
    }

    #[test]
    fn test_storage_unavailable_is_503_without_details() {
        let err = AppError::from(GateError::StorageUnavailable {
            attempts: 5,
            reason: "connection refused".to_string(),
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
        assert!(!err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_ticket_not_found() {
        let err = AppError::from(GateError::TicketNotFound(TicketId::new()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_registration_errors() {
        assert_eq!(
            AppError::from(RegistrationError::MissingDesignation).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(RegistrationError::DuplicateEmail("a@b.co".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(RegistrationError::Storage(StoreError::Unavailable(
                "down".to_string()
            )))
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
