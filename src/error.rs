//! Error types and HTTP error response handling.
//!
//! This module defines the domain error kinds and how they are converted
//! into HTTP responses with stable machine-readable codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

/// One violated input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Domain Errors**: `NotFound`, `InvalidState`, `ConstraintViolation`, `Validation`
/// - **Provider Errors**: `ProviderUnavailable` (retry later), `ProviderRejected` (final)
/// - **Authentication Errors**: Invalid or missing API keys, admin-only routes
/// - **Database Errors**: Any sqlx::Error from database operations
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// Unique-index violations are translated to `ConstraintViolation`
    /// by the store before they reach this variant.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Route requires an administrative key.
    #[error("Administrative access required")]
    Forbidden,

    /// Referenced entity does not exist or is outside the caller's tenant.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Entity is in a state that forbids the operation.
    #[error("{0}")]
    InvalidState(String),

    /// A referential-integrity rule would be violated.
    #[error("{0}")]
    ConstraintViolation(String),

    /// Malformed input. Lists every violated field.
    #[error("Invalid request")]
    Validation(Vec<FieldError>),

    /// External collaborator timed out or failed transiently.
    #[error("{provider} is unavailable: {detail}")]
    ProviderUnavailable {
        provider: &'static str,
        detail: String,
    },

    /// External collaborator definitively refused the request.
    #[error("{provider} rejected the request: {detail}")]
    ProviderRejected {
        provider: &'static str,
        detail: String,
    },
}

impl AppError {
    /// Single-field validation error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        AppError::InvalidState(message.into())
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        AppError::ConstraintViolation(message.into())
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::InvalidApiKey => "invalid_api_key",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::ConstraintViolation(_) => "constraint_violation",
            AppError::Validation(_) => "validation_error",
            AppError::ProviderUnavailable { .. } => "provider_unavailable",
            AppError::ProviderRejected { .. } => "provider_rejected",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) | AppError::ConstraintViolation(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ProviderRejected { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Merge several validation outcomes so callers can report every bad field.
pub fn collect_field_errors(errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "validation_error",
///     "message": "Invalid request",
///     "fields": [{ "field": "amount_cents", "message": "must be a number" }]
///   }
/// }
/// ```
///
/// `fields` is only present for validation errors. Database details are
/// hidden from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                json!({
                    "error": { "code": code, "message": "An internal error occurred" }
                })
            }
            AppError::Validation(fields) => json!({
                "error": { "code": code, "message": self.to_string(), "fields": fields }
            }),
            _ => json!({
                "error": { "code": code, "message": self.to_string() }
            }),
        };

        (status, Json(body)).into_response()
    }
}
