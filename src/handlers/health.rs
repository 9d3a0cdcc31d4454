//! Health check endpoint for service monitoring.

use crate::{context::AppContext, error::AppError};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
///
/// Returns service status and datastore connectivity.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: String,

    /// Datastore connection status
    pub database: String,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check handler.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "connected",
///   "timestamp": "2026-03-02T09:00:00Z"
/// }
/// ```
///
/// # Response (500 Internal Server Error)
///
/// If the datastore is unreachable, returns standard error response.
pub async fn health_check(State(ctx): State<AppContext>) -> Result<Json<HealthResponse>, AppError> {
    ctx.store.ping().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: "connected".to_string(),
        timestamp: Utc::now(),
    }))
}
