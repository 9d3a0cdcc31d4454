//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and look the hash up in the datastore
//! 3. Inject the caller's tenant and `Scope` into the request
//! 4. Reject unknown keys with HTTP 401
//!
//! `require_admin` is layered on top for `/api/v1/admin` routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{context::AppContext, error::AppError, models::scope::Scope};

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// ID of the authenticated API key
    pub api_key_id: Uuid,

    /// Tenant the key belongs to; stamped on every record it creates
    pub creator_id: String,

    /// Visibility for reads: the tenant, or everything for admin keys
    pub scope: Scope,
}

/// SHA-256 hex digest of a raw API key, as stored in `api_keys.key_hash`.
pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// API key authentication middleware function.
///
/// # Headers
///
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
///
/// # Returns
///
/// - the next handler's response when the key is active
/// - `AppError::InvalidApiKey` (401) otherwise
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidApiKey)?;

    let record = ctx
        .store
        .find_api_key(&hash_api_key(api_key))
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    let auth_context = AuthContext {
        api_key_id: record.id,
        scope: record.scope(),
        creator_id: record.creator_id,
    };
    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

/// Reject non-admin keys with 403. Must run after `auth_middleware`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<AuthContext>()
        .map(|auth| auth.scope.is_admin())
        .ok_or(AppError::InvalidApiKey)?;
    if !is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_like_sha256sum() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
