//! API Key model for authentication.
//!
//! API keys are stored as SHA-256 hashes. Each key belongs to a tenant
//! (`creator_id`); administrative keys see every tenant's data.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::scope::Scope;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `key_hash`: SHA-256 hash of the actual API key
/// - `creator_id`: Tenant this key acts for
/// - `is_admin`: Whether the key bypasses tenant scoping
/// - `is_active`: Whether the key is currently valid
/// - `created_at`: When the key was created
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    /// Tenant identifier stamped on every record this key creates
    pub creator_id: String,

    pub is_admin: bool,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Query scope for requests made with this key.
    pub fn scope(&self) -> Scope {
        if self.is_admin {
            Scope::Admin
        } else {
            Scope::Tenant(self.creator_id.clone())
        }
    }
}
