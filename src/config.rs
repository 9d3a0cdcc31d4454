//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a type-safe struct.

use std::time::Duration;

use serde::Deserialize;

use crate::models::terminal::SubscriptionPlan;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PUBLIC_BASE_URL`: base used for pagination links
/// - `AUTHORIZE_BASE_URL`: payer authorization page, suffixed with the transaction id
/// - `ACCOUNT_PORTAL_BASE_URL`: onboarding portal, suffixed with `/account/{creator}/{account}`
/// - `PROVIDER_TIMEOUT_SECS` (optional): deadline for each provider call, defaults to 10
/// - `RECONCILIATION_INTERVAL_SECS` (optional): VADS status sweep period, defaults to 12 hours
/// - `OXLIN_*`, `MONEXT_*`, `LAGO_*`, `INPI_*`, `BLOB_*`, `MAIL_*`: provider endpoints and credentials
/// - `KYC_CONTAINER`: blob container for company documents
/// - `VADS_ONBOARDING_EMAIL`: recipient of VADS subscription forms
/// - `DEFAULT_SUBSCRIPTION_PLAN` (optional): plan for terminals created without one
/// - `CORS_ALLOWED_ORIGINS` (optional): comma-separated origins, `*` or unset for any
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub public_base_url: String,
    pub authorize_base_url: String,
    pub account_portal_base_url: String,

    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_reconciliation_interval")]
    pub reconciliation_interval_secs: u64,

    pub oxlin_base_url: String,
    pub oxlin_client_id: String,
    pub oxlin_client_secret: String,

    pub monext_base_url: String,
    pub monext_api_key: String,

    pub lago_base_url: String,
    pub lago_api_key: String,

    pub inpi_base_url: String,
    pub inpi_username: String,
    pub inpi_password: String,

    pub blob_base_url: String,
    pub blob_sas_token: String,
    #[serde(default = "default_kyc_container")]
    pub kyc_container: String,

    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    pub vads_onboarding_email: String,

    #[serde(default = "default_plan")]
    pub default_subscription_plan: SubscriptionPlan,

    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_provider_timeout() -> u64 {
    10
}

/// Twice a day.
fn default_reconciliation_interval() -> u64 {
    43_200
}

fn default_kyc_container() -> String {
    "kyc".to_string()
}

fn default_plan() -> SubscriptionPlan {
    SubscriptionPlan::RibpayClassic
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        // Field names are converted automatically: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_secs(self.reconciliation_interval_secs)
    }
}
