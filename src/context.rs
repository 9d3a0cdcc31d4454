//! Shared application context.
//!
//! `AppContext` is built once at startup and cloned into every handler and
//! background task. It holds the datastore, the provider ports and the few
//! settings services need.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::terminal::SubscriptionPlan;
use crate::providers::{
    billing::BillingProvider, mailer::Mailer, payment::PaymentProvider, registry::CompanyRegistry,
    storage::BlobStorage,
};
use crate::services::notification_service::WebhookSender;
use crate::store::Store;

/// Settings read by services.
#[derive(Debug, Clone)]
pub struct Settings {
    pub public_base_url: String,
    pub authorize_base_url: String,
    pub account_portal_base_url: String,
    pub provider_timeout: Duration,
    pub kyc_container: String,
    pub default_subscription_plan: SubscriptionPlan,
    pub vads_onboarding_email: String,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            authorize_base_url: config.authorize_base_url.trim_end_matches('/').to_string(),
            account_portal_base_url: config
                .account_portal_base_url
                .trim_end_matches('/')
                .to_string(),
            provider_timeout: config.provider_timeout(),
            kyc_container: config.kyc_container.clone(),
            default_subscription_plan: config.default_subscription_plan,
            vads_onboarding_email: config.vads_onboarding_email.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub payments: Arc<dyn PaymentProvider>,
    pub billing: Arc<dyn BillingProvider>,
    pub registry: Arc<dyn CompanyRegistry>,
    pub storage: Arc<dyn BlobStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub webhooks: Arc<dyn WebhookSender>,
    pub settings: Arc<Settings>,
}

impl AppContext {
    /// Base URL of a listing, used for pagination links.
    pub fn link_base(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.settings.public_base_url, path.trim_start_matches('/'))
    }

    pub fn provider_timeout(&self) -> Duration {
        self.settings.provider_timeout
    }
}
