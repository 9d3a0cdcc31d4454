//! Partner model and webhook registration types.
//!
//! A partner is an integrator that onboards accounts on behalf of merchants.
//! Partners with a notification URL receive signed webhook deliveries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a partner record.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Partner {
    pub partner_id: Uuid,
    pub partner_name: String,
    pub notification_url: Option<String>,

    /// HMAC key for webhook signatures. Never serialized.
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,

    pub creator_id: String,
}

/// Request body for `POST /admin/partners`.
#[derive(Debug, Deserialize)]
pub struct CreatePartnerRequest {
    pub partner_name: String,
    /// Tenant the partner belongs to
    pub creator_id: String,
}

/// Request body for registering a partner's webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct RegisterWebhookRequest {
    pub url: String,
}

/// Response for webhook registration. The secret is only shown once.
#[derive(Debug, Serialize)]
pub struct WebhookRegistration {
    pub partner_id: Uuid,
    pub notification_url: String,
    pub secret: String,
}

/// Body posted to a partner when one of its merchant contracts goes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractActivatedPayload {
    pub event_id: Uuid,
    pub merchant_id: String,
    pub contract_id: Uuid,
    pub contract_is_active: bool,
}
