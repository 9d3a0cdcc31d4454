//! Partner webhooks and merchant notifications.
//!
//! When a contract goes live the account's partner is told through its
//! registered webhook; accounts without a partner URL get an email at their
//! notification address instead.
//!
//! # Webhook format
//!
//! `POST` with a JSON `ContractActivatedPayload` body and headers:
//!
//! - `X-Webhook-Signature: sha256=<hex>` (HMAC-SHA256 of the body with the
//!   partner secret)
//! - `X-Webhook-Event-Id: <uuid>`
//!
//! Delivery failures are reported to the caller, which logs them; a failed
//! notification never undoes the activation.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{
    contract::Contract, partner::ContractActivatedPayload, scope::Scope,
};
use crate::providers::{bounded, check_status, transport_error};
use crate::services::identifiers;

type HmacSha256 = Hmac<Sha256>;

const WEBHOOK: &str = "partner_webhook";

/// Outbound webhook transport.
#[async_trait]
pub trait WebhookSender: Send + Sync + 'static {
    async fn deliver(
        &self,
        url: &str,
        event_id: uuid::Uuid,
        signature: &str,
        body: String,
    ) -> Result<(), AppError>;
}

pub struct HttpWebhookSender {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpWebhookSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn deliver(
        &self,
        url: &str,
        event_id: uuid::Uuid,
        signature: &str,
        body: String,
    ) -> Result<(), AppError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Event-Id", event_id.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(WEBHOOK, e))?;
        check_status(WEBHOOK, response).await?;
        Ok(())
    }
}

/// `sha256=<hex>` HMAC of `payload` keyed with `secret`.
pub fn generate_signature(secret: &str, payload: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
        AppError::ProviderRejected {
            provider: WEBHOOK,
            detail: format!("unusable webhook secret: {e}"),
        }
    })?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// How a merchant was told about an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationChannel {
    Webhook,
    Email,
    /// Neither a partner URL nor a notification address
    None,
}

/// Notify the partner, or the merchant by email, that `contract` is live.
pub async fn notify_contract_activated(
    ctx: &AppContext,
    contract: &Contract,
) -> Result<NotificationChannel, AppError> {
    let common = contract.common();
    let account = ctx
        .store
        .get_account(&Scope::Admin, common.account_id)
        .await?
        .ok_or(AppError::NotFound("account"))?;

    let partner = match account.partner_id {
        Some(partner_id) => ctx.store.get_partner(&Scope::Admin, partner_id).await?,
        None => None,
    };

    if let Some((url, secret)) = partner.and_then(|p| p.notification_url.zip(p.webhook_secret)) {
        let payload = ContractActivatedPayload {
            event_id: identifiers::new_id(),
            merchant_id: common.contract_merchant_id.clone(),
            contract_id: common.contract_id,
            contract_is_active: contract.is_active(),
        };
        let body = serde_json::to_string(&payload).map_err(|e| AppError::ProviderRejected {
            provider: WEBHOOK,
            detail: format!("payload serialization failed: {e}"),
        })?;
        let signature = generate_signature(&secret, &body)?;

        bounded(
            WEBHOOK,
            ctx.provider_timeout(),
            ctx.webhooks.deliver(&url, payload.event_id, &signature, body),
        )
        .await?;
        tracing::info!(contract_id = %common.contract_id, event_id = %payload.event_id, "partner notified");
        return Ok(NotificationChannel::Webhook);
    }

    match account.account_notification_email.as_deref() {
        Some(email) => {
            bounded(
                "mail",
                ctx.provider_timeout(),
                ctx.mailer.send_contract_activated(
                    email,
                    &common.contract_merchant_id,
                    common.contract_id,
                ),
            )
            .await?;
            tracing::info!(contract_id = %common.contract_id, "merchant notified by email");
            Ok(NotificationChannel::Email)
        }
        None => {
            tracing::warn!(contract_id = %common.contract_id, "no notification channel for account");
            Ok(NotificationChannel::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        // RFC 4231 test case 2
        let signature = generate_signature("Jefe", "what do ya want for nothing?").expect("sign");
        assert_eq!(
            signature,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_depends_on_secret() {
        let a = generate_signature("secret-a", "{}").expect("sign");
        let b = generate_signature("secret-b", "{}").expect("sign");
        assert_ne!(a, b);
    }
}
