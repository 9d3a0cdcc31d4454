//! Transactional email port.

use async_trait::async_trait;
use serde::Serialize;

use super::{check_status, transport_error};
use crate::error::AppError;

const MAIL: &str = "mail";

/// Details needed to fill the acquirer subscription form for a new VADS
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VadsSubscriptionForm {
    pub contract_id: uuid::Uuid,
    pub beneficiary_name: String,
    pub merchant_id: String,
    pub bank_name: String,
    pub bank_code: String,
    pub three_d_secure: bool,
    pub max_amount: i32,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Tell a merchant that its contract is live.
    async fn send_contract_activated(
        &self,
        to: &str,
        merchant_id: &str,
        contract_id: uuid::Uuid,
    ) -> Result<(), AppError>;

    /// Send the VADS onboarding team the subscription form data.
    async fn send_vads_subscription_form(
        &self,
        to: &str,
        form: &VadsSubscriptionForm,
    ) -> Result<(), AppError>;
}

/// JSON mail API.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, api_url: String, api_key: String, from: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
            from,
        }
    }

    async fn deliver(&self, mail: &OutgoingMail<'_>) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(mail)
            .send()
            .await
            .map_err(|e| transport_error(MAIL, e))?;
        check_status(MAIL, response).await?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_contract_activated(
        &self,
        to: &str,
        merchant_id: &str,
        contract_id: uuid::Uuid,
    ) -> Result<(), AppError> {
        self.deliver(&OutgoingMail {
            from: &self.from,
            to,
            subject: "Your card payment contract is active".to_string(),
            text: format!(
                "Contract {contract_id} (merchant {merchant_id}) can now accept card payments."
            ),
            data: None,
        })
        .await
    }

    async fn send_vads_subscription_form(
        &self,
        to: &str,
        form: &VadsSubscriptionForm,
    ) -> Result<(), AppError> {
        let data = serde_json::to_value(form).map_err(|e| AppError::ProviderRejected {
            provider: MAIL,
            detail: e.to_string(),
        })?;
        self.deliver(&OutgoingMail {
            from: &self.from,
            to,
            subject: format!("VADS subscription - {}", form.beneficiary_name),
            text: format!(
                "New VADS contract {} for {} (merchant {}, bank {} {}). Max amount {} EUR, 3-D Secure {}.",
                form.contract_id,
                form.beneficiary_name,
                form.merchant_id,
                form.bank_name,
                form.bank_code,
                form.max_amount,
                if form.three_d_secure { "on" } else { "off" },
            ),
            data: Some(data),
        })
        .await
    }
}
