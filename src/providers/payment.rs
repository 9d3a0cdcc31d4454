//! Payment provider port.
//!
//! RIBPAY contracts are backed by two resources at the bank-transfer
//! provider (Oxlin): an IBAN alias that receives payments and an authorized
//! account that identifies the beneficiary. Payment orders are created
//! against the alias. VADS merchant status comes from the card acquirer
//! (Monext), which is folded into the same port because both answer the
//! question "can this contract take payments".

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::{check_status, read_json, transport_error};
use crate::error::AppError;
use crate::services::normalize;

const OXLIN: &str = "oxlin";
const MONEXT: &str = "monext";

/// Where the payer lands after authorizing an order when the caller gives
/// no redirect URL.
pub const DEFAULT_ORDER_REDIRECT_URL: &str = "https://www.ribpay.page/authorize/confirmation";

/// Bank reachable for an IBAN.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BankProvider {
    pub bic: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRequest {
    /// Our account id
    pub user_reference: String,
    pub label: String,
    pub iban: String,
    pub bic: String,
}

/// Holder of an authorized account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountHolder {
    Company {
        company_name: String,
        national_identification: String,
    },
    NaturalPerson {
        firstname: String,
        surname: String,
        birth_date: String,
        birth_city: String,
        birth_country: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedAccountRequest {
    pub iban: String,
    /// Beneficiary name shown to payers
    pub name: String,
    pub holder: AccountHolder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOrderRequest {
    pub alias_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub label: String,
    pub instant_payment: bool,
    pub redirect_url: Option<String>,
}

/// Acquirer view of a VADS merchant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MerchantStatus {
    Live,
    NotLive,
    /// Response could not be interpreted
    Ambiguous(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    /// Banks able to debit `iban`, best match first.
    async fn search_providers(&self, iban: &str) -> Result<Vec<BankProvider>, AppError>;

    /// Returns the alias id.
    async fn create_alias(&self, request: &AliasRequest) -> Result<String, AppError>;

    async fn delete_alias(&self, alias_id: &str) -> Result<(), AppError>;

    /// Returns the authorized-account id. A holder already registered at the
    /// provider yields `ConstraintViolation`.
    async fn create_authorized_account(
        &self,
        request: &AuthorizedAccountRequest,
    ) -> Result<String, AppError>;

    async fn delete_authorized_account(&self, authorized_account_id: &str) -> Result<(), AppError>;

    /// Returns the external order id.
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<String, AppError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), AppError>;

    async fn check_merchant_status(&self, merchant_id: &str) -> Result<MerchantStatus, AppError>;
}

/// Credentials for the HTTP adapter.
#[derive(Debug, Clone)]
pub struct HttpPaymentSettings {
    pub oxlin_base_url: String,
    pub oxlin_client_id: String,
    pub oxlin_client_secret: String,
    pub monext_base_url: String,
    pub monext_api_key: String,
}

/// Oxlin + Monext over HTTP.
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    settings: HttpPaymentSettings,
    token: Arc<Mutex<Option<String>>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct ProviderSearchResponse {
    #[serde(default)]
    result: Vec<ProviderSearchResult>,
}

#[derive(Deserialize)]
struct ProviderSearchResult {
    #[serde(default)]
    providers: Vec<BankProvider>,
}

#[derive(Serialize)]
struct Instruction<'a> {
    amount: String,
    currency: &'a str,
    beneficiary: serde_json::Value,
    label: String,
}

#[derive(Deserialize)]
struct MerchantResponse {
    #[serde(default)]
    status: Option<String>,
}

impl HttpPaymentProvider {
    pub fn new(client: reqwest::Client, settings: HttpPaymentSettings) -> Self {
        Self {
            client,
            settings,
            token: Arc::new(Mutex::new(None)),
        }
    }

    fn oxlin_url(&self, path: &str) -> String {
        format!("{}{}", self.settings.oxlin_base_url.trim_end_matches('/'), path)
    }

    /// Client-credentials token, fetched once and reused until rejected.
    async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let response = self
            .client
            .post(self.oxlin_url("/oauth/token"))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.oxlin_client_id.as_str()),
                ("client_secret", self.settings.oxlin_client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(OXLIN, e))?;
        let token: TokenResponse = read_json(OXLIN, check_status(OXLIN, response).await?).await?;

        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    /// Send an authenticated Oxlin request, retrying once with a fresh
    /// token on 401.
    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, AppError> {
        for attempt in 0..2 {
            let token = self.access_token().await?;
            let mut request = self
                .client
                .request(method.clone(), self.oxlin_url(path))
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(|e| transport_error(OXLIN, e))?;

            if response.status() == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                tracing::info!("oxlin token rejected, refreshing");
                self.forget_token().await;
                continue;
            }
            return Ok(response);
        }
        Err(AppError::ProviderRejected {
            provider: OXLIN,
            detail: "authentication refused".to_string(),
        })
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn search_providers(&self, iban: &str) -> Result<Vec<BankProvider>, AppError> {
        let body = json!({ "payer": [{ "schema": "SEPA", "iban": iban }] });
        let response = self
            .send(reqwest::Method::POST, "/v1/providers/search", Some(&body))
            .await?;
        let search: ProviderSearchResponse =
            read_json(OXLIN, check_status(OXLIN, response).await?).await?;

        Ok(search
            .result
            .into_iter()
            .next()
            .map(|r| r.providers)
            .unwrap_or_default())
    }

    async fn create_alias(&self, request: &AliasRequest) -> Result<String, AppError> {
        let body = json!({
            "user_reference": request.user_reference,
            "label": request.label,
            "account": { "schema": "SEPA", "iban": request.iban },
            "bic": request.bic,
        });
        let response = self
            .send(reqwest::Method::POST, "/v1/account-aliases", Some(&body))
            .await?;
        let alias: IdResponse = read_json(OXLIN, check_status(OXLIN, response).await?).await?;
        Ok(alias.id)
    }

    async fn delete_alias(&self, alias_id: &str) -> Result<(), AppError> {
        let response = self
            .send(reqwest::Method::DELETE, &format!("/v1/account-aliases/{alias_id}"), None)
            .await?;
        check_status(OXLIN, response).await?;
        Ok(())
    }

    async fn create_authorized_account(
        &self,
        request: &AuthorizedAccountRequest,
    ) -> Result<String, AppError> {
        let entity = match &request.holder {
            AccountHolder::Company {
                company_name,
                national_identification,
            } => json!({
                "type": "COMPANY",
                "company_name": company_name,
                "national_identification": national_identification,
            }),
            AccountHolder::NaturalPerson {
                firstname,
                surname,
                birth_date,
                birth_city,
                birth_country,
            } => json!({
                "type": "NATURAL_PERSON",
                "firstname": firstname,
                "surname": surname,
                "birth_date": birth_date,
                "birth_city": birth_city,
                "birth_country": birth_country,
            }),
        };
        let body = json!({
            "identification": { "schema": "SEPA", "iban": request.iban, "name": request.name },
            "entity": entity,
        });

        let response = self
            .send(reqwest::Method::POST, "/v1/authorized-accounts", Some(&body))
            .await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(AppError::constraint(
                "an authorized account already exists for this holder",
            ));
        }
        let account: IdResponse = read_json(OXLIN, check_status(OXLIN, response).await?).await?;
        Ok(account.id)
    }

    async fn delete_authorized_account(&self, authorized_account_id: &str) -> Result<(), AppError> {
        let response = self
            .send(
                reqwest::Method::DELETE,
                &format!("/v1/authorized-accounts/{authorized_account_id}"),
                None,
            )
            .await?;
        check_status(OXLIN, response).await?;
        Ok(())
    }

    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<String, AppError> {
        let instruction = Instruction {
            amount: normalize::format_cents(request.amount_cents),
            currency: &request.currency,
            beneficiary: json!({ "schema": "ALIAS", "alias_id": request.alias_id }),
            label: normalize::format_label(&request.label),
        };
        let mut body = json!({
            "redirect_url": request
                .redirect_url
                .as_deref()
                .unwrap_or(DEFAULT_ORDER_REDIRECT_URL),
            "instructions": [instruction],
        });
        if request.instant_payment {
            body["instant_payment"] = json!("EXPECTED");
        }

        let response = self
            .send(reqwest::Method::POST, "/v1/payment-orders", Some(&body))
            .await?;
        let order: IdResponse = read_json(OXLIN, check_status(OXLIN, response).await?).await?;
        Ok(order.id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), AppError> {
        let response = self
            .send(
                reqwest::Method::POST,
                &format!("/v1/payment-orders/{order_id}/cancel"),
                None,
            )
            .await?;
        check_status(OXLIN, response).await?;
        Ok(())
    }

    async fn check_merchant_status(&self, merchant_id: &str) -> Result<MerchantStatus, AppError> {
        let url = format!(
            "{}/merchants/{merchant_id}",
            self.settings.monext_base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.settings.monext_api_key)
            .send()
            .await
            .map_err(|e| transport_error(MONEXT, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(MerchantStatus::NotLive);
        }
        let merchant: MerchantResponse =
            read_json(MONEXT, check_status(MONEXT, response).await?).await?;
        Ok(merchant_status(merchant.status.as_deref()))
    }
}

fn merchant_status(status: Option<&str>) -> MerchantStatus {
    match status.map(str::to_ascii_uppercase).as_deref() {
        Some("LIVE" | "ACTIVE" | "PRODUCTION") => MerchantStatus::Live,
        Some("PENDING" | "INACTIVE" | "TEST" | "SUSPENDED") => MerchantStatus::NotLive,
        Some(other) => MerchantStatus::Ambiguous(other.to_string()),
        None => MerchantStatus::Ambiguous("missing status".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merchant_status_mapping() {
        assert_eq!(merchant_status(Some("live")), MerchantStatus::Live);
        assert_eq!(merchant_status(Some("PENDING")), MerchantStatus::NotLive);
        assert_eq!(
            merchant_status(Some("weird")),
            MerchantStatus::Ambiguous("WEIRD".to_string())
        );
        assert!(matches!(merchant_status(None), MerchantStatus::Ambiguous(_)));
    }

    #[test]
    fn provider_search_takes_first_result() {
        let body = r#"{"result":[{"providers":[{"bic":"BNPAFRPP","name":"BNP"}]},{"providers":[]}]}"#;
        let parsed: ProviderSearchResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.result[0].providers[0].bic, "BNPAFRPP");
    }
}
