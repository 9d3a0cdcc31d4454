//! Billing provider port (Lago).
//!
//! Every account is a billing customer keyed by its account id; every
//! terminal carries one subscription. Invoices are read straight from the
//! provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{check_status, read_json, transport_error};
use crate::error::AppError;
use crate::models::invoice::{Invoice, InvoiceListing};

const LAGO: &str = "lago";

/// Customer record pushed at account creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingCustomer {
    /// Account id
    pub external_id: String,
    pub name: String,
    pub legal_name: String,
    /// SIRET
    pub legal_number: String,
    pub address_line1: Option<String>,
    pub zipcode: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Account id
    pub external_customer_id: String,
    pub plan_code: String,
    pub subscription_at: DateTime<Utc>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync + 'static {
    async fn create_customer(&self, customer: &BillingCustomer) -> Result<(), AppError>;

    /// Returns the subscription external id stored on the terminal.
    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<String, AppError>;

    /// `None` when the provider does not know the invoice.
    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, AppError>;

    async fn list_invoices(
        &self,
        external_customer_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<InvoiceListing, AppError>;
}

pub struct LagoBillingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct InvoiceEnvelope {
    invoice: LagoInvoice,
}

#[derive(Deserialize)]
struct InvoicesEnvelope {
    #[serde(default)]
    invoices: Vec<LagoInvoice>,
    meta: Option<LagoMeta>,
}

#[derive(Deserialize)]
struct LagoMeta {
    total_count: i64,
}

#[derive(Deserialize)]
struct LagoInvoice {
    lago_id: String,
    number: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
    currency: Option<String>,
    issuing_date: Option<String>,
    total_amount_cents: Option<i64>,
    file_url: Option<String>,
    customer: Option<LagoCustomerRef>,
}

#[derive(Deserialize)]
struct LagoCustomerRef {
    external_id: Option<String>,
}

impl From<LagoInvoice> for Invoice {
    fn from(raw: LagoInvoice) -> Self {
        Invoice {
            lago_id: raw.lago_id,
            number: raw.number,
            status: raw.status,
            payment_status: raw.payment_status,
            currency: raw.currency,
            issuing_date: raw.issuing_date,
            total_amount_cents: raw.total_amount_cents,
            file_url: raw.file_url,
            external_customer_id: raw.customer.and_then(|c| c.external_id),
        }
    }
}

impl LagoBillingProvider {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }
}

#[async_trait]
impl BillingProvider for LagoBillingProvider {
    async fn create_customer(&self, customer: &BillingCustomer) -> Result<(), AppError> {
        let body = json!({
            "customer": {
                "external_id": customer.external_id,
                "name": customer.name,
                "legal_name": customer.legal_name,
                "legal_number": customer.legal_number,
                "address_line1": customer.address_line1,
                "zipcode": customer.zipcode,
                "city": customer.city,
                "country": customer.country,
                "email": customer.email,
                "currency": "EUR",
                "billing_configuration": { "document_locale": "fr" },
            }
        });
        let response = self
            .client
            .post(self.url("/customers"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(LAGO, e))?;
        check_status(LAGO, response).await?;
        Ok(())
    }

    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<String, AppError> {
        let external_id = uuid::Uuid::new_v4().to_string();
        let body = json!({
            "subscription": {
                "external_customer_id": request.external_customer_id,
                "plan_code": request.plan_code,
                "external_id": external_id,
                "subscription_at": request.subscription_at.to_rfc3339(),
                "billing_time": "calendar",
            }
        });
        let response = self
            .client
            .post(self.url("/subscriptions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(LAGO, e))?;
        check_status(LAGO, response).await?;
        Ok(external_id)
    }

    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, AppError> {
        let response = self
            .client
            .get(self.url(&format!("/invoices/{invoice_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(LAGO, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: InvoiceEnvelope = read_json(LAGO, check_status(LAGO, response).await?).await?;
        Ok(Some(envelope.invoice.into()))
    }

    async fn list_invoices(
        &self,
        external_customer_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<InvoiceListing, AppError> {
        let response = self
            .client
            .get(self.url("/invoices"))
            .bearer_auth(&self.api_key)
            .query(&[
                ("external_customer_id", external_customer_id.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(LAGO, e))?;
        let envelope: InvoicesEnvelope = read_json(LAGO, check_status(LAGO, response).await?).await?;

        let invoices: Vec<Invoice> = envelope.invoices.into_iter().map(Invoice::from).collect();
        let total_count = envelope
            .meta
            .map(|m| m.total_count)
            .unwrap_or(invoices.len() as i64);
        Ok(InvoiceListing {
            invoices,
            total_count,
        })
    }
}
