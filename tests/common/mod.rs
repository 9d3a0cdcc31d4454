//! Shared test fixtures: in-memory store, recording provider doubles and
//! helpers that walk an account through onboarding.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use merchant_account_service::{
    context::{AppContext, Settings},
    error::AppError,
    middleware::auth::hash_api_key,
    models::{
        account::{AccountCreated, AccountType, CreateAccountCommand, Identity},
        api_key::ApiKey,
        billing_address::CompanyAddress,
        invoice::{Invoice, InvoiceListing},
        scope::Scope,
        terminal::SubscriptionPlan,
    },
    providers::{
        billing::{BillingCustomer, BillingProvider, SubscriptionRequest},
        mailer::{Mailer, VadsSubscriptionForm},
        payment::{
            AliasRequest, AuthorizedAccountRequest, BankProvider, MerchantStatus,
            PaymentOrderRequest, PaymentProvider,
        },
        registry::{CompanyRecord, CompanyRegistry},
        storage::BlobStorage,
    },
    services::{account_service, lifecycle, notification_service::WebhookSender},
    store::memory::MemoryStore,
};

pub const TENANT: &str = "tenant-a";
pub const OTHER_TENANT: &str = "tenant-b";
pub const COMPANY_SIRET: &str = "73282932000074";
pub const INDIVIDUAL_SIRET: &str = "44201234500009";
pub const IBAN: &str = "FR1420041010050500013M02606";
pub const ONBOARDING_EMAIL: &str = "onboarding@example.com";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn unavailable(provider: &'static str) -> AppError {
    AppError::ProviderUnavailable {
        provider,
        detail: "simulated outage".to_string(),
    }
}

fn rejected(provider: &'static str) -> AppError {
    AppError::ProviderRejected {
        provider,
        detail: "simulated refusal".to_string(),
    }
}

// Payments

#[derive(Default)]
pub struct PaymentState {
    pub aliases: HashSet<String>,
    pub authorized_accounts: HashSet<String>,
    pub orders: HashSet<String>,
    pub cancelled_orders: Vec<String>,
    pub order_requests: Vec<PaymentOrderRequest>,
    pub authorized_requests: Vec<AuthorizedAccountRequest>,
    pub merchant_statuses: HashMap<String, MerchantStatus>,
    pub merchant_status_calls: usize,
    pub no_bank: bool,
    pub hang_search: bool,
    pub fail_authorized_account: bool,
    pub fail_delete_alias: bool,
    pub fail_cancel: bool,
    pub fail_merchant_status: HashSet<String>,
    next_id: u32,
}

#[derive(Default)]
pub struct FakePayments {
    state: Mutex<PaymentState>,
}

impl FakePayments {
    pub fn state(&self) -> MutexGuard<'_, PaymentState> {
        lock(&self.state)
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut s = self.state();
        s.next_id += 1;
        format!("{prefix}-{}", s.next_id)
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn search_providers(&self, _iban: &str) -> Result<Vec<BankProvider>, AppError> {
        let (hang, no_bank) = {
            let s = self.state();
            (s.hang_search, s.no_bank)
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if no_bank {
            return Ok(Vec::new());
        }
        Ok(vec![BankProvider {
            bic: "BNPAFRPP".to_string(),
            name: Some("BNP Paribas".to_string()),
        }])
    }

    async fn create_alias(&self, _request: &AliasRequest) -> Result<String, AppError> {
        let id = self.next_id("alias");
        self.state().aliases.insert(id.clone());
        Ok(id)
    }

    async fn delete_alias(&self, alias_id: &str) -> Result<(), AppError> {
        let mut s = self.state();
        if s.fail_delete_alias {
            return Err(unavailable("oxlin"));
        }
        s.aliases.remove(alias_id);
        Ok(())
    }

    async fn create_authorized_account(
        &self,
        request: &AuthorizedAccountRequest,
    ) -> Result<String, AppError> {
        if self.state().fail_authorized_account {
            return Err(rejected("oxlin"));
        }
        let id = Uuid::new_v4().to_string();
        let mut s = self.state();
        s.authorized_accounts.insert(id.clone());
        s.authorized_requests.push(request.clone());
        Ok(id)
    }

    async fn delete_authorized_account(&self, authorized_account_id: &str) -> Result<(), AppError> {
        self.state().authorized_accounts.remove(authorized_account_id);
        Ok(())
    }

    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<String, AppError> {
        let id = self.next_id("order");
        let mut s = self.state();
        s.orders.insert(id.clone());
        s.order_requests.push(request.clone());
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), AppError> {
        let mut s = self.state();
        if s.fail_cancel {
            return Err(unavailable("oxlin"));
        }
        s.cancelled_orders.push(order_id.to_string());
        Ok(())
    }

    async fn check_merchant_status(&self, merchant_id: &str) -> Result<MerchantStatus, AppError> {
        let mut s = self.state();
        s.merchant_status_calls += 1;
        if s.fail_merchant_status.contains(merchant_id) {
            return Err(unavailable("monext"));
        }
        Ok(s
            .merchant_statuses
            .get(merchant_id)
            .cloned()
            .unwrap_or(MerchantStatus::NotLive))
    }
}

// Billing

#[derive(Default)]
pub struct BillingState {
    pub customers: Vec<BillingCustomer>,
    pub subscriptions: Vec<SubscriptionRequest>,
    pub invoices: Vec<Invoice>,
    pub fail_subscription: bool,
}

#[derive(Default)]
pub struct FakeBilling {
    state: Mutex<BillingState>,
}

impl FakeBilling {
    pub fn state(&self) -> MutexGuard<'_, BillingState> {
        lock(&self.state)
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn create_customer(&self, customer: &BillingCustomer) -> Result<(), AppError> {
        self.state().customers.push(customer.clone());
        Ok(())
    }

    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<String, AppError> {
        let mut s = self.state();
        if s.fail_subscription {
            return Err(unavailable("lago"));
        }
        s.subscriptions.push(request.clone());
        Ok(format!("sub-{}", s.subscriptions.len()))
    }

    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .state()
            .invoices
            .iter()
            .find(|i| i.lago_id == invoice_id)
            .cloned())
    }

    async fn list_invoices(
        &self,
        external_customer_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<InvoiceListing, AppError> {
        let matching: Vec<Invoice> = self
            .state()
            .invoices
            .iter()
            .filter(|i| i.external_customer_id.as_deref() == Some(external_customer_id))
            .cloned()
            .collect();
        let total_count = matching.len() as i64;
        let skip = (page.saturating_sub(1) * per_page) as usize;
        Ok(InvoiceListing {
            invoices: matching.into_iter().skip(skip).take(per_page as usize).collect(),
            total_count,
        })
    }
}

pub fn invoice(id: &str, account_id: Uuid) -> Invoice {
    Invoice {
        lago_id: id.to_string(),
        number: Some(format!("INV-{id}")),
        status: Some("finalized".to_string()),
        payment_status: Some("succeeded".to_string()),
        currency: Some("EUR".to_string()),
        issuing_date: Some("2026-01-31".to_string()),
        total_amount_cents: Some(2900),
        file_url: None,
        external_customer_id: Some(account_id.to_string()),
    }
}

// Registry

#[derive(Default)]
pub struct FakeRegistry {
    companies: Mutex<HashMap<String, CompanyRecord>>,
}

impl FakeRegistry {
    pub fn with_defaults() -> Self {
        let registry = Self::default();
        registry.insert(company_record("732829320", AccountType::Company, true));
        registry.insert(company_record("442012345", AccountType::Individual, true));
        registry
    }

    pub fn insert(&self, record: CompanyRecord) {
        lock(&self.companies).insert(record.siren.clone(), record);
    }
}

pub fn company_record(siren: &str, kind: AccountType, is_active: bool) -> CompanyRecord {
    CompanyRecord {
        siren: siren.to_string(),
        name: match kind {
            AccountType::Company => "Acme Boulangerie SAS".to_string(),
            AccountType::Individual => "Jean Martin".to_string(),
        },
        is_active,
        kind,
        address: CompanyAddress {
            address: Some("12 RUE DE LA PAIX 75002 PARIS".to_string()),
            street_number: Some("12".to_string()),
            street_type: Some("RUE".to_string()),
            street_label: Some("DE LA PAIX".to_string()),
            postal_code: Some("75002".to_string()),
            city: Some("PARIS".to_string()),
            country: Some("FRANCE".to_string()),
            country_code: Some("FR".to_string()),
            ..CompanyAddress::default()
        },
    }
}

#[async_trait]
impl CompanyRegistry for FakeRegistry {
    async fn fetch_company(&self, siren: &str) -> Result<CompanyRecord, AppError> {
        lock(&self.companies)
            .get(siren)
            .cloned()
            .ok_or(AppError::NotFound("company"))
    }
}

// Storage

#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl BlobStorage for FakeStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        container: &str,
        _content_type: &str,
    ) -> Result<String, AppError> {
        let mut uploads = lock(&self.uploads);
        uploads.push((container.to_string(), bytes.len()));
        Ok(format!("https://blob.test/{container}/{}.pdf", uploads.len()))
    }
}

// Mail

#[derive(Default)]
pub struct MailState {
    pub forms: Vec<(String, VadsSubscriptionForm)>,
    pub activations: Vec<(String, String, Uuid)>,
    pub fail: bool,
}

#[derive(Default)]
pub struct FakeMailer {
    state: Mutex<MailState>,
}

impl FakeMailer {
    pub fn state(&self) -> MutexGuard<'_, MailState> {
        lock(&self.state)
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send_contract_activated(
        &self,
        to: &str,
        merchant_id: &str,
        contract_id: Uuid,
    ) -> Result<(), AppError> {
        let mut s = self.state();
        if s.fail {
            return Err(unavailable("mail"));
        }
        s.activations
            .push((to.to_string(), merchant_id.to_string(), contract_id));
        Ok(())
    }

    async fn send_vads_subscription_form(
        &self,
        to: &str,
        form: &VadsSubscriptionForm,
    ) -> Result<(), AppError> {
        let mut s = self.state();
        if s.fail {
            return Err(unavailable("mail"));
        }
        s.forms.push((to.to_string(), form.clone()));
        Ok(())
    }
}

// Webhooks

#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: String,
    pub event_id: Uuid,
    pub signature: String,
    pub body: String,
}

#[derive(Default)]
pub struct FakeWebhooks {
    pub deliveries: Mutex<Vec<Delivery>>,
}

#[async_trait]
impl WebhookSender for FakeWebhooks {
    async fn deliver(
        &self,
        url: &str,
        event_id: Uuid,
        signature: &str,
        body: String,
    ) -> Result<(), AppError> {
        lock(&self.deliveries).push(Delivery {
            url: url.to_string(),
            event_id,
            signature: signature.to_string(),
            body,
        });
        Ok(())
    }
}

// Application

pub struct TestApp {
    pub ctx: AppContext,
    pub store: Arc<MemoryStore>,
    pub payments: Arc<FakePayments>,
    pub billing: Arc<FakeBilling>,
    pub registry: Arc<FakeRegistry>,
    pub storage: Arc<FakeStorage>,
    pub mailer: Arc<FakeMailer>,
    pub webhooks: Arc<FakeWebhooks>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let payments = Arc::new(FakePayments::default());
        let billing = Arc::new(FakeBilling::default());
        let registry = Arc::new(FakeRegistry::with_defaults());
        let storage = Arc::new(FakeStorage::default());
        let mailer = Arc::new(FakeMailer::default());
        let webhooks = Arc::new(FakeWebhooks::default());

        let ctx = AppContext {
            store: store.clone(),
            payments: payments.clone(),
            billing: billing.clone(),
            registry: registry.clone(),
            storage: storage.clone(),
            mailer: mailer.clone(),
            webhooks: webhooks.clone(),
            settings: Arc::new(Settings {
                public_base_url: "https://api.example.com".to_string(),
                authorize_base_url: "https://pay.example.com/authorize".to_string(),
                account_portal_base_url: "https://portal.example.com".to_string(),
                provider_timeout: Duration::from_millis(200),
                kyc_container: "kyc".to_string(),
                default_subscription_plan: SubscriptionPlan::RibpayClassic,
                vads_onboarding_email: ONBOARDING_EMAIL.to_string(),
            }),
        };

        Self {
            ctx,
            store,
            payments,
            billing,
            registry,
            storage,
            mailer,
            webhooks,
        }
    }

    /// Register a raw API key for `creator_id`.
    pub fn seed_api_key(&self, raw: &str, creator_id: &str, is_admin: bool) {
        self.store.insert_api_key(ApiKey {
            id: Uuid::new_v4(),
            key_hash: hash_api_key(raw),
            creator_id: creator_id.to_string(),
            is_admin,
            is_active: true,
            created_at: Utc::now(),
        });
    }

    /// Pending account for `siret` in `creator_id`.
    pub async fn create_account(&self, creator_id: &str, siret: &str) -> AccountCreated {
        account_service::create_account(
            &self.ctx,
            creator_id,
            CreateAccountCommand {
                siret: siret.to_string(),
                notification_email: "owner@example.com".to_string(),
                subscription_type: None,
                partner_id: None,
            },
        )
        .await
        .expect("create account")
    }

    /// Active company account in the main tenant.
    pub async fn active_company(&self) -> AccountCreated {
        let mut created = self.create_account(TENANT, COMPANY_SIRET).await;
        created.account = lifecycle::activate_company(
            &self.ctx,
            &tenant(),
            created.account.account_id,
            "https://docs.example.com/kbis.pdf".to_string(),
        )
        .await
        .expect("activate company");
        created
    }

    /// Active sole-trader account in the main tenant, admin identity filled.
    pub async fn active_individual(&self) -> AccountCreated {
        let mut created = self.create_account(TENANT, INDIVIDUAL_SIRET).await;
        created.account = lifecycle::activate_individual(
            &self.ctx,
            &tenant(),
            created.account.account_id,
            identity(),
        )
        .await
        .expect("activate individual");
        created
    }
}

pub fn tenant() -> Scope {
    Scope::Tenant(TENANT.to_string())
}

pub fn other_tenant() -> Scope {
    Scope::Tenant(OTHER_TENANT.to_string())
}

pub fn identity() -> Identity {
    Identity {
        first_name: "Jean".to_string(),
        last_name: "Martin".to_string(),
        email: Some("jean.martin@example.com".to_string()),
        phone: None,
        birth_date: "1985/06/15".to_string(),
        birth_city: "Lyon".to_string(),
        birth_country: "FR".to_string(),
    }
}
