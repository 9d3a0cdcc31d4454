//! Account management HTTP handlers.
//!
//! This module implements the account-related API endpoints:
//! - POST /api/v1/accounts - Create an account from a SIRET
//! - GET /api/v1/accounts - List accounts visible to the caller
//! - GET /api/v1/accounts/{id} - Get account by ID
//! - PATCH /api/v1/accounts/{id} - Change the notification email
//! - DELETE /api/v1/accounts/{id} - Soft-delete
//! - POST /api/v1/accounts/{id}/validate/individual - Validate a sole trader
//! - POST /api/v1/accounts/{id}/validate/company - Validate a company with a hosted document
//! - POST /api/v1/accounts/{id}/kyc-document - Upload a PDF and validate a company
//! - GET /api/v1/accounts/{id}/{users,terminals,contracts,transactions,billing-addresses,invoices}

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use uuid::Uuid;

use crate::{
    context::AppContext,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        account::{
            Account, AccountCreated, AccountFilter, CompanyDocumentRequest, CreateAccountRequest,
            IdentityRequest, UpdateAccountRequest,
        },
        billing_address::BillingAddress,
        contract::{Contract, ContractFilter},
        invoice::Invoice,
        pagination::{Page, PageRequest, PaginationQuery},
        terminal::{Terminal, TerminalFilter},
        transaction::{Transaction, TransactionFilter},
        user::{User, UserFilter},
    },
    services::{
        account_service, billing_address_service, contract_service, invoice_service, lifecycle,
        terminal_service, transaction_service, user_service,
    },
};

/// Create a new account.
///
/// # Endpoint
///
/// `POST /api/v1/accounts`
///
/// # Request Body
///
/// ```json
/// {
///   "siret": "73282932000074",
///   "country": "FR",
///   "notification_email": "billing@example.com"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the account with its billing address, first terminal
///   and admin user
/// - **409**: a live account already uses this SIRET, or the company ceased trading
/// - **422**: invalid SIRET, country or email
/// - **502/503**: registry or billing provider failure
pub async fn create_account(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountCreated>), AppError> {
    let command = request.validate()?;
    let created = account_service::create_account(&ctx, &auth.creator_id, command).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get a specific account by ID.
///
/// Returns 404 if the account doesn't exist OR belongs to another tenant.
pub async fn get_account(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    let account = account_service::get_account(&ctx, &auth.scope, id).await?;
    Ok(Json(account))
}

/// List accounts.
///
/// # Query Parameters
///
/// `page`, `per_page`, `search`, `partner_id`, `created_before`, `created_after`,
/// `last_modified_before`, `last_modified_after`, `deleted_before`, `deleted_after`,
/// `is_active`, `type`, `is_deleted`
pub async fn list_accounts(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<AccountFilter>,
) -> Result<Json<Page<Account>>, AppError> {
    let page = PageRequest::from(pagination);
    let (accounts, total) = account_service::list_accounts(&ctx, &auth.scope, &filter, page).await?;
    Ok(Json(Page::new(accounts, total, page, &ctx.link_base("accounts"))))
}

pub async fn update_account(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAccountRequest>,
) -> Result<Json<Account>, AppError> {
    let email = request.validate()?;
    let account = account_service::update_account(&ctx, &auth.scope, id, email).await?;
    Ok(Json(account))
}

/// Soft-delete an account. A second call answers 409.
pub async fn delete_account(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    let account = account_service::soft_delete_account(&ctx, &auth.scope, id).await?;
    Ok(Json(account))
}

pub async fn validate_individual(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<Account>, AppError> {
    let identity = request.validate()?;
    let account = lifecycle::activate_individual(&ctx, &auth.scope, id, identity).await?;
    Ok(Json(account))
}

pub async fn validate_company(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<CompanyDocumentRequest>,
) -> Result<Json<Account>, AppError> {
    let account = lifecycle::activate_company(&ctx, &auth.scope, id, request.document_url).await?;
    Ok(Json(account))
}

/// Upload the KYC document as a raw `application/pdf` body.
pub async fn upload_kyc_document(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Account>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    let account =
        lifecycle::upload_kyc_document(&ctx, &auth.scope, id, body.to_vec(), &content_type).await?;
    Ok(Json(account))
}

pub async fn list_account_users(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Page<User>>, AppError> {
    let page = PageRequest::from(pagination);
    let (users, total) =
        user_service::list_users_by_account(&ctx, &auth.scope, id, &filter, page).await?;
    let link = ctx.link_base(&format!("accounts/{id}/users"));
    Ok(Json(Page::new(users, total, page, &link)))
}

pub async fn list_account_terminals(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<TerminalFilter>,
) -> Result<Json<Page<Terminal>>, AppError> {
    let page = PageRequest::from(pagination);
    let (terminals, total) =
        terminal_service::list_terminals_by_account(&ctx, &auth.scope, id, &filter, page).await?;
    let link = ctx.link_base(&format!("accounts/{id}/terminals"));
    Ok(Json(Page::new(terminals, total, page, &link)))
}

pub async fn list_account_contracts(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<ContractFilter>,
) -> Result<Json<Page<Contract>>, AppError> {
    let page = PageRequest::from(pagination);
    let (contracts, total) =
        contract_service::list_contracts_by_account(&ctx, &auth.scope, id, &filter, page).await?;
    let link = ctx.link_base(&format!("accounts/{id}/contracts"));
    Ok(Json(Page::new(contracts, total, page, &link)))
}

pub async fn list_account_transactions(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Page<Transaction>>, AppError> {
    let page = PageRequest::from(pagination);
    let (transactions, total) =
        transaction_service::list_transactions_by_account(&ctx, &auth.scope, id, &filter, page)
            .await?;
    let link = ctx.link_base(&format!("accounts/{id}/transactions"));
    Ok(Json(Page::new(transactions, total, page, &link)))
}

pub async fn list_account_billing_addresses(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BillingAddress>>, AppError> {
    let addresses =
        billing_address_service::list_billing_addresses_by_account(&ctx, &auth.scope, id).await?;
    Ok(Json(addresses))
}

pub async fn list_account_invoices(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Page<Invoice>>, AppError> {
    let page = PageRequest::from(pagination);
    let (invoices, total) =
        invoice_service::list_invoices_by_account(&ctx, &auth.scope, id, page).await?;
    let link = ctx.link_base(&format!("accounts/{id}/invoices"));
    Ok(Json(Page::new(invoices, total, page, &link)))
}
