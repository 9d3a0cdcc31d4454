//! Transaction HTTP handlers.
//!
//! This module implements transaction-related API endpoints:
//! - POST /api/v1/transactions - Record a payment request
//! - GET /api/v1/transactions - List transactions
//! - GET /api/v1/transactions/{id} - Get transaction details
//! - PATCH /api/v1/transactions/{id} - Move to a final status
//! - POST /api/v1/transactions/{id}/payment-order - Submit to the bank-payment provider

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    context::AppContext,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        pagination::{Page, PageRequest, PaginationQuery},
        transaction::{
            CreateTransactionRequest, Transaction, TransactionFilter, UpdateTransactionRequest,
        },
    },
    services::transaction_service,
};

/// Create a transaction.
///
/// # Endpoint
///
/// `POST /api/v1/transactions`
///
/// # Request Body
///
/// ```json
/// {
///   "account_id": "550e8400-...",
///   "terminal_id": "660e8400-...",
///   "amount_cents": "12.50",
///   "label": "Order 1234"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "transaction_id": "770e8400-...",
///   "transaction_status": "NEW",
///   "transaction_amount_cents": 1250,
///   "transaction_amount_without_vat": 1000,
///   "transaction_auth_url": "https://pay.example.com/authorize/770e8400-..."
/// }
/// ```
pub async fn create_transaction(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let command = request.validate()?;
    let transaction = transaction_service::create_transaction(&ctx, &auth.scope, command).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Get transaction details by ID.
///
/// Returns 404 if the transaction doesn't exist OR belongs to another tenant.
pub async fn get_transaction(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = transaction_service::get_transaction(&ctx, &auth.scope, id).await?;
    Ok(Json(transaction))
}

pub async fn list_transactions(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Page<Transaction>>, AppError> {
    let page = PageRequest::from(pagination);
    let (transactions, total) =
        transaction_service::list_transactions(&ctx, &auth.scope, &filter, page).await?;
    Ok(Json(Page::new(
        transactions,
        total,
        page,
        &ctx.link_base("transactions"),
    )))
}

/// Move a `NEW` transaction to a final status (`CLOSED`, `CANCELLED`,
/// `FINISHED`, `ACCEPTED` or `EXECUTED`).
///
/// # Errors
///
/// - **409**: the transaction already reached a final status
/// - **422**: the target status is `NEW`
/// - **502/503**: the provider order could not be cancelled; the status is unchanged
pub async fn update_transaction(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTransactionRequest>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = transaction_service::update_transaction_status(
        &ctx,
        &auth.scope,
        id,
        request.transaction_status,
    )
    .await?;
    Ok(Json(transaction))
}

pub async fn initiate_payment_order(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = transaction_service::initiate_payment_order(&ctx, &auth.scope, id).await?;
    Ok(Json(transaction))
}
