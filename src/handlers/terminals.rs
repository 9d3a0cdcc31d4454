//! Terminal HTTP handlers.
//!
//! - POST /api/v1/terminals
//! - GET /api/v1/terminals
//! - GET /api/v1/terminals/{id}
//! - PATCH /api/v1/terminals/{id}
//! - DELETE /api/v1/terminals/{id}
//! - GET /api/v1/terminals/{id}/contracts
//! - GET /api/v1/terminals/{id}/transactions

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
        contract::{Contract, ContractFilter},
        pagination::{Page, PageRequest, PaginationQuery},
        terminal::{CreateTerminalRequest, Terminal, TerminalFilter, UpdateTerminalRequest},
        transaction::{Transaction, TransactionFilter},
    },
    services::{contract_service, terminal_service, transaction_service},
};

/// Create a terminal on an active account.
///
/// # Endpoint
///
/// `POST /api/v1/terminals`
///
/// # Response
///
/// - **201 Created**: the terminal, with its billing subscription id
/// - **409**: the account is deleted or not active
/// - **502/503**: the billing provider refused or did not answer; nothing is stored
pub async fn create_terminal(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTerminalRequest>,
) -> Result<(StatusCode, Json<Terminal>), AppError> {
    let terminal = terminal_service::create_terminal(&ctx, &auth.scope, request).await?;
    Ok((StatusCode::CREATED, Json(terminal)))
}

pub async fn get_terminal(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Terminal>, AppError> {
    let terminal = terminal_service::get_terminal(&ctx, &auth.scope, id).await?;
    Ok(Json(terminal))
}

pub async fn list_terminals(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<TerminalFilter>,
) -> Result<Json<Page<Terminal>>, AppError> {
    let page = PageRequest::from(pagination);
    let (terminals, total) =
        terminal_service::list_terminals(&ctx, &auth.scope, &filter, page).await?;
    Ok(Json(Page::new(terminals, total, page, &ctx.link_base("terminals"))))
}

pub async fn update_terminal(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTerminalRequest>,
) -> Result<Json<Terminal>, AppError> {
    let request = request.validate()?;
    let terminal = terminal_service::update_terminal(&ctx, &auth.scope, id, request).await?;
    Ok(Json(terminal))
}

pub async fn delete_terminal(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    terminal_service::delete_terminal(&ctx, &auth.scope, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_terminal_contracts(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<ContractFilter>,
) -> Result<Json<Page<Contract>>, AppError> {
    let page = PageRequest::from(pagination);
    let (contracts, total) =
        contract_service::list_contracts_by_terminal(&ctx, &auth.scope, id, &filter, page).await?;
    let link = ctx.link_base(&format!("terminals/{id}/contracts"));
    Ok(Json(Page::new(contracts, total, page, &link)))
}

pub async fn list_terminal_transactions(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Page<Transaction>>, AppError> {
    let page = PageRequest::from(pagination);
    let (transactions, total) =
        transaction_service::list_transactions_by_terminal(&ctx, &auth.scope, id, &filter, page)
            .await?;
    let link = ctx.link_base(&format!("terminals/{id}/transactions"));
    Ok(Json(Page::new(transactions, total, page, &link)))
}
