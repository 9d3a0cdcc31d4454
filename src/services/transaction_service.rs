//! Transaction service.
//!
//! # Lifecycle
//!
//! A transaction is created `NEW` with its amount already normalized to
//! cents. A payment order may then be opened at the provider. Any final
//! status is reached exactly once: the provider order (if any) is cancelled
//! first, and the local status only changes when that succeeds.

use chrono::Utc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{
    contract::Contract,
    pagination::PageRequest,
    scope::Scope,
    transaction::{
        CreateTransactionCommand, DEFAULT_VAT_RATE, Transaction, TransactionFilter,
        TransactionStatus,
    },
};
use crate::providers::{bounded, payment::PaymentOrderRequest};
use crate::services::{identifiers, lifecycle, normalize, rules};

const OXLIN: &str = "oxlin";

async fn load_transaction(
    ctx: &AppContext,
    scope: &Scope,
    transaction_id: Uuid,
) -> Result<Transaction, AppError> {
    ctx.store
        .get_transaction(scope, transaction_id)
        .await?
        .ok_or(AppError::NotFound("transaction"))
}

/// Record a new payment attempt.
///
/// # Process
///
/// 1. Account visible and usable
/// 2. Terminal visible and owned by the account
/// 3. Contract, when given, visible, not deleted and owned by the account
/// 4. Persist with status `NEW` and the authorization URL
///
/// No provider call is made.
pub async fn create_transaction(
    ctx: &AppContext,
    scope: &Scope,
    command: CreateTransactionCommand,
) -> Result<Transaction, AppError> {
    let store = ctx.store.as_ref();
    let account = rules::load_usable_account(store, scope, command.account_id).await?;
    rules::load_terminal_of_account(store, scope, command.terminal_id, account.account_id).await?;

    let transaction_type = match command.contract_id {
        Some(contract_id) => {
            let contract = store
                .get_contract(scope, contract_id)
                .await?
                .ok_or(AppError::NotFound("contract"))?;
            if contract.is_deleted() {
                return Err(AppError::invalid_state("contract is deleted"));
            }
            if contract.common().account_id != account.account_id {
                return Err(AppError::constraint("contract belongs to another account"));
            }
            Some(contract.contract_type())
        }
        None => None,
    };

    let now = Utc::now();
    let transaction_id = identifiers::new_id();
    let transaction = Transaction {
        transaction_id,
        transaction_id_oxlin: None,
        transaction_status: TransactionStatus::New,
        transaction_instant_payment: command.instant_payment,
        transaction_amount_cents: command.amount_cents,
        transaction_amount_without_vat: normalize::vat_excluded(command.amount_cents),
        transaction_vat: DEFAULT_VAT_RATE,
        transaction_currency: "EUR".to_string(),
        transaction_label: command.label,
        transaction_beneficiary: account.account_name,
        transaction_auth_url: Some(format!(
            "{}/{transaction_id}",
            ctx.settings.authorize_base_url
        )),
        transaction_redirect_url: command.redirect_url,
        transaction_notification_url: command.notification_url,
        transaction_initiated: now,
        transaction_last_modified: now,
        transaction_finished: None,
        transaction_metadata: command.metadata,
        transaction_type,
        account_id: account.account_id,
        terminal_id: command.terminal_id,
        contract_id: command.contract_id,
        creator_id: account.creator_id,
    };
    store.insert_transaction(&transaction).await?;

    tracing::info!(
        %transaction_id,
        amount_cents = transaction.transaction_amount_cents,
        "transaction created"
    );
    Ok(transaction)
}

/// Open the provider payment order for a `NEW` RIBPAY transaction.
///
/// # Errors
///
/// `InvalidState` if the transaction is final, already has an order, or is
/// not bound to a live RIBPAY contract.
pub async fn initiate_payment_order(
    ctx: &AppContext,
    scope: &Scope,
    transaction_id: Uuid,
) -> Result<Transaction, AppError> {
    let mut transaction = load_transaction(ctx, scope, transaction_id).await?;
    if transaction.transaction_status != TransactionStatus::New {
        return Err(AppError::invalid_state("transaction is no longer NEW"));
    }
    if transaction.transaction_id_oxlin.is_some() {
        return Err(AppError::invalid_state("payment order already initiated"));
    }

    let contract_id = transaction
        .contract_id
        .ok_or_else(|| AppError::invalid_state("transaction has no contract"))?;
    let alias_id = match ctx.store.get_contract(scope, contract_id).await? {
        Some(Contract::Ribpay(ribpay)) if ribpay.common.contract_deleted_at.is_none() => {
            ribpay.contract_alias_id
        }
        Some(_) => {
            return Err(AppError::invalid_state(
                "payment orders need a live RIBPAY contract",
            ));
        }
        None => return Err(AppError::NotFound("contract")),
    };

    let order_id = bounded(
        OXLIN,
        ctx.provider_timeout(),
        ctx.payments.create_order(&PaymentOrderRequest {
            alias_id,
            amount_cents: transaction.transaction_amount_cents,
            currency: transaction.transaction_currency.clone(),
            label: transaction.transaction_label.clone(),
            instant_payment: transaction.transaction_instant_payment,
            redirect_url: transaction.transaction_redirect_url.clone(),
        }),
    )
    .await?;

    transaction.transaction_id_oxlin = Some(order_id);
    transaction.transaction_last_modified = Utc::now();
    ctx.store.save_transaction(&transaction).await?;

    tracing::info!(%transaction_id, "payment order initiated");
    Ok(transaction)
}

/// Move a `NEW` transaction to a final status.
///
/// The provider order is cancelled first when one exists; if that call
/// fails the stored status is left unchanged.
pub async fn update_transaction_status(
    ctx: &AppContext,
    scope: &Scope,
    transaction_id: Uuid,
    status: TransactionStatus,
) -> Result<Transaction, AppError> {
    let mut transaction = load_transaction(ctx, scope, transaction_id).await?;
    lifecycle::check_transaction_transition(transaction.transaction_status, status)?;

    if let Some(order_id) = &transaction.transaction_id_oxlin {
        bounded(OXLIN, ctx.provider_timeout(), ctx.payments.cancel_order(order_id)).await?;
    }

    let now = Utc::now();
    transaction.transaction_status = status;
    transaction.transaction_finished = Some(now);
    transaction.transaction_last_modified = now;
    ctx.store.save_transaction(&transaction).await?;

    tracing::info!(%transaction_id, status = status.as_str(), "transaction finalized");
    Ok(transaction)
}

pub async fn get_transaction(
    ctx: &AppContext,
    scope: &Scope,
    transaction_id: Uuid,
) -> Result<Transaction, AppError> {
    load_transaction(ctx, scope, transaction_id).await
}

pub async fn list_transactions(
    ctx: &AppContext,
    scope: &Scope,
    filter: &TransactionFilter,
    page: PageRequest,
) -> Result<(Vec<Transaction>, i64), AppError> {
    ctx.store.list_transactions(scope, filter, page).await
}

pub async fn list_transactions_by_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    filter: &TransactionFilter,
    page: PageRequest,
) -> Result<(Vec<Transaction>, i64), AppError> {
    rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    let filter = TransactionFilter {
        account_id: Some(account_id),
        ..filter.clone()
    };
    ctx.store.list_transactions(scope, &filter, page).await
}

pub async fn list_transactions_by_terminal(
    ctx: &AppContext,
    scope: &Scope,
    terminal_id: Uuid,
    filter: &TransactionFilter,
    page: PageRequest,
) -> Result<(Vec<Transaction>, i64), AppError> {
    ctx.store
        .get_terminal(scope, terminal_id)
        .await?
        .ok_or(AppError::NotFound("terminal"))?;
    let filter = TransactionFilter {
        terminal_id: Some(terminal_id),
        ..filter.clone()
    };
    ctx.store.list_transactions(scope, &filter, page).await
}
