//! Terminal service.

use chrono::Utc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{
    contract::ContractType,
    pagination::PageRequest,
    scope::Scope,
    terminal::{
        CreateTerminalRequest, DEFAULT_TERMINAL_LABEL, Terminal, TerminalFilter,
        UpdateTerminalRequest,
    },
};
use crate::providers::{billing::SubscriptionRequest, bounded};
use crate::services::{identifiers, rules};

async fn load_terminal(
    ctx: &AppContext,
    scope: &Scope,
    terminal_id: Uuid,
) -> Result<Terminal, AppError> {
    ctx.store
        .get_terminal(scope, terminal_id)
        .await?
        .ok_or(AppError::NotFound("terminal"))
}

/// Add a terminal to a usable account. The billing subscription is created
/// first; a billing failure leaves no terminal behind.
pub async fn create_terminal(
    ctx: &AppContext,
    scope: &Scope,
    request: CreateTerminalRequest,
) -> Result<Terminal, AppError> {
    let account = rules::load_usable_account(ctx.store.as_ref(), scope, request.account_id).await?;

    let now = Utc::now();
    let plan = request
        .terminal_subscription_type
        .unwrap_or(ctx.settings.default_subscription_plan);
    let subscription_id = bounded(
        "lago",
        ctx.provider_timeout(),
        ctx.billing.create_subscription(&SubscriptionRequest {
            external_customer_id: account.account_id.to_string(),
            plan_code: plan.as_str().to_string(),
            subscription_at: now,
        }),
    )
    .await?;

    let terminal = Terminal {
        terminal_id: identifiers::new_id(),
        terminal_label: request
            .terminal_label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_TERMINAL_LABEL.to_string()),
        terminal_favorite_contract_type: request
            .terminal_favorite_contract_type
            .unwrap_or(ContractType::Ribpay),
        terminal_subscription_id: subscription_id,
        terminal_subscription_type: plan,
        terminal_created_at: now,
        terminal_last_modified: now,
        account_id: account.account_id,
        creator_id: account.creator_id,
    };
    ctx.store.insert_terminal(&terminal).await?;

    tracing::info!(terminal_id = %terminal.terminal_id, account_id = %terminal.account_id, "terminal created");
    Ok(terminal)
}

pub async fn get_terminal(
    ctx: &AppContext,
    scope: &Scope,
    terminal_id: Uuid,
) -> Result<Terminal, AppError> {
    load_terminal(ctx, scope, terminal_id).await
}

pub async fn list_terminals(
    ctx: &AppContext,
    scope: &Scope,
    filter: &TerminalFilter,
    page: PageRequest,
) -> Result<(Vec<Terminal>, i64), AppError> {
    ctx.store.list_terminals(scope, filter, page).await
}

pub async fn list_terminals_by_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    filter: &TerminalFilter,
    page: PageRequest,
) -> Result<(Vec<Terminal>, i64), AppError> {
    rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    let filter = TerminalFilter {
        account_id: Some(account_id),
        ..filter.clone()
    };
    ctx.store.list_terminals(scope, &filter, page).await
}

/// Rename a terminal or change its favorite contract type. The owning
/// account must not be deleted.
pub async fn update_terminal(
    ctx: &AppContext,
    scope: &Scope,
    terminal_id: Uuid,
    request: UpdateTerminalRequest,
) -> Result<Terminal, AppError> {
    let mut terminal = load_terminal(ctx, scope, terminal_id).await?;
    let account = rules::load_account(ctx.store.as_ref(), scope, terminal.account_id).await?;
    if account.is_deleted() {
        return Err(AppError::invalid_state("account is deleted"));
    }

    if let Some(label) = request.terminal_label {
        terminal.terminal_label = label.trim().to_string();
    }
    if let Some(favorite) = request.terminal_favorite_contract_type {
        terminal.terminal_favorite_contract_type = favorite;
    }
    terminal.terminal_last_modified = Utc::now();
    ctx.store.save_terminal(&terminal).await?;
    Ok(terminal)
}

/// Hard-delete a terminal with no live contract.
///
/// # Errors
///
/// `ConstraintViolation` while a non-deleted contract references it.
pub async fn delete_terminal(
    ctx: &AppContext,
    scope: &Scope,
    terminal_id: Uuid,
) -> Result<(), AppError> {
    let terminal = load_terminal(ctx, scope, terminal_id).await?;
    for contract_type in [ContractType::Ribpay, ContractType::Vads] {
        if rules::terminal_has_contract_of_type(ctx.store.as_ref(), terminal.terminal_id, contract_type)
            .await?
        {
            return Err(AppError::constraint(format!(
                "terminal still holds a live {contract_type} contract"
            )));
        }
    }

    ctx.store.delete_terminal(terminal_id).await?;
    tracing::info!(%terminal_id, "terminal deleted");
    Ok(())
}
