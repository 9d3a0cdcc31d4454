//! Billing addresses are read-only: they are written once with the account.

use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{billing_address::BillingAddress, scope::Scope};
use crate::services::rules;

pub async fn get_billing_address(
    ctx: &AppContext,
    scope: &Scope,
    billing_address_id: Uuid,
) -> Result<BillingAddress, AppError> {
    ctx.store
        .get_billing_address(scope, billing_address_id)
        .await?
        .ok_or(AppError::NotFound("billing address"))
}

pub async fn list_billing_addresses_by_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
) -> Result<Vec<BillingAddress>, AppError> {
    rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    ctx.store.list_billing_addresses(scope, account_id).await
}
