//! Invoices are served from the billing provider. The caller's scope is
//! enforced locally: an invoice is only returned when its billing customer
//! is an account the caller can see.

use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{invoice::Invoice, pagination::PageRequest, scope::Scope};
use crate::providers::bounded;
use crate::services::rules;

pub async fn get_invoice(
    ctx: &AppContext,
    scope: &Scope,
    invoice_id: &str,
) -> Result<Invoice, AppError> {
    let invoice = bounded("lago", ctx.provider_timeout(), ctx.billing.find_invoice(invoice_id))
        .await?
        .ok_or(AppError::NotFound("invoice"))?;

    let account_id = invoice
        .external_customer_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or(AppError::NotFound("invoice"))?;
    if ctx.store.get_account(scope, account_id).await?.is_none() {
        return Err(AppError::NotFound("invoice"));
    }
    Ok(invoice)
}

pub async fn list_invoices_by_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    page: PageRequest,
) -> Result<(Vec<Invoice>, i64), AppError> {
    rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    let listing = bounded(
        "lago",
        ctx.provider_timeout(),
        ctx.billing
            .list_invoices(&account_id.to_string(), page.page, page.per_page),
    )
    .await?;
    Ok((listing.invoices, listing.total_count))
}
