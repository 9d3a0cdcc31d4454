//! Billing address lookup. Addresses are snapshots taken from the company
//! registry when the account is created and are never edited.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::{
    context::AppContext, error::AppError, middleware::auth::AuthContext,
    models::billing_address::BillingAddress, services::billing_address_service,
};

/// `GET /api/v1/billing-addresses/{id}`
pub async fn get_billing_address(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<BillingAddress>, AppError> {
    let address = billing_address_service::get_billing_address(&ctx, &auth.scope, id).await?;
    Ok(Json(address))
}
