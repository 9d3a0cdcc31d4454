use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::{
    context::AppContext, error::AppError, middleware::auth::AuthContext, models::invoice::Invoice,
    services::invoice_service,
};

/// Fetch one invoice from the billing provider.
///
/// # Endpoint
///
/// `GET /api/v1/invoices/{id}`, where `id` is the billing provider's invoice id.
///
/// Returns 404 when the invoice is unknown or bills an account outside the
/// caller's tenant.
pub async fn get_invoice(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = invoice_service::get_invoice(&ctx, &auth.scope, &id).await?;
    Ok(Json(invoice))
}
