//! Administrative HTTP handlers, mounted under `/api/v1/admin` behind
//! `require_admin`.
//!
//! - POST /api/v1/admin/partners
//! - GET /api/v1/admin/partners/{id}
//! - POST /api/v1/admin/partners/{id}/webhook
//! - GET /api/v1/admin/accounts/{id} - Any tenant's account
//! - POST /api/v1/admin/contracts/{id}/activate - Force a VADS activation
//! - POST /api/v1/admin/reconciliation - Run one reconciliation pass now

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    context::AppContext,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        account::Account,
        contract::Contract,
        partner::{CreatePartnerRequest, Partner, RegisterWebhookRequest, WebhookRegistration},
    },
    services::{account_service, contract_service, partner_service, reconciliation},
};

pub async fn create_partner(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreatePartnerRequest>,
) -> Result<(StatusCode, Json<Partner>), AppError> {
    let partner = partner_service::create_partner(&ctx, &auth.scope, request).await?;
    Ok((StatusCode::CREATED, Json(partner)))
}

pub async fn get_partner(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Partner>, AppError> {
    let partner = partner_service::get_partner(&ctx, &auth.scope, id).await?;
    Ok(Json(partner))
}

/// Register a partner's webhook endpoint.
///
/// # Request Body
///
/// ```json
/// {
///   "url": "https://partner.example.com/hooks"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "partner_id": "880e8400-...",
///   "notification_url": "https://partner.example.com/hooks",
///   "secret": "a1b2c3d4..."
/// }
/// ```
///
/// **IMPORTANT**: The secret is only returned once. Registering again
/// rotates it.
pub async fn register_partner_webhook(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<RegisterWebhookRequest>,
) -> Result<(StatusCode, Json<WebhookRegistration>), AppError> {
    let registration =
        partner_service::register_partner_webhook(&ctx, &auth.scope, id, request.url).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn get_account(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    let account = account_service::get_account_admin(&ctx, &auth.scope, id).await?;
    Ok(Json(account))
}

pub async fn activate_contract(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contract>, AppError> {
    let contract = contract_service::activate_vads_contract(&ctx, &auth.scope, id).await?;
    Ok(Json(contract))
}

#[derive(Debug, Serialize)]
pub struct ReconciliationResponse {
    pub checked: usize,
    pub activated: usize,
    pub still_pending: usize,
    pub failed: usize,
}

pub async fn run_reconciliation(
    State(ctx): State<AppContext>,
) -> Result<Json<ReconciliationResponse>, AppError> {
    let report = reconciliation::run_reconciliation(&ctx).await?;
    Ok(Json(ReconciliationResponse {
        checked: report.checked,
        activated: report.activated,
        still_pending: report.still_pending,
        failed: report.failed,
    }))
}
