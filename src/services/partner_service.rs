//! Partner administration.
//!
//! Only administrative keys reach these operations. Registering a webhook
//! generates a fresh signing secret, which is returned once and never
//! serialized again.

use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{AppError, FieldError, collect_field_errors};
use crate::models::{
    partner::{CreatePartnerRequest, Partner, WebhookRegistration},
    scope::Scope,
};
use crate::services::identifiers;

fn require_admin(scope: &Scope) -> Result<(), AppError> {
    if scope.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub async fn create_partner(
    ctx: &AppContext,
    scope: &Scope,
    request: CreatePartnerRequest,
) -> Result<Partner, AppError> {
    require_admin(scope)?;
    let mut errors = Vec::new();
    if request.partner_name.trim().is_empty() {
        errors.push(FieldError::new("partner_name", "must not be empty"));
    }
    if request.creator_id.trim().is_empty() {
        errors.push(FieldError::new("creator_id", "must not be empty"));
    }
    collect_field_errors(errors)?;

    let partner = Partner {
        partner_id: identifiers::new_id(),
        partner_name: request.partner_name.trim().to_string(),
        notification_url: None,
        webhook_secret: None,
        creator_id: request.creator_id.trim().to_string(),
    };
    ctx.store.save_partner(&partner).await?;

    tracing::info!(partner_id = %partner.partner_id, "partner created");
    Ok(partner)
}

pub async fn get_partner(
    ctx: &AppContext,
    scope: &Scope,
    partner_id: Uuid,
) -> Result<Partner, AppError> {
    require_admin(scope)?;
    ctx.store
        .get_partner(scope, partner_id)
        .await?
        .ok_or(AppError::NotFound("partner"))
}

/// Set the partner's notification URL and rotate its secret.
///
/// # Process
///
/// 1. Validate URL format
/// 2. Generate a 32-byte random secret
/// 3. Store URL and secret on the partner
/// 4. Return the secret (only shown once)
pub async fn register_partner_webhook(
    ctx: &AppContext,
    scope: &Scope,
    partner_id: Uuid,
    url: String,
) -> Result<WebhookRegistration, AppError> {
    let mut partner = get_partner(ctx, scope, partner_id).await?;
    validate_webhook_url(&url)?;

    let secret = generate_secret();
    partner.notification_url = Some(url.clone());
    partner.webhook_secret = Some(secret.clone());
    ctx.store.save_partner(&partner).await?;

    tracing::info!(%partner_id, "partner webhook registered");
    Ok(WebhookRegistration {
        partner_id,
        notification_url: url,
        secret,
    })
}

/// 64 hex characters (32 random bytes).
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// HTTPS only, except plain HTTP on loopback hosts for local testing.
fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(AppError::invalid("url", "exceeds 2048 characters"));
    }

    let parsed =
        url::Url::parse(url).map_err(|_| AppError::invalid("url", "invalid URL format"))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => match parsed.host_str() {
            Some("localhost" | "127.0.0.1" | "0.0.0.0") => Ok(()),
            _ => Err(AppError::invalid(
                "url",
                "HTTP is only allowed for localhost, use HTTPS",
            )),
        },
        _ => Err(AppError::invalid("url", "must use HTTP or HTTPS")),
    }
}
