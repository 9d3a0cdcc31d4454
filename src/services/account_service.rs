//! Account service.
//!
//! # Creation
//!
//! 1. Refuse a second live account for the same SIRET in the tenant
//! 2. Look the SIREN up in the company registry; it must still be trading
//! 3. Create the billing customer and the first terminal's subscription
//! 4. Insert account, billing address, terminal, admin user and membership
//!    in one datastore transaction
//!
//! Provider calls happen before any local write, so a provider failure
//! leaves nothing behind locally.

use chrono::Utc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{
    account::{Account, AccountCreated, AccountFilter, CreateAccountCommand, CreatedUser},
    billing_address::BillingAddress,
    contract::ContractType,
    pagination::PageRequest,
    scope::Scope,
    terminal::{DEFAULT_TERMINAL_LABEL, Terminal},
    user::{Membership, User, UserRole},
};
use crate::providers::{
    billing::{BillingCustomer, SubscriptionRequest},
    bounded,
};
use crate::services::{identifiers, lifecycle, normalize, rules};
use crate::store::AccountBundle;

/// Create an account for the `creator_id` tenant.
///
/// # Errors
///
/// - `ConstraintViolation` if a live account already uses the SIRET
/// - `NotFound` if the partner or the registry record does not exist
/// - `InvalidState` if the registry reports the business as ceased
/// - provider errors from the registry or billing provider
pub async fn create_account(
    ctx: &AppContext,
    creator_id: &str,
    command: CreateAccountCommand,
) -> Result<AccountCreated, AppError> {
    let store = ctx.store.as_ref();
    let timeout = ctx.provider_timeout();

    if store
        .find_live_account_by_national_id(creator_id, &command.siret)
        .await?
        .is_some()
    {
        return Err(AppError::constraint(
            "an account already exists for this SIRET",
        ));
    }
    if let Some(partner_id) = command.partner_id {
        store
            .get_partner(&Scope::Admin, partner_id)
            .await?
            .ok_or(AppError::NotFound("partner"))?;
    }

    let siren = normalize::siret_to_siren(&command.siret);
    let company = bounded("inpi", timeout, ctx.registry.fetch_company(siren)).await?;
    if !company.is_active {
        return Err(AppError::invalid_state("company has ceased trading"));
    }

    let now = Utc::now();
    let account_id = identifiers::new_id();
    let account_name = normalize::format_beneficiary_name(&company.name);
    let plan = command
        .subscription_type
        .unwrap_or(ctx.settings.default_subscription_plan);

    bounded(
        "lago",
        timeout,
        ctx.billing.create_customer(&BillingCustomer {
            external_id: account_id.to_string(),
            name: account_name.clone(),
            legal_name: company.name.clone(),
            legal_number: command.siret.clone(),
            address_line1: Some(company.address.street_line()).filter(|s| !s.is_empty()),
            zipcode: company.address.postal_code.clone(),
            city: company.address.city.clone(),
            country: "FR".to_string(),
            email: Some(command.notification_email.clone()),
        }),
    )
    .await?;
    let subscription_id = bounded(
        "lago",
        timeout,
        ctx.billing.create_subscription(&SubscriptionRequest {
            external_customer_id: account_id.to_string(),
            plan_code: plan.as_str().to_string(),
            subscription_at: now,
        }),
    )
    .await?;

    let account = Account {
        account_id,
        account_national_id: command.siret,
        account_name,
        account_type: company.kind,
        account_currency: "EUR".to_string(),
        account_notification_email: Some(command.notification_email),
        account_is_active: false,
        account_created_at: now,
        account_last_modified: now,
        account_deletion_date: None,
        account_creation_url: Some(format!(
            "{}/account/{creator_id}/{account_id}",
            ctx.settings.account_portal_base_url
        )),
        account_blob_storage_url: None,
        creator_id: creator_id.to_string(),
        partner_id: command.partner_id,
    };
    let billing_address = BillingAddress::from_registry(
        identifiers::new_id(),
        account_id,
        creator_id,
        &company.address,
    );
    let terminal = Terminal {
        terminal_id: identifiers::new_id(),
        terminal_label: DEFAULT_TERMINAL_LABEL.to_string(),
        terminal_favorite_contract_type: ContractType::Ribpay,
        terminal_subscription_id: subscription_id,
        terminal_subscription_type: plan,
        terminal_created_at: now,
        terminal_last_modified: now,
        account_id,
        creator_id: creator_id.to_string(),
    };
    let user = User::blank(identifiers::new_id(), creator_id, now);
    let membership = Membership {
        user_id: user.user_id,
        account_id,
        user_role: UserRole::Admin,
    };

    let bundle = AccountBundle {
        account,
        billing_address,
        terminal,
        user,
        membership,
    };
    store.create_account_bundle(&bundle).await?;

    tracing::info!(
        %account_id,
        creator_id,
        account_type = bundle.account.account_type.as_str(),
        "account created"
    );

    Ok(AccountCreated {
        user: CreatedUser {
            user_id: bundle.user.user_id,
            user_role: UserRole::Admin,
            creator_id: creator_id.to_string(),
        },
        account: bundle.account,
        billing_address: bundle.billing_address,
        terminal: bundle.terminal,
    })
}

pub async fn get_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
) -> Result<Account, AppError> {
    rules::load_account(ctx.store.as_ref(), scope, account_id).await
}

/// Cross-tenant lookup for administrators.
pub async fn get_account_admin(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
) -> Result<Account, AppError> {
    if !scope.is_admin() {
        return Err(AppError::Forbidden);
    }
    rules::load_account(ctx.store.as_ref(), &Scope::Admin, account_id).await
}

pub async fn list_accounts(
    ctx: &AppContext,
    scope: &Scope,
    filter: &AccountFilter,
    page: PageRequest,
) -> Result<(Vec<Account>, i64), AppError> {
    ctx.store.list_accounts(scope, filter, page).await
}

/// Change the notification address of an active account.
pub async fn update_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    notification_email: String,
) -> Result<Account, AppError> {
    let mut account = rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    lifecycle::check_account_update(&account)?;

    account.account_notification_email = Some(notification_email);
    account.account_last_modified = Utc::now();
    ctx.store.save_account(&account).await?;
    Ok(account)
}

pub async fn soft_delete_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
) -> Result<Account, AppError> {
    lifecycle::soft_delete(ctx, scope, account_id).await
}
