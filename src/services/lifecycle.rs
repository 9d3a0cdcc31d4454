//! Lifecycle state machines.
//!
//! # Account
//!
//! ```text
//! pending --activate_individual / activate_company--> active
//! pending | active --soft_delete--> deleted
//! ```
//!
//! `deleted` is final. Activation is only possible from `pending`.
//!
//! # Contract
//!
//! RIBPAY contracts are live from creation. VADS contracts start pending and
//! become active through reconciliation or an admin action. Soft deletion is
//! orthogonal and final.
//!
//! # Transaction
//!
//! `NEW` is the only non-final status; a transaction moves to a final status
//! exactly once.
//!
//! The `check_*` functions are pure; the account workflows below load, check
//! and persist.

use chrono::Utc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{
    account::{Account, AccountType, Identity},
    contract::Contract,
    scope::Scope,
    transaction::TransactionStatus,
    user::UserRole,
};
use crate::providers::bounded;
use crate::services::rules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Pending,
    Active,
    Deleted,
}

impl AccountState {
    pub fn of(account: &Account) -> Self {
        if account.is_deleted() {
            AccountState::Deleted
        } else if account.account_is_active {
            AccountState::Active
        } else {
            AccountState::Pending
        }
    }
}

pub fn check_activation(account: &Account) -> Result<(), AppError> {
    match AccountState::of(account) {
        AccountState::Pending => Ok(()),
        AccountState::Active => Err(AppError::invalid_state("account is already active")),
        AccountState::Deleted => Err(AppError::invalid_state("account is deleted")),
    }
}

pub fn check_soft_delete(account: &Account) -> Result<(), AppError> {
    match AccountState::of(account) {
        AccountState::Deleted => Err(AppError::invalid_state("account is already deleted")),
        _ => Ok(()),
    }
}

/// Only active accounts accept profile changes.
pub fn check_account_update(account: &Account) -> Result<(), AppError> {
    match AccountState::of(account) {
        AccountState::Active => Ok(()),
        AccountState::Pending => Err(AppError::invalid_state("account is not active")),
        AccountState::Deleted => Err(AppError::invalid_state("account is deleted")),
    }
}

pub fn check_vads_activation(contract: &Contract) -> Result<(), AppError> {
    match contract {
        Contract::Ribpay(_) => Err(AppError::invalid_state(
            "RIBPAY contracts are active from creation",
        )),
        Contract::Vads(_) if contract.is_deleted() => {
            Err(AppError::invalid_state("contract is deleted"))
        }
        Contract::Vads(vads) if vads.contract_is_active => {
            Err(AppError::invalid_state("contract is already active"))
        }
        Contract::Vads(_) => Ok(()),
    }
}

pub fn check_contract_removal(contract: &Contract) -> Result<(), AppError> {
    if contract.is_deleted() {
        return Err(AppError::invalid_state("contract is already deleted"));
    }
    Ok(())
}

/// Validate a status change requested by a caller.
///
/// # Errors
///
/// - `Validation` if the target is `NEW`
/// - `InvalidState` if the transaction already reached a final status
pub fn check_transaction_transition(
    current: TransactionStatus,
    target: TransactionStatus,
) -> Result<(), AppError> {
    if !target.is_terminal() {
        return Err(AppError::invalid(
            "transaction_status",
            "must be a final status",
        ));
    }
    match current {
        TransactionStatus::New => Ok(()),
        TransactionStatus::Cancelled => Err(AppError::invalid_state(
            "transaction is already cancelled",
        )),
        _ => Err(AppError::invalid_state("transaction is already completed")),
    }
}

/// Validate a sole-trader account: fill the admin user's identity and
/// activate.
///
/// # Errors
///
/// `NotFound`, `InvalidState` (deleted, already active, or a company
/// account), `ConstraintViolation` if the account has no admin user.
pub async fn activate_individual(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    identity: Identity,
) -> Result<Account, AppError> {
    let store = ctx.store.as_ref();
    let mut account = rules::load_account(store, scope, account_id).await?;
    check_activation(&account)?;
    if account.account_type != AccountType::Individual {
        return Err(AppError::invalid_state(
            "company accounts are validated with a KYC document",
        ));
    }

    let admin_id = store
        .memberships_for_account(account_id)
        .await?
        .into_iter()
        .find(|m| m.user_role == UserRole::Admin)
        .map(|m| m.user_id)
        .ok_or_else(|| AppError::constraint("account has no admin user"))?;
    let mut admin = store
        .get_user(&Scope::Admin, admin_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let now = Utc::now();
    admin.user_first_name = Some(identity.first_name);
    admin.user_last_name = Some(identity.last_name);
    if identity.email.is_some() {
        admin.user_email = identity.email;
    }
    if identity.phone.is_some() {
        admin.user_phone = identity.phone;
    }
    admin.user_birth_date = Some(identity.birth_date);
    admin.user_birth_city = Some(identity.birth_city);
    admin.user_birth_country = Some(identity.birth_country);
    admin.user_last_modified = now;
    store.save_user(&admin).await?;

    account.account_is_active = true;
    account.account_last_modified = now;
    store.save_account(&account).await?;

    tracing::info!(%account_id, user_id = %admin_id, "individual account activated");
    Ok(account)
}

/// Validate a company account with a hosted KYC document.
pub async fn activate_company(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    document_url: String,
) -> Result<Account, AppError> {
    let store = ctx.store.as_ref();
    let mut account = rules::load_account(store, scope, account_id).await?;
    check_activation(&account)?;
    if account.account_type != AccountType::Company {
        return Err(AppError::invalid_state(
            "individual accounts are validated with an identity",
        ));
    }
    if url::Url::parse(&document_url).is_err() {
        return Err(AppError::invalid("document_url", "must be an absolute URL"));
    }

    account.account_blob_storage_url = Some(document_url);
    account.account_is_active = true;
    account.account_last_modified = Utc::now();
    store.save_account(&account).await?;

    tracing::info!(%account_id, "company account activated");
    Ok(account)
}

/// Upload a KYC PDF, then activate the company account with its URL.
///
/// The account is checked before the upload so a refused activation leaves
/// no orphaned document.
pub async fn upload_kyc_document(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    bytes: Vec<u8>,
    content_type: &str,
) -> Result<Account, AppError> {
    if content_type != "application/pdf" || !bytes.starts_with(b"%PDF-") {
        return Err(AppError::invalid("document", "must be a PDF file"));
    }
    let account = rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    check_activation(&account)?;
    if account.account_type != AccountType::Company {
        return Err(AppError::invalid_state(
            "individual accounts are validated with an identity",
        ));
    }

    let url = bounded(
        "blob_storage",
        ctx.provider_timeout(),
        ctx.storage
            .upload(bytes, &ctx.settings.kyc_container, content_type),
    )
    .await?;

    activate_company(ctx, scope, account_id, url).await
}

/// Soft-delete an account. Children are left in place.
pub async fn soft_delete(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
) -> Result<Account, AppError> {
    let mut account = rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    check_soft_delete(&account)?;

    let now = Utc::now();
    account.account_deletion_date = Some(now);
    account.account_is_active = false;
    account.account_last_modified = now;
    ctx.store.save_account(&account).await?;

    tracing::info!(%account_id, "account soft-deleted");
    Ok(account)
}
