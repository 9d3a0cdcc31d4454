//! Referential-integrity rules checked before any write.
//!
//! Predicates answer a question; `ensure_*` helpers turn a failed predicate
//! into the error the caller should surface.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    account::Account, contract::ContractType, scope::Scope, terminal::Terminal, user::UserRole,
};
use crate::store::Store;

/// Active and not deleted.
pub fn account_is_usable(account: &Account) -> bool {
    account.account_is_active && !account.is_deleted()
}

/// # Errors
///
/// `InvalidState` when the account is deleted or not yet activated.
pub fn ensure_account_usable(account: &Account) -> Result<(), AppError> {
    if account.is_deleted() {
        return Err(AppError::invalid_state("account is deleted"));
    }
    if !account.account_is_active {
        return Err(AppError::invalid_state("account is not active"));
    }
    Ok(())
}

/// Load an account visible in `scope`.
pub async fn load_account(
    store: &dyn Store,
    scope: &Scope,
    account_id: Uuid,
) -> Result<Account, AppError> {
    store
        .get_account(scope, account_id)
        .await?
        .ok_or(AppError::NotFound("account"))
}

/// Load an account and require it to be usable.
pub async fn load_usable_account(
    store: &dyn Store,
    scope: &Scope,
    account_id: Uuid,
) -> Result<Account, AppError> {
    let account = load_account(store, scope, account_id).await?;
    ensure_account_usable(&account)?;
    Ok(account)
}

/// Load a terminal in `scope` and require it to belong to `account_id`.
///
/// # Errors
///
/// `NotFound` if the terminal is not visible, `ConstraintViolation` if it
/// belongs to another account.
pub async fn load_terminal_of_account(
    store: &dyn Store,
    scope: &Scope,
    terminal_id: Uuid,
    account_id: Uuid,
) -> Result<Terminal, AppError> {
    let terminal = store
        .get_terminal(scope, terminal_id)
        .await?
        .ok_or(AppError::NotFound("terminal"))?;
    if terminal.account_id != account_id {
        return Err(AppError::constraint("terminal belongs to another account"));
    }
    Ok(terminal)
}

pub async fn terminal_has_contract_of_type(
    store: &dyn Store,
    terminal_id: Uuid,
    contract_type: ContractType,
) -> Result<bool, AppError> {
    Ok(store
        .live_contract_on_terminal(terminal_id, contract_type)
        .await?
        .is_some())
}

/// Require the terminal to have no live contract of `contract_type`, other
/// than `except`.
pub async fn ensure_no_contract_of_type(
    store: &dyn Store,
    terminal_id: Uuid,
    contract_type: ContractType,
    except: Option<Uuid>,
) -> Result<(), AppError> {
    match store.live_contract_on_terminal(terminal_id, contract_type).await? {
        Some(existing) if Some(existing) != except => Err(AppError::constraint(format!(
            "terminal already has a {contract_type} contract"
        ))),
        _ => Ok(()),
    }
}

/// True when `user_id` is an admin of a non-deleted account and no other
/// admin exists on it.
pub async fn sole_admin_of_active_account(
    store: &dyn Store,
    user_id: Uuid,
    account_id: Uuid,
) -> Result<bool, AppError> {
    let memberships = store.memberships_for_account(account_id).await?;
    let is_admin = memberships
        .iter()
        .any(|m| m.user_id == user_id && m.user_role == UserRole::Admin);
    if !is_admin {
        return Ok(false);
    }

    let account_live = store
        .get_account(&Scope::Admin, account_id)
        .await?
        .is_some_and(|a| !a.is_deleted());
    if !account_live {
        return Ok(false);
    }

    let admins = memberships
        .iter()
        .filter(|m| m.user_role == UserRole::Admin)
        .count();
    Ok(admins == 1)
}

pub async fn ensure_not_sole_admin(
    store: &dyn Store,
    user_id: Uuid,
    account_id: Uuid,
) -> Result<(), AppError> {
    if sole_admin_of_active_account(store, user_id, account_id).await? {
        return Err(AppError::constraint(
            "user is the only admin of the account",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::account::AccountType;

    fn account(active: bool, deleted: bool) -> Account {
        let now = Utc::now();
        Account {
            account_id: Uuid::new_v4(),
            account_national_id: "73282932000074".into(),
            account_name: "ACME".into(),
            account_type: AccountType::Company,
            account_currency: "EUR".into(),
            account_notification_email: None,
            account_is_active: active,
            account_created_at: now,
            account_last_modified: now,
            account_deletion_date: deleted.then_some(now),
            account_creation_url: None,
            account_blob_storage_url: None,
            creator_id: "tenant".into(),
            partner_id: None,
        }
    }

    #[test]
    fn usable_means_active_and_not_deleted() {
        assert!(account_is_usable(&account(true, false)));
        assert!(!account_is_usable(&account(false, false)));
        assert!(!account_is_usable(&account(true, true)));
    }

    #[test]
    fn deleted_wins_over_inactive() {
        let err = ensure_account_usable(&account(false, true)).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(msg) if msg == "account is deleted"));
    }
}
