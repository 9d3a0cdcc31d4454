//! Contract service.
//!
//! # RIBPAY provisioning
//!
//! 1. Account usable, terminal checks, no live RIBPAY contract on the terminal
//! 2. Find the payer bank (BIC) for the IBAN
//! 3. Create the IBAN alias
//! 4. Create the authorized account; on failure delete the alias
//! 5. Persist; on failure delete the authorized account and the alias
//!
//! Compensation failures are logged and the original error is returned.
//!
//! # VADS provisioning
//!
//! Persisted inactive, then the acquirer subscription form is mailed in the
//! background. The contract goes live through reconciliation or
//! `activate_vads_contract`.

use chrono::Utc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{
    account::{Account, AccountType},
    contract::{
        Contract, ContractCommon, ContractFilter, ContractType, CreateRibpayCommand,
        CreateVadsCommand, RibpayContract, VadsContract,
    },
    pagination::PageRequest,
    scope::Scope,
    terminal::Terminal,
    user::UserRole,
};
use crate::providers::{
    bounded,
    mailer::VadsSubscriptionForm,
    payment::{AccountHolder, AliasRequest, AuthorizedAccountRequest},
};
use crate::services::{identifiers, lifecycle, rules};

const OXLIN: &str = "oxlin";

async fn load_contract(
    ctx: &AppContext,
    scope: &Scope,
    contract_id: Uuid,
) -> Result<Contract, AppError> {
    ctx.store
        .get_contract(scope, contract_id)
        .await?
        .ok_or(AppError::NotFound("contract"))
}

/// Shared pre-checks for both contract types. Returns the usable account
/// and, when given, its terminal.
async fn check_placement(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    terminal_id: Option<Uuid>,
    contract_type: ContractType,
) -> Result<(Account, Option<Terminal>), AppError> {
    let store = ctx.store.as_ref();
    let account = rules::load_usable_account(store, scope, account_id).await?;

    let terminal = match terminal_id {
        Some(terminal_id) => {
            let terminal =
                rules::load_terminal_of_account(store, scope, terminal_id, account_id).await?;
            rules::ensure_no_contract_of_type(store, terminal_id, contract_type, None).await?;
            Some(terminal)
        }
        None => None,
    };
    Ok((account, terminal))
}

/// Authorized-account holder for the account: the company itself, or the
/// admin user for a sole trader.
async fn account_holder(ctx: &AppContext, account: &Account) -> Result<AccountHolder, AppError> {
    match account.account_type {
        AccountType::Company => Ok(AccountHolder::Company {
            company_name: account.account_name.clone(),
            national_identification: account.account_national_id.clone(),
        }),
        AccountType::Individual => {
            let admin_id = ctx
                .store
                .memberships_for_account(account.account_id)
                .await?
                .into_iter()
                .find(|m| m.user_role == UserRole::Admin)
                .map(|m| m.user_id)
                .ok_or_else(|| AppError::constraint("account has no admin user"))?;
            let admin = ctx
                .store
                .get_user(&Scope::Admin, admin_id)
                .await?
                .ok_or(AppError::NotFound("user"))?;

            match (
                admin.user_first_name,
                admin.user_last_name,
                admin.user_birth_date,
                admin.user_birth_city,
                admin.user_birth_country,
            ) {
                (Some(firstname), Some(surname), Some(birth_date), Some(birth_city), Some(birth_country)) => {
                    Ok(AccountHolder::NaturalPerson {
                        firstname,
                        surname,
                        // The provider expects ISO dates.
                        birth_date: birth_date.replace('/', "-"),
                        birth_city,
                        birth_country,
                    })
                }
                _ => Err(AppError::invalid_state(
                    "admin user identity is incomplete",
                )),
            }
        }
    }
}

/// Provision and persist a RIBPAY contract.
///
/// # Errors
///
/// - `NotFound` / `InvalidState` for the account, `ConstraintViolation` for
///   terminal placement
/// - `ProviderRejected` when no bank serves the IBAN or the provider refuses
/// - `ProviderUnavailable` on provider timeouts
pub async fn create_ribpay_contract(
    ctx: &AppContext,
    scope: &Scope,
    command: CreateRibpayCommand,
) -> Result<Contract, AppError> {
    let (account, terminal) = check_placement(
        ctx,
        scope,
        command.account_id,
        command.terminal_id,
        ContractType::Ribpay,
    )
    .await?;
    let holder = account_holder(ctx, &account).await?;
    let timeout = ctx.provider_timeout();
    let payments = ctx.payments.as_ref();

    let banks = bounded(OXLIN, timeout, payments.search_providers(&command.iban)).await?;
    let bic = banks
        .into_iter()
        .next()
        .map(|b| b.bic)
        .ok_or_else(|| AppError::ProviderRejected {
            provider: OXLIN,
            detail: "no bank found for this IBAN".to_string(),
        })?;

    let alias_id = bounded(
        OXLIN,
        timeout,
        payments.create_alias(&AliasRequest {
            user_reference: account.account_id.to_string(),
            label: account.account_name.clone(),
            iban: command.iban.clone(),
            bic,
        }),
    )
    .await?;

    let authorized = bounded(
        OXLIN,
        timeout,
        payments.create_authorized_account(&AuthorizedAccountRequest {
            iban: command.iban.clone(),
            name: account.account_name.clone(),
            holder,
        }),
    )
    .await;
    let authorized_account_id = match authorized {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(account_id = %account.account_id, %alias_id, error = %e, "authorized account failed, removing alias");
            compensate_alias(ctx, &alias_id).await;
            return Err(e);
        }
    };

    let now = Utc::now();
    let contract = Contract::Ribpay(RibpayContract {
        common: ContractCommon {
            contract_id: identifiers::new_id(),
            contract_created_at: now,
            contract_last_modified: now,
            contract_deleted_at: None,
            contract_number: identifiers::generate_reference(
                identifiers::RIBPAY_REFERENCE_PREFIX,
                &authorized_account_id,
            ),
            contract_beneficiary_name: account.account_name.clone(),
            contract_merchant_id: authorized_account_id.clone(),
            account_id: account.account_id,
            terminal_id: terminal.map(|t| t.terminal_id),
            creator_id: account.creator_id.clone(),
        },
        contract_alias_id: alias_id.clone(),
    });

    if let Err(e) = ctx.store.insert_contract(&contract).await {
        tracing::error!(account_id = %account.account_id, error = %e, "contract persistence failed, deprovisioning");
        compensate_authorized_account(ctx, &authorized_account_id).await;
        compensate_alias(ctx, &alias_id).await;
        return Err(e);
    }

    tracing::info!(contract_id = %contract.id(), account_id = %account.account_id, "RIBPAY contract created");
    Ok(contract)
}

async fn compensate_alias(ctx: &AppContext, alias_id: &str) {
    if let Err(e) = bounded(OXLIN, ctx.provider_timeout(), ctx.payments.delete_alias(alias_id)).await {
        tracing::error!(%alias_id, error = %e, "alias compensation failed");
    }
}

async fn compensate_authorized_account(ctx: &AppContext, authorized_account_id: &str) {
    if let Err(e) = bounded(
        OXLIN,
        ctx.provider_timeout(),
        ctx.payments.delete_authorized_account(authorized_account_id),
    )
    .await
    {
        tracing::error!(%authorized_account_id, error = %e, "authorized account compensation failed");
    }
}

/// Persist a pending VADS contract and dispatch its subscription form.
pub async fn create_vads_contract(
    ctx: &AppContext,
    scope: &Scope,
    command: CreateVadsCommand,
) -> Result<Contract, AppError> {
    let (account, terminal) = check_placement(
        ctx,
        scope,
        command.account_id,
        command.terminal_id,
        ContractType::Vads,
    )
    .await?;

    let now = Utc::now();
    let contract = Contract::Vads(VadsContract {
        common: ContractCommon {
            contract_id: identifiers::new_id(),
            contract_created_at: now,
            contract_last_modified: now,
            contract_deleted_at: None,
            contract_number: identifiers::vads_contract_number(&command.merchant_id),
            contract_beneficiary_name: account.account_name.clone(),
            contract_merchant_id: command.merchant_id.clone(),
            account_id: account.account_id,
            terminal_id: terminal.map(|t| t.terminal_id),
            creator_id: account.creator_id.clone(),
        },
        contract_bank_name: command.bank_name.clone(),
        contract_bank_code: command.bank_code.clone(),
        contract_3d_secure: command.three_d_secure,
        contract_max_amount: command.max_amount,
        contract_is_active: false,
    });
    ctx.store.insert_contract(&contract).await?;

    let form = VadsSubscriptionForm {
        contract_id: contract.id(),
        beneficiary_name: account.account_name,
        merchant_id: command.merchant_id,
        bank_name: command.bank_name,
        bank_code: command.bank_code,
        three_d_secure: command.three_d_secure,
        max_amount: command.max_amount,
    };
    let mailer = ctx.mailer.clone();
    let to = ctx.settings.vads_onboarding_email.clone();
    let timeout = ctx.provider_timeout();
    tokio::spawn(async move {
        let sent = bounded("mail", timeout, mailer.send_vads_subscription_form(&to, &form)).await;
        if let Err(e) = sent {
            tracing::error!(contract_id = %form.contract_id, error = %e, "VADS subscription form not sent");
        }
    });

    tracing::info!(contract_id = %contract.id(), account_id = %contract.common().account_id, "VADS contract created");
    Ok(contract)
}

/// Mark a pending VADS contract active. Administrators only.
pub async fn activate_vads_contract(
    ctx: &AppContext,
    scope: &Scope,
    contract_id: Uuid,
) -> Result<Contract, AppError> {
    if !scope.is_admin() {
        return Err(AppError::Forbidden);
    }
    let contract = load_contract(ctx, scope, contract_id).await?;
    mark_vads_active(ctx, contract).await
}

/// Flip `is_active` on a VADS contract after the lifecycle check. Shared
/// with reconciliation.
pub(crate) async fn mark_vads_active(
    ctx: &AppContext,
    mut contract: Contract,
) -> Result<Contract, AppError> {
    lifecycle::check_vads_activation(&contract)?;
    let now = Utc::now();
    ctx.store.activate_vads_contract(contract.id(), now).await?;
    if let Contract::Vads(vads) = &mut contract {
        vads.contract_is_active = true;
        vads.common.contract_last_modified = now;
    }

    tracing::info!(contract_id = %contract.id(), "VADS contract activated");
    Ok(contract)
}

/// Soft-delete a contract. RIBPAY contracts are deprovisioned first; if
/// that fails nothing is recorded.
pub async fn remove_contract(
    ctx: &AppContext,
    scope: &Scope,
    contract_id: Uuid,
) -> Result<Contract, AppError> {
    let mut contract = load_contract(ctx, scope, contract_id).await?;
    lifecycle::check_contract_removal(&contract)?;

    if let Contract::Ribpay(ribpay) = &contract {
        let timeout = ctx.provider_timeout();
        bounded(OXLIN, timeout, ctx.payments.delete_alias(&ribpay.contract_alias_id)).await?;
        bounded(
            OXLIN,
            timeout,
            ctx.payments
                .delete_authorized_account(&ribpay.common.contract_merchant_id),
        )
        .await?;
    }

    let now = Utc::now();
    let common = contract.common_mut();
    common.contract_deleted_at = Some(now);
    common.contract_last_modified = now;
    ctx.store.save_contract(&contract).await?;

    tracing::info!(%contract_id, "contract removed");
    Ok(contract)
}

/// Move a live contract to another terminal of the same account.
pub async fn reassign_contract(
    ctx: &AppContext,
    scope: &Scope,
    contract_id: Uuid,
    terminal_id: Uuid,
) -> Result<Contract, AppError> {
    let store = ctx.store.as_ref();
    let mut contract = load_contract(ctx, scope, contract_id).await?;
    if contract.is_deleted() {
        return Err(AppError::invalid_state("contract is deleted"));
    }
    let account_id = contract.common().account_id;
    let mut target = rules::load_terminal_of_account(store, scope, terminal_id, account_id).await?;
    rules::ensure_no_contract_of_type(
        store,
        terminal_id,
        contract.contract_type(),
        Some(contract_id),
    )
    .await?;

    let now = Utc::now();
    let previous = contract.common().terminal_id;
    let common = contract.common_mut();
    common.terminal_id = Some(terminal_id);
    common.contract_last_modified = now;
    store.save_contract(&contract).await?;

    target.terminal_last_modified = now;
    store.save_terminal(&target).await?;
    if let Some(previous_id) = previous.filter(|id| *id != terminal_id) {
        if let Some(mut old) = store.get_terminal(scope, previous_id).await? {
            old.terminal_last_modified = now;
            store.save_terminal(&old).await?;
        }
    }

    tracing::info!(%contract_id, %terminal_id, "contract reassigned");
    Ok(contract)
}

pub async fn get_contract(
    ctx: &AppContext,
    scope: &Scope,
    contract_id: Uuid,
) -> Result<Contract, AppError> {
    load_contract(ctx, scope, contract_id).await
}

pub async fn list_contracts(
    ctx: &AppContext,
    scope: &Scope,
    filter: &ContractFilter,
    page: PageRequest,
) -> Result<(Vec<Contract>, i64), AppError> {
    ctx.store.list_contracts(scope, filter, page).await
}

pub async fn list_contracts_by_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    filter: &ContractFilter,
    page: PageRequest,
) -> Result<(Vec<Contract>, i64), AppError> {
    rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    let filter = ContractFilter {
        account_id: Some(account_id),
        ..filter.clone()
    };
    ctx.store.list_contracts(scope, &filter, page).await
}

pub async fn list_contracts_by_terminal(
    ctx: &AppContext,
    scope: &Scope,
    terminal_id: Uuid,
    filter: &ContractFilter,
    page: PageRequest,
) -> Result<(Vec<Contract>, i64), AppError> {
    ctx.store
        .get_terminal(scope, terminal_id)
        .await?
        .ok_or(AppError::NotFound("terminal"))?;
    let filter = ContractFilter {
        terminal_id: Some(terminal_id),
        ..filter.clone()
    };
    ctx.store.list_contracts(scope, &filter, page).await
}
