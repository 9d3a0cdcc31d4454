//! In-memory `Store` used by the test suite and for running the service
//! without a database.
//!
//! It mirrors the PostgreSQL adapter's observable behaviour, including the
//! partial unique indexes (one live account per SIRET per tenant, one live
//! contract per type per terminal, one membership per user/account pair).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AccountBundle, Store};
use crate::error::AppError;
use crate::models::{
    account::{Account, AccountFilter},
    api_key::ApiKey,
    billing_address::BillingAddress,
    contract::{Contract, ContractFilter, ContractType},
    pagination::PageRequest,
    partner::Partner,
    scope::Scope,
    terminal::{Terminal, TerminalFilter},
    transaction::{Transaction, TransactionFilter, TransactionStatus},
    user::{Membership, User, UserFilter},
};

#[derive(Default)]
struct Tables {
    api_keys: Vec<ApiKey>,
    accounts: HashMap<Uuid, Account>,
    billing_addresses: HashMap<Uuid, BillingAddress>,
    terminals: HashMap<Uuid, Terminal>,
    users: HashMap<Uuid, User>,
    memberships: Vec<Membership>,
    contracts: HashMap<Uuid, Contract>,
    transactions: HashMap<Uuid, Transaction>,
    partners: HashMap<Uuid, Partner>,
    fail_contract_writes: bool,
}

impl Tables {
    fn live_contract_conflict(&self, contract: &Contract) -> bool {
        let common = contract.common();
        let Some(terminal_id) = common.terminal_id else {
            return false;
        };
        if common.contract_deleted_at.is_some() {
            return false;
        }
        self.contracts.values().any(|other| {
            other.id() != contract.id()
                && !other.is_deleted()
                && other.contract_type() == contract.contract_type()
                && other.common().terminal_id == Some(terminal_id)
        })
    }

    fn check_contract_write(&self, contract: &Contract) -> Result<(), AppError> {
        if self.fail_contract_writes {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        if self.live_contract_conflict(contract) {
            return Err(AppError::constraint(
                "Terminal already has a contract of this type",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an API key (the production schema is seeded out of band).
    pub fn insert_api_key(&self, key: ApiKey) {
        self.tables().api_keys.push(key);
    }

    /// Make every contract insert and update fail with a database error.
    pub fn fail_contract_writes(&self, fail: bool) {
        self.tables().fail_contract_writes = fail;
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

fn search_matches(needle: Option<&str>, fields: &[Option<&str>]) -> bool {
    match needle.map(str::trim).filter(|s| !s.is_empty()) {
        None => true,
        Some(needle) => {
            let needle = needle.to_lowercase();
            fields.iter().any(|f| contains_ci(*f, &needle))
        }
    }
}

/// Exclusive window check; a missing value never matches a bound.
fn in_window(
    value: Option<DateTime<Utc>>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> bool {
    let after_ok = after.is_none_or(|a| value.is_some_and(|v| v > a));
    let before_ok = before.is_none_or(|b| value.is_some_and(|v| v < b));
    after_ok && before_ok
}

fn eq_if<T: PartialEq>(wanted: Option<T>, actual: T) -> bool {
    wanted.is_none_or(|w| w == actual)
}

/// Sort newest first and cut out one page.
fn paginate<T: Clone, K: Ord>(
    mut rows: Vec<T>,
    key: impl Fn(&T) -> K,
    page: PageRequest,
) -> (Vec<T>, i64) {
    let total = rows.len() as i64;
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    (rows.into_iter().skip(offset).take(limit).collect(), total)
}

fn account_matches(a: &Account, f: &AccountFilter) -> bool {
    search_matches(
        f.search.as_deref(),
        &[
            Some(&a.account_name),
            Some(&a.account_national_id),
            a.account_notification_email.as_deref(),
        ],
    ) && eq_if(f.account_id, a.account_id)
        && f.partner_id.is_none_or(|p| a.partner_id == Some(p))
        && eq_if(f.is_active, a.account_is_active)
        && eq_if(f.account_type, a.account_type)
        && eq_if(f.is_deleted, a.is_deleted())
        && in_window(Some(a.account_created_at), f.created_after, f.created_before)
        && in_window(
            Some(a.account_last_modified),
            f.last_modified_after,
            f.last_modified_before,
        )
        && in_window(a.account_deletion_date, f.deleted_after, f.deleted_before)
}

fn terminal_matches(t: &Terminal, f: &TerminalFilter) -> bool {
    search_matches(
        f.search.as_deref(),
        &[Some(&t.terminal_label), Some(&t.terminal_subscription_id)],
    ) && eq_if(f.account_id, t.account_id)
        && eq_if(f.terminal_subscription_type, t.terminal_subscription_type)
        && in_window(Some(t.terminal_created_at), f.created_after, f.created_before)
        && in_window(
            Some(t.terminal_last_modified),
            f.last_modified_after,
            f.last_modified_before,
        )
}

fn contract_matches(c: &Contract, f: &ContractFilter) -> bool {
    let common = c.common();
    let alias = match c {
        Contract::Ribpay(r) => Some(r.contract_alias_id.as_str()),
        Contract::Vads(_) => None,
    };
    search_matches(
        f.search.as_deref(),
        &[
            Some(c.contract_type().as_str()),
            Some(&common.contract_number),
            Some(&common.contract_beneficiary_name),
            Some(&common.contract_merchant_id),
            alias,
        ],
    ) && eq_if(f.contract_type, c.contract_type())
        && eq_if(f.account_id, common.account_id)
        && f.terminal_id.is_none_or(|t| common.terminal_id == Some(t))
        && eq_if(f.is_deleted, c.is_deleted())
        && in_window(Some(common.contract_created_at), f.created_after, f.created_before)
        && in_window(
            Some(common.contract_last_modified),
            f.last_modified_after,
            f.last_modified_before,
        )
}

fn transaction_matches(t: &Transaction, f: &TransactionFilter) -> bool {
    search_matches(
        f.search.as_deref(),
        &[
            Some(&t.transaction_label),
            Some(&t.transaction_beneficiary),
            t.transaction_id_oxlin.as_deref(),
        ],
    ) && eq_if(f.transaction_status, t.transaction_status)
        && eq_if(f.instant_payment, t.transaction_instant_payment)
        && f.amount_min.is_none_or(|m| t.transaction_amount_cents >= m)
        && f.amount_max.is_none_or(|m| t.transaction_amount_cents <= m)
        && eq_if(f.account_id, t.account_id)
        && eq_if(f.terminal_id, t.terminal_id)
        && f.contract_id.is_none_or(|c| t.contract_id == Some(c))
        && in_window(Some(t.transaction_initiated), f.initiated_after, f.initiated_before)
        && in_window(
            Some(t.transaction_last_modified),
            f.last_modified_after,
            f.last_modified_before,
        )
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        Ok(self
            .tables()
            .api_keys
            .iter()
            .find(|k| k.key_hash == key_hash && k.is_active)
            .cloned())
    }

    async fn create_account_bundle(&self, bundle: &AccountBundle) -> Result<(), AppError> {
        let mut t = self.tables();
        let account = &bundle.account;
        let duplicate = t.accounts.values().any(|a| {
            !a.is_deleted()
                && a.creator_id == account.creator_id
                && a.account_national_id == account.account_national_id
        });
        if duplicate {
            return Err(AppError::constraint("Account already exists"));
        }

        t.accounts.insert(account.account_id, account.clone());
        t.billing_addresses.insert(
            bundle.billing_address.billing_address_id,
            bundle.billing_address.clone(),
        );
        t.terminals
            .insert(bundle.terminal.terminal_id, bundle.terminal.clone());
        t.users.insert(bundle.user.user_id, bundle.user.clone());
        t.memberships.push(bundle.membership.clone());
        Ok(())
    }

    async fn get_account(
        &self,
        scope: &Scope,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        Ok(self
            .tables()
            .accounts
            .get(&account_id)
            .filter(|a| scope.permits(&a.creator_id))
            .cloned())
    }

    async fn find_live_account_by_national_id(
        &self,
        creator_id: &str,
        national_id: &str,
    ) -> Result<Option<Account>, AppError> {
        Ok(self
            .tables()
            .accounts
            .values()
            .find(|a| {
                a.creator_id == creator_id
                    && a.account_national_id == national_id
                    && !a.is_deleted()
            })
            .cloned())
    }

    async fn list_accounts(
        &self,
        scope: &Scope,
        filter: &AccountFilter,
        page: PageRequest,
    ) -> Result<(Vec<Account>, i64), AppError> {
        let rows = self
            .tables()
            .accounts
            .values()
            .filter(|a| scope.permits(&a.creator_id) && account_matches(a, filter))
            .cloned()
            .collect();
        Ok(paginate(rows, |a: &Account| a.account_created_at, page))
    }

    async fn save_account(&self, account: &Account) -> Result<(), AppError> {
        let mut t = self.tables();
        match t.accounts.get_mut(&account.account_id) {
            Some(stored) if stored.account_deletion_date.is_none() => {
                *stored = account.clone();
                Ok(())
            }
            _ => Err(AppError::invalid_state("account is deleted")),
        }
    }

    async fn get_billing_address(
        &self,
        scope: &Scope,
        billing_address_id: Uuid,
    ) -> Result<Option<BillingAddress>, AppError> {
        Ok(self
            .tables()
            .billing_addresses
            .get(&billing_address_id)
            .filter(|b| scope.permits(&b.creator_id))
            .cloned())
    }

    async fn list_billing_addresses(
        &self,
        scope: &Scope,
        account_id: Uuid,
    ) -> Result<Vec<BillingAddress>, AppError> {
        Ok(self
            .tables()
            .billing_addresses
            .values()
            .filter(|b| b.account_id == account_id && scope.permits(&b.creator_id))
            .cloned()
            .collect())
    }

    async fn insert_terminal(&self, terminal: &Terminal) -> Result<(), AppError> {
        self.tables()
            .terminals
            .insert(terminal.terminal_id, terminal.clone());
        Ok(())
    }

    async fn get_terminal(
        &self,
        scope: &Scope,
        terminal_id: Uuid,
    ) -> Result<Option<Terminal>, AppError> {
        Ok(self
            .tables()
            .terminals
            .get(&terminal_id)
            .filter(|t| scope.permits(&t.creator_id))
            .cloned())
    }

    async fn list_terminals(
        &self,
        scope: &Scope,
        filter: &TerminalFilter,
        page: PageRequest,
    ) -> Result<(Vec<Terminal>, i64), AppError> {
        let rows = self
            .tables()
            .terminals
            .values()
            .filter(|t| scope.permits(&t.creator_id) && terminal_matches(t, filter))
            .cloned()
            .collect();
        Ok(paginate(rows, |t: &Terminal| t.terminal_created_at, page))
    }

    async fn save_terminal(&self, terminal: &Terminal) -> Result<(), AppError> {
        self.tables()
            .terminals
            .insert(terminal.terminal_id, terminal.clone());
        Ok(())
    }

    async fn delete_terminal(&self, terminal_id: Uuid) -> Result<(), AppError> {
        let mut t = self.tables();
        t.terminals.remove(&terminal_id);
        for contract in t.contracts.values_mut() {
            let common = contract.common_mut();
            if common.terminal_id == Some(terminal_id) {
                common.terminal_id = None;
            }
        }
        Ok(())
    }

    async fn insert_user(&self, user: &User, membership: &Membership) -> Result<(), AppError> {
        let mut t = self.tables();
        t.users.insert(user.user_id, user.clone());
        t.memberships.push(membership.clone());
        Ok(())
    }

    async fn get_user(&self, scope: &Scope, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self
            .tables()
            .users
            .get(&user_id)
            .filter(|u| scope.permits(&u.creator_id))
            .cloned())
    }

    async fn list_users(
        &self,
        scope: &Scope,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64), AppError> {
        let t = self.tables();
        let rows = t
            .users
            .values()
            .filter(|u| {
                scope.permits(&u.creator_id)
                    && search_matches(
                        filter.search.as_deref(),
                        &[
                            u.user_first_name.as_deref(),
                            u.user_last_name.as_deref(),
                            u.user_email.as_deref(),
                            u.user_phone.as_deref(),
                        ],
                    )
                    && filter.account_id.is_none_or(|account_id| {
                        t.memberships
                            .iter()
                            .any(|m| m.user_id == u.user_id && m.account_id == account_id)
                    })
                    && in_window(
                        Some(u.user_last_modified),
                        filter.last_modified_after,
                        filter.last_modified_before,
                    )
            })
            .cloned()
            .collect();
        Ok(paginate(rows, |u: &User| u.user_last_modified, page))
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        self.tables().users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut t = self.tables();
        t.users.remove(&user_id);
        t.memberships.retain(|m| m.user_id != user_id);
        Ok(())
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>, AppError> {
        Ok(self
            .tables()
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn memberships_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Membership>, AppError> {
        Ok(self
            .tables()
            .memberships
            .iter()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), AppError> {
        let mut t = self.tables();
        let exists = t
            .memberships
            .iter()
            .any(|m| m.user_id == membership.user_id && m.account_id == membership.account_id);
        if exists {
            return Err(AppError::constraint("User is already linked to this account"));
        }
        t.memberships.push(membership.clone());
        Ok(())
    }

    async fn delete_membership(&self, user_id: Uuid, account_id: Uuid) -> Result<bool, AppError> {
        let mut t = self.tables();
        let before = t.memberships.len();
        t.memberships
            .retain(|m| !(m.user_id == user_id && m.account_id == account_id));
        Ok(t.memberships.len() < before)
    }

    async fn insert_contract(&self, contract: &Contract) -> Result<(), AppError> {
        let mut t = self.tables();
        t.check_contract_write(contract)?;
        t.contracts.insert(contract.id(), contract.clone());
        Ok(())
    }

    async fn get_contract(
        &self,
        scope: &Scope,
        contract_id: Uuid,
    ) -> Result<Option<Contract>, AppError> {
        Ok(self
            .tables()
            .contracts
            .get(&contract_id)
            .filter(|c| scope.permits(&c.common().creator_id))
            .cloned())
    }

    async fn list_contracts(
        &self,
        scope: &Scope,
        filter: &ContractFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contract>, i64), AppError> {
        let rows = self
            .tables()
            .contracts
            .values()
            .filter(|c| scope.permits(&c.common().creator_id) && contract_matches(c, filter))
            .cloned()
            .collect();
        Ok(paginate(
            rows,
            |c: &Contract| c.common().contract_created_at,
            page,
        ))
    }

    async fn save_contract(&self, contract: &Contract) -> Result<(), AppError> {
        let mut t = self.tables();
        t.check_contract_write(contract)?;
        let Some(stored) = t.contracts.get_mut(&contract.id()).filter(|c| !c.is_deleted()) else {
            return Err(AppError::invalid_state("contract is already deleted"));
        };
        let mut next = contract.clone();
        if let (Contract::Vads(incoming), Contract::Vads(current)) = (&mut next, &*stored) {
            incoming.contract_is_active = current.contract_is_active;
        }
        *stored = next;
        Ok(())
    }

    async fn activate_vads_contract(
        &self,
        contract_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut t = self.tables();
        match t.contracts.get_mut(&contract_id) {
            Some(Contract::Vads(vads))
                if !vads.contract_is_active && vads.common.contract_deleted_at.is_none() =>
            {
                vads.contract_is_active = true;
                vads.common.contract_last_modified = at;
                Ok(())
            }
            _ => Err(AppError::invalid_state(
                "contract is already active or deleted",
            )),
        }
    }

    async fn live_contract_on_terminal(
        &self,
        terminal_id: Uuid,
        contract_type: ContractType,
    ) -> Result<Option<Uuid>, AppError> {
        Ok(self
            .tables()
            .contracts
            .values()
            .find(|c| {
                !c.is_deleted()
                    && c.contract_type() == contract_type
                    && c.common().terminal_id == Some(terminal_id)
            })
            .map(Contract::id))
    }

    async fn pending_vads_contracts(&self) -> Result<Vec<Contract>, AppError> {
        let mut pending: Vec<Contract> = self
            .tables()
            .contracts
            .values()
            .filter(|c| matches!(c, Contract::Vads(v) if !v.contract_is_active) && !c.is_deleted())
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.common().contract_created_at);
        Ok(pending)
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), AppError> {
        self.tables()
            .transactions
            .insert(transaction.transaction_id, transaction.clone());
        Ok(())
    }

    async fn get_transaction(
        &self,
        scope: &Scope,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .tables()
            .transactions
            .get(&transaction_id)
            .filter(|t| scope.permits(&t.creator_id))
            .cloned())
    }

    async fn list_transactions(
        &self,
        scope: &Scope,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let rows = self
            .tables()
            .transactions
            .values()
            .filter(|t| scope.permits(&t.creator_id) && transaction_matches(t, filter))
            .cloned()
            .collect();
        Ok(paginate(rows, |t: &Transaction| t.transaction_initiated, page))
    }

    async fn save_transaction(&self, transaction: &Transaction) -> Result<(), AppError> {
        let mut t = self.tables();
        match t.transactions.get_mut(&transaction.transaction_id) {
            Some(stored)
                if stored.transaction_status == TransactionStatus::New
                    && (stored.transaction_id_oxlin.is_none()
                        || stored.transaction_id_oxlin == transaction.transaction_id_oxlin) =>
            {
                *stored = transaction.clone();
                Ok(())
            }
            _ => Err(AppError::invalid_state(
                "transaction is no longer NEW or has another payment order",
            )),
        }
    }

    async fn get_partner(
        &self,
        scope: &Scope,
        partner_id: Uuid,
    ) -> Result<Option<Partner>, AppError> {
        Ok(self
            .tables()
            .partners
            .get(&partner_id)
            .filter(|p| scope.permits(&p.creator_id))
            .cloned())
    }

    async fn save_partner(&self, partner: &Partner) -> Result<(), AppError> {
        self.tables()
            .partners
            .insert(partner.partner_id, partner.clone());
        Ok(())
    }
}
