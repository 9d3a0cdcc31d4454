//! Datastore port.
//!
//! Services reach persistence only through the `Store` trait. Two adapters
//! implement it: `postgres::PgStore` for production and
//! `memory::MemoryStore` for tests and local experiments.
//!
//! # Scoping
//!
//! Read methods take a `Scope`. Under `Scope::Tenant` rows created by other
//! tenants are invisible, which callers report as `NotFound`. Write methods
//! operate on rows that were already loaded through a scoped read.
//!
//! # Errors
//!
//! Unique-index violations surface as `AppError::ConstraintViolation`.
//! Lifecycle writes are conditional on the state they transition from; a
//! row that moved on since it was loaded yields `AppError::InvalidState`.
//! Everything else is `AppError::Database`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

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
    transaction::{Transaction, TransactionFilter},
    user::{Membership, User, UserFilter},
};

/// Rows written together when an account is created.
#[derive(Debug, Clone)]
pub struct AccountBundle {
    pub account: Account,
    pub billing_address: BillingAddress,
    pub terminal: Terminal,
    pub user: User,
    pub membership: Membership,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Cheap reachability check for the health endpoint.
    async fn ping(&self) -> Result<(), AppError>;

    /// Active API key with this SHA-256 hash.
    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError>;

    // Accounts

    /// Insert an account and its billing address, first terminal, admin
    /// user and admin membership atomically.
    async fn create_account_bundle(&self, bundle: &AccountBundle) -> Result<(), AppError>;

    async fn get_account(&self, scope: &Scope, account_id: Uuid)
    -> Result<Option<Account>, AppError>;

    /// Non-deleted account with this SIRET in the tenant.
    async fn find_live_account_by_national_id(
        &self,
        creator_id: &str,
        national_id: &str,
    ) -> Result<Option<Account>, AppError>;

    async fn list_accounts(
        &self,
        scope: &Scope,
        filter: &AccountFilter,
        page: PageRequest,
    ) -> Result<(Vec<Account>, i64), AppError>;

    /// Writes only while the stored account is not deleted; a deleted row
    /// fails with `InvalidState` and is left untouched.
    async fn save_account(&self, account: &Account) -> Result<(), AppError>;

    // Billing addresses

    async fn get_billing_address(
        &self,
        scope: &Scope,
        billing_address_id: Uuid,
    ) -> Result<Option<BillingAddress>, AppError>;

    async fn list_billing_addresses(
        &self,
        scope: &Scope,
        account_id: Uuid,
    ) -> Result<Vec<BillingAddress>, AppError>;

    // Terminals

    async fn insert_terminal(&self, terminal: &Terminal) -> Result<(), AppError>;

    async fn get_terminal(&self, scope: &Scope, terminal_id: Uuid)
    -> Result<Option<Terminal>, AppError>;

    async fn list_terminals(
        &self,
        scope: &Scope,
        filter: &TerminalFilter,
        page: PageRequest,
    ) -> Result<(Vec<Terminal>, i64), AppError>;

    async fn save_terminal(&self, terminal: &Terminal) -> Result<(), AppError>;

    /// Hard delete. Contracts pointing at the terminal are detached.
    async fn delete_terminal(&self, terminal_id: Uuid) -> Result<(), AppError>;

    // Users and memberships

    async fn insert_user(&self, user: &User, membership: &Membership) -> Result<(), AppError>;

    async fn get_user(&self, scope: &Scope, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn list_users(
        &self,
        scope: &Scope,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64), AppError>;

    async fn save_user(&self, user: &User) -> Result<(), AppError>;

    /// Hard delete. Memberships go with the user.
    async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError>;

    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>, AppError>;

    async fn memberships_for_account(&self, account_id: Uuid)
    -> Result<Vec<Membership>, AppError>;

    /// Fails with `ConstraintViolation` if the pair already exists.
    async fn insert_membership(&self, membership: &Membership) -> Result<(), AppError>;

    /// Returns whether a membership was removed.
    async fn delete_membership(&self, user_id: Uuid, account_id: Uuid) -> Result<bool, AppError>;

    // Contracts

    /// Fails with `ConstraintViolation` if the terminal already has a live
    /// contract of the same type.
    async fn insert_contract(&self, contract: &Contract) -> Result<(), AppError>;

    async fn get_contract(&self, scope: &Scope, contract_id: Uuid)
    -> Result<Option<Contract>, AppError>;

    async fn list_contracts(
        &self,
        scope: &Scope,
        filter: &ContractFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contract>, i64), AppError>;

    /// Same uniqueness rule as `insert_contract`. Writes only while the
    /// stored contract is not deleted, and never touches the VADS activity
    /// flag (see `activate_vads_contract`).
    async fn save_contract(&self, contract: &Contract) -> Result<(), AppError>;

    /// Flip a pending VADS contract to active. Fails with `InvalidState`
    /// unless the stored row is a VADS contract that is neither active nor
    /// deleted, so of two racing activations exactly one succeeds.
    async fn activate_vads_contract(
        &self,
        contract_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Id of the live (non-deleted) contract of `contract_type` on the
    /// terminal, if any.
    async fn live_contract_on_terminal(
        &self,
        terminal_id: Uuid,
        contract_type: ContractType,
    ) -> Result<Option<Uuid>, AppError>;

    /// Every non-deleted, inactive VADS contract across all tenants,
    /// oldest first.
    async fn pending_vads_contracts(&self) -> Result<Vec<Contract>, AppError>;

    // Transactions

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), AppError>;

    async fn get_transaction(
        &self,
        scope: &Scope,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError>;

    async fn list_transactions(
        &self,
        scope: &Scope,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, i64), AppError>;

    /// Writes only while the stored transaction is `NEW` and its payment
    /// order id is unset or unchanged; otherwise `InvalidState`.
    async fn save_transaction(&self, transaction: &Transaction) -> Result<(), AppError>;

    // Partners

    async fn get_partner(&self, scope: &Scope, partner_id: Uuid)
    -> Result<Option<Partner>, AppError>;

    /// Insert or replace.
    async fn save_partner(&self, partner: &Partner) -> Result<(), AppError>;
}
