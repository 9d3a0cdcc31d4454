//! PostgreSQL implementation of the `Store` port.
//!
//! Static lookups use `query_as::<_, T>` with an optional tenant predicate
//! written as `($n::TEXT IS NULL OR creator_id = $n)`. List endpoints build
//! their filters with `QueryBuilder`; the page and the total count run
//! concurrently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AccountBundle, Store};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{
    DecodeError,
    account::{Account, AccountFilter},
    api_key::ApiKey,
    billing_address::BillingAddress,
    contract::{Contract, ContractFilter, ContractRow, ContractType},
    pagination::PageRequest,
    partner::Partner,
    scope::Scope,
    terminal::{Terminal, TerminalFilter},
    transaction::{Transaction, TransactionFilter, TransactionStatus},
    user::{Membership, User, UserFilter},
};

const LIVE_CONTRACT_CONFLICT: &str = "Terminal already has a contract of this type";

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Turn a unique-index violation into a domain conflict.
fn unique_as_conflict(err: sqlx::Error, message: &str) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AppError::constraint(message);
        }
    }
    AppError::Database(err)
}

/// A guarded write that matched nothing: the row left the state it was
/// loaded in.
fn ensure_applied(
    result: sqlx::postgres::PgQueryResult,
    message: &'static str,
) -> Result<(), AppError> {
    if result.rows_affected() == 0 {
        return Err(AppError::invalid_state(message));
    }
    Ok(())
}

fn decode_failure(err: DecodeError) -> AppError {
    AppError::Database(sqlx::Error::Decode(Box::new(err)))
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// `WHERE` prefix shared by every filtered query. Later predicates are
/// appended with ` AND ...`.
fn scoped<'a>(select: &str, scope: &Scope) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" WHERE 1 = 1");
    if let Some(creator_id) = scope.creator_filter() {
        qb.push(" AND creator_id = ").push_bind(creator_id.to_string());
    }
    qb
}

fn push_window(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) {
    if let Some(after) = after {
        qb.push(format!(" AND {column} > ")).push_bind(after);
    }
    if let Some(before) = before {
        qb.push(format!(" AND {column} < ")).push_bind(before);
    }
}

/// `AND (a ILIKE $p OR b ILIKE $p ...)`
fn push_search(qb: &mut QueryBuilder<'_, Postgres>, columns: &[&str], search: Option<&str>) {
    let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) else {
        return;
    };
    let pattern = like_pattern(search);
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(format!("{column} ILIKE ")).push_bind(pattern.clone());
    }
    qb.push(")");
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, order_by: &str, page: PageRequest) {
    qb.push(format!(" ORDER BY {order_by} DESC LIMIT "))
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
}

fn account_query<'a>(select: &str, scope: &Scope, f: &AccountFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb = scoped(select, scope);
    push_search(
        &mut qb,
        &["account_name", "account_national_id", "account_notification_email"],
        f.search.as_deref(),
    );
    if let Some(id) = f.account_id {
        qb.push(" AND account_id = ").push_bind(id);
    }
    if let Some(id) = f.partner_id {
        qb.push(" AND partner_id = ").push_bind(id);
    }
    if let Some(active) = f.is_active {
        qb.push(" AND account_is_active = ").push_bind(active);
    }
    if let Some(kind) = f.account_type {
        qb.push(" AND account_type = ").push_bind(kind.as_str());
    }
    match f.is_deleted {
        Some(true) => {
            qb.push(" AND account_deletion_date IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND account_deletion_date IS NULL");
        }
        None => {}
    }
    push_window(&mut qb, "account_created_at", f.created_after, f.created_before);
    push_window(&mut qb, "account_last_modified", f.last_modified_after, f.last_modified_before);
    push_window(&mut qb, "account_deletion_date", f.deleted_after, f.deleted_before);
    qb
}

fn terminal_query<'a>(select: &str, scope: &Scope, f: &TerminalFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb = scoped(select, scope);
    push_search(&mut qb, &["terminal_label", "terminal_subscription_id"], f.search.as_deref());
    if let Some(id) = f.account_id {
        qb.push(" AND account_id = ").push_bind(id);
    }
    if let Some(plan) = f.terminal_subscription_type {
        qb.push(" AND terminal_subscription_type = ").push_bind(plan.as_str());
    }
    push_window(&mut qb, "terminal_created_at", f.created_after, f.created_before);
    push_window(&mut qb, "terminal_last_modified", f.last_modified_after, f.last_modified_before);
    qb
}

fn user_query<'a>(select: &str, scope: &Scope, f: &UserFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb = scoped(select, scope);
    push_search(
        &mut qb,
        &["user_first_name", "user_last_name", "user_email", "user_phone"],
        f.search.as_deref(),
    );
    if let Some(account_id) = f.account_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM user_has_accounts m \
             WHERE m.user_id = users.user_id AND m.account_id = ",
        )
        .push_bind(account_id)
        .push(")");
    }
    push_window(&mut qb, "user_last_modified", f.last_modified_after, f.last_modified_before);
    qb
}

fn contract_query<'a>(select: &str, scope: &Scope, f: &ContractFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb = scoped(select, scope);
    push_search(
        &mut qb,
        &[
            "contract_type",
            "contract_number",
            "contract_beneficiary_name",
            "contract_merchant_id",
            "contract_alias_id",
        ],
        f.search.as_deref(),
    );
    if let Some(kind) = f.contract_type {
        qb.push(" AND contract_type = ").push_bind(kind.as_str());
    }
    if let Some(id) = f.account_id {
        qb.push(" AND account_id = ").push_bind(id);
    }
    if let Some(id) = f.terminal_id {
        qb.push(" AND terminal_id = ").push_bind(id);
    }
    match f.is_deleted {
        Some(true) => {
            qb.push(" AND contract_deleted_at IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND contract_deleted_at IS NULL");
        }
        None => {}
    }
    push_window(&mut qb, "contract_created_at", f.created_after, f.created_before);
    push_window(&mut qb, "contract_last_modified", f.last_modified_after, f.last_modified_before);
    qb
}

fn transaction_query<'a>(
    select: &str,
    scope: &Scope,
    f: &TransactionFilter,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = scoped(select, scope);
    push_search(
        &mut qb,
        &["transaction_label", "transaction_beneficiary", "transaction_id_oxlin"],
        f.search.as_deref(),
    );
    if let Some(status) = f.transaction_status {
        qb.push(" AND transaction_status = ").push_bind(status.as_str());
    }
    if let Some(instant) = f.instant_payment {
        qb.push(" AND transaction_instant_payment = ").push_bind(instant);
    }
    if let Some(min) = f.amount_min {
        qb.push(" AND transaction_amount_cents >= ").push_bind(min);
    }
    if let Some(max) = f.amount_max {
        qb.push(" AND transaction_amount_cents <= ").push_bind(max);
    }
    if let Some(id) = f.account_id {
        qb.push(" AND account_id = ").push_bind(id);
    }
    if let Some(id) = f.terminal_id {
        qb.push(" AND terminal_id = ").push_bind(id);
    }
    if let Some(id) = f.contract_id {
        qb.push(" AND contract_id = ").push_bind(id);
    }
    push_window(&mut qb, "transaction_initiated", f.initiated_after, f.initiated_before);
    push_window(
        &mut qb,
        "transaction_last_modified",
        f.last_modified_after,
        f.last_modified_before,
    );
    qb
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        crate::db::ping(&self.pool).await?;
        Ok(())
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT id, key_hash, creator_id, is_admin, is_active, created_at
             FROM api_keys
             WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }

    async fn create_account_bundle(&self, bundle: &AccountBundle) -> Result<(), AppError> {
        let AccountBundle {
            account: a,
            billing_address: b,
            terminal,
            user,
            membership,
        } = bundle;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                account_id, account_national_id, account_name, account_type,
                account_currency, account_notification_email, account_is_active,
                account_created_at, account_last_modified, account_deletion_date,
                account_creation_url, account_blob_storage_url, creator_id, partner_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(a.account_id)
        .bind(&a.account_national_id)
        .bind(&a.account_name)
        .bind(a.account_type.as_str())
        .bind(&a.account_currency)
        .bind(&a.account_notification_email)
        .bind(a.account_is_active)
        .bind(a.account_created_at)
        .bind(a.account_last_modified)
        .bind(a.account_deletion_date)
        .bind(&a.account_creation_url)
        .bind(&a.account_blob_storage_url)
        .bind(&a.creator_id)
        .bind(a.partner_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_as_conflict(e, "Account already exists"))?;

        sqlx::query(
            r#"
            INSERT INTO billing_addresses (
                billing_address_id, billing_address, billing_address_complement_localisation,
                billing_address_numero_voie, billing_address_indice_repetition,
                billing_address_type_voie, billing_address_libelle_voie,
                billing_address_distribution_speciale, billing_address_code_postal,
                billing_address_libelle_commune, billing_address_pays,
                billing_address_code_pays, account_id, creator_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(b.billing_address_id)
        .bind(&b.billing_address)
        .bind(&b.billing_address_complement_localisation)
        .bind(&b.billing_address_numero_voie)
        .bind(&b.billing_address_indice_repetition)
        .bind(&b.billing_address_type_voie)
        .bind(&b.billing_address_libelle_voie)
        .bind(&b.billing_address_distribution_speciale)
        .bind(&b.billing_address_code_postal)
        .bind(&b.billing_address_libelle_commune)
        .bind(&b.billing_address_pays)
        .bind(&b.billing_address_code_pays)
        .bind(b.account_id)
        .bind(&b.creator_id)
        .execute(&mut *tx)
        .await?;

        insert_terminal_row(&mut *tx, terminal).await?;
        insert_user_row(&mut *tx, user).await?;
        insert_membership_row(&mut *tx, membership).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_account(
        &self,
        scope: &Scope,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts
             WHERE account_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(account_id)
        .bind(scope.creator_filter())
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn find_live_account_by_national_id(
        &self,
        creator_id: &str,
        national_id: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts
             WHERE creator_id = $1 AND account_national_id = $2
               AND account_deletion_date IS NULL",
        )
        .bind(creator_id)
        .bind(national_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn list_accounts(
        &self,
        scope: &Scope,
        filter: &AccountFilter,
        page: PageRequest,
    ) -> Result<(Vec<Account>, i64), AppError> {
        let mut list = account_query("SELECT * FROM accounts", scope, filter);
        push_page(&mut list, "account_created_at", page);
        let mut count = account_query("SELECT COUNT(*) FROM accounts", scope, filter);

        let (rows, total) = tokio::try_join!(
            list.build_query_as::<Account>().fetch_all(&self.pool),
            count.build_query_scalar::<i64>().fetch_one(&self.pool),
        )?;
        Ok((rows, total))
    }

    async fn save_account(&self, a: &Account) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET account_notification_email = $2,
                account_is_active = $3,
                account_last_modified = $4,
                account_deletion_date = $5,
                account_creation_url = $6,
                account_blob_storage_url = $7,
                partner_id = $8
            WHERE account_id = $1 AND account_deletion_date IS NULL
            "#,
        )
        .bind(a.account_id)
        .bind(&a.account_notification_email)
        .bind(a.account_is_active)
        .bind(a.account_last_modified)
        .bind(a.account_deletion_date)
        .bind(&a.account_creation_url)
        .bind(&a.account_blob_storage_url)
        .bind(a.partner_id)
        .execute(&self.pool)
        .await?;
        ensure_applied(result, "account is deleted")
    }

    async fn get_billing_address(
        &self,
        scope: &Scope,
        billing_address_id: Uuid,
    ) -> Result<Option<BillingAddress>, AppError> {
        let address = sqlx::query_as::<_, BillingAddress>(
            "SELECT * FROM billing_addresses
             WHERE billing_address_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(billing_address_id)
        .bind(scope.creator_filter())
        .fetch_optional(&self.pool)
        .await?;
        Ok(address)
    }

    async fn list_billing_addresses(
        &self,
        scope: &Scope,
        account_id: Uuid,
    ) -> Result<Vec<BillingAddress>, AppError> {
        let addresses = sqlx::query_as::<_, BillingAddress>(
            "SELECT * FROM billing_addresses
             WHERE account_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(account_id)
        .bind(scope.creator_filter())
        .fetch_all(&self.pool)
        .await?;
        Ok(addresses)
    }

    async fn insert_terminal(&self, terminal: &Terminal) -> Result<(), AppError> {
        insert_terminal_row(&self.pool, terminal).await?;
        Ok(())
    }

    async fn get_terminal(
        &self,
        scope: &Scope,
        terminal_id: Uuid,
    ) -> Result<Option<Terminal>, AppError> {
        let terminal = sqlx::query_as::<_, Terminal>(
            "SELECT * FROM terminals
             WHERE terminal_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(terminal_id)
        .bind(scope.creator_filter())
        .fetch_optional(&self.pool)
        .await?;
        Ok(terminal)
    }

    async fn list_terminals(
        &self,
        scope: &Scope,
        filter: &TerminalFilter,
        page: PageRequest,
    ) -> Result<(Vec<Terminal>, i64), AppError> {
        let mut list = terminal_query("SELECT * FROM terminals", scope, filter);
        push_page(&mut list, "terminal_created_at", page);
        let mut count = terminal_query("SELECT COUNT(*) FROM terminals", scope, filter);

        let (rows, total) = tokio::try_join!(
            list.build_query_as::<Terminal>().fetch_all(&self.pool),
            count.build_query_scalar::<i64>().fetch_one(&self.pool),
        )?;
        Ok((rows, total))
    }

    async fn save_terminal(&self, t: &Terminal) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE terminals
            SET terminal_label = $2,
                terminal_favorite_contract_type = $3,
                terminal_subscription_id = $4,
                terminal_subscription_type = $5,
                terminal_last_modified = $6
            WHERE terminal_id = $1
            "#,
        )
        .bind(t.terminal_id)
        .bind(&t.terminal_label)
        .bind(t.terminal_favorite_contract_type.as_str())
        .bind(&t.terminal_subscription_id)
        .bind(t.terminal_subscription_type.as_str())
        .bind(t.terminal_last_modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_terminal(&self, terminal_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM terminals WHERE terminal_id = $1")
            .bind(terminal_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_user(&self, user: &User, membership: &Membership) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        insert_user_row(&mut *tx, user).await?;
        insert_membership_row(&mut *tx, membership).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_user(&self, scope: &Scope, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(user_id)
        .bind(scope.creator_filter())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(
        &self,
        scope: &Scope,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64), AppError> {
        let mut list = user_query("SELECT * FROM users", scope, filter);
        push_page(&mut list, "user_last_modified", page);
        let mut count = user_query("SELECT COUNT(*) FROM users", scope, filter);

        let (rows, total) = tokio::try_join!(
            list.build_query_as::<User>().fetch_all(&self.pool),
            count.build_query_scalar::<i64>().fetch_one(&self.pool),
        )?;
        Ok((rows, total))
    }

    async fn save_user(&self, u: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET user_first_name = $2,
                user_last_name = $3,
                user_email = $4,
                user_phone = $5,
                user_birth_date = $6,
                user_birth_city = $7,
                user_birth_country = $8,
                user_last_modified = $9
            WHERE user_id = $1
            "#,
        )
        .bind(u.user_id)
        .bind(&u.user_first_name)
        .bind(&u.user_last_name)
        .bind(&u.user_email)
        .bind(&u.user_phone)
        .bind(&u.user_birth_date)
        .bind(&u.user_birth_city)
        .bind(&u.user_birth_country)
        .bind(u.user_last_modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>, AppError> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT user_id, account_id, user_role FROM user_has_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn memberships_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Membership>, AppError> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT user_id, account_id, user_role FROM user_has_accounts WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), AppError> {
        insert_membership_row(&self.pool, membership).await
    }

    async fn delete_membership(&self, user_id: Uuid, account_id: Uuid) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM user_has_accounts WHERE user_id = $1 AND account_id = $2")
                .bind(user_id)
                .bind(account_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_contract(&self, contract: &Contract) -> Result<(), AppError> {
        let r = contract.to_row();
        sqlx::query(
            r#"
            INSERT INTO contracts (
                contract_id, contract_type, contract_created_at, contract_last_modified,
                contract_deleted_at, contract_number, contract_beneficiary_name,
                contract_merchant_id, contract_alias_id, contract_is_active,
                contract_bank_name, contract_bank_code, contract_3d_secure,
                contract_max_amount, account_id, terminal_id, creator_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(r.contract_id)
        .bind(r.contract_type.as_str())
        .bind(r.contract_created_at)
        .bind(r.contract_last_modified)
        .bind(r.contract_deleted_at)
        .bind(&r.contract_number)
        .bind(&r.contract_beneficiary_name)
        .bind(&r.contract_merchant_id)
        .bind(&r.contract_alias_id)
        .bind(r.contract_is_active)
        .bind(&r.contract_bank_name)
        .bind(&r.contract_bank_code)
        .bind(r.contract_3d_secure)
        .bind(r.contract_max_amount)
        .bind(r.account_id)
        .bind(r.terminal_id)
        .bind(&r.creator_id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_as_conflict(e, LIVE_CONTRACT_CONFLICT))?;
        Ok(())
    }

    async fn get_contract(
        &self,
        scope: &Scope,
        contract_id: Uuid,
    ) -> Result<Option<Contract>, AppError> {
        let row = sqlx::query_as::<_, ContractRow>(
            "SELECT * FROM contracts
             WHERE contract_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(contract_id)
        .bind(scope.creator_filter())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Contract::try_from).transpose().map_err(decode_failure)
    }

    async fn list_contracts(
        &self,
        scope: &Scope,
        filter: &ContractFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contract>, i64), AppError> {
        let mut list = contract_query("SELECT * FROM contracts", scope, filter);
        push_page(&mut list, "contract_created_at", page);
        let mut count = contract_query("SELECT COUNT(*) FROM contracts", scope, filter);

        let (rows, total) = tokio::try_join!(
            list.build_query_as::<ContractRow>().fetch_all(&self.pool),
            count.build_query_scalar::<i64>().fetch_one(&self.pool),
        )?;
        let contracts = rows
            .into_iter()
            .map(Contract::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_failure)?;
        Ok((contracts, total))
    }

    async fn save_contract(&self, contract: &Contract) -> Result<(), AppError> {
        let r = contract.to_row();
        let result = sqlx::query(
            r#"
            UPDATE contracts
            SET contract_last_modified = $2,
                contract_deleted_at = $3,
                terminal_id = $4
            WHERE contract_id = $1 AND contract_deleted_at IS NULL
            "#,
        )
        .bind(r.contract_id)
        .bind(r.contract_last_modified)
        .bind(r.contract_deleted_at)
        .bind(r.terminal_id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_as_conflict(e, LIVE_CONTRACT_CONFLICT))?;
        ensure_applied(result, "contract is already deleted")
    }

    async fn activate_vads_contract(
        &self,
        contract_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contracts
            SET contract_is_active = TRUE,
                contract_last_modified = $2
            WHERE contract_id = $1
              AND contract_type = $3
              AND contract_is_active = FALSE
              AND contract_deleted_at IS NULL
            "#,
        )
        .bind(contract_id)
        .bind(at)
        .bind(ContractType::Vads.as_str())
        .execute(&self.pool)
        .await?;
        ensure_applied(result, "contract is already active or deleted")
    }

    async fn live_contract_on_terminal(
        &self,
        terminal_id: Uuid,
        contract_type: ContractType,
    ) -> Result<Option<Uuid>, AppError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT contract_id FROM contracts
             WHERE terminal_id = $1 AND contract_type = $2 AND contract_deleted_at IS NULL
             LIMIT 1",
        )
        .bind(terminal_id)
        .bind(contract_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn pending_vads_contracts(&self) -> Result<Vec<Contract>, AppError> {
        let rows = sqlx::query_as::<_, ContractRow>(
            "SELECT * FROM contracts
             WHERE contract_type = 'VADS' AND contract_is_active = false
               AND contract_deleted_at IS NULL
             ORDER BY contract_created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(Contract::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_failure)
    }

    async fn insert_transaction(&self, t: &Transaction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                transaction_id, transaction_id_oxlin, transaction_status,
                transaction_instant_payment, transaction_amount_cents,
                transaction_amount_without_vat, transaction_vat, transaction_currency,
                transaction_label, transaction_beneficiary, transaction_auth_url,
                transaction_redirect_url, transaction_notification_url,
                transaction_initiated, transaction_last_modified, transaction_finished,
                transaction_metadata, transaction_type, account_id, terminal_id,
                contract_id, creator_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(t.transaction_id)
        .bind(&t.transaction_id_oxlin)
        .bind(t.transaction_status.as_str())
        .bind(t.transaction_instant_payment)
        .bind(t.transaction_amount_cents)
        .bind(t.transaction_amount_without_vat)
        .bind(t.transaction_vat)
        .bind(&t.transaction_currency)
        .bind(&t.transaction_label)
        .bind(&t.transaction_beneficiary)
        .bind(&t.transaction_auth_url)
        .bind(&t.transaction_redirect_url)
        .bind(&t.transaction_notification_url)
        .bind(t.transaction_initiated)
        .bind(t.transaction_last_modified)
        .bind(t.transaction_finished)
        .bind(&t.transaction_metadata)
        .bind(t.transaction_type.map(|k| k.as_str()))
        .bind(t.account_id)
        .bind(t.terminal_id)
        .bind(t.contract_id)
        .bind(&t.creator_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_transaction(
        &self,
        scope: &Scope,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions
             WHERE transaction_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(transaction_id)
        .bind(scope.creator_filter())
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    async fn list_transactions(
        &self,
        scope: &Scope,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let mut list = transaction_query("SELECT * FROM transactions", scope, filter);
        push_page(&mut list, "transaction_initiated", page);
        let mut count = transaction_query("SELECT COUNT(*) FROM transactions", scope, filter);

        let (rows, total) = tokio::try_join!(
            list.build_query_as::<Transaction>().fetch_all(&self.pool),
            count.build_query_scalar::<i64>().fetch_one(&self.pool),
        )?;
        Ok((rows, total))
    }

    async fn save_transaction(&self, t: &Transaction) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET transaction_id_oxlin = $2,
                transaction_status = $3,
                transaction_auth_url = $4,
                transaction_last_modified = $5,
                transaction_finished = $6
            WHERE transaction_id = $1
              AND transaction_status = $7
              AND (transaction_id_oxlin IS NULL OR transaction_id_oxlin = $2)
            "#,
        )
        .bind(t.transaction_id)
        .bind(&t.transaction_id_oxlin)
        .bind(t.transaction_status.as_str())
        .bind(&t.transaction_auth_url)
        .bind(t.transaction_last_modified)
        .bind(t.transaction_finished)
        .bind(TransactionStatus::New.as_str())
        .execute(&self.pool)
        .await?;
        ensure_applied(result, "transaction is no longer NEW or has another payment order")
    }

    async fn get_partner(
        &self,
        scope: &Scope,
        partner_id: Uuid,
    ) -> Result<Option<Partner>, AppError> {
        let partner = sqlx::query_as::<_, Partner>(
            "SELECT * FROM partners
             WHERE partner_id = $1 AND ($2::TEXT IS NULL OR creator_id = $2)",
        )
        .bind(partner_id)
        .bind(scope.creator_filter())
        .fetch_optional(&self.pool)
        .await?;
        Ok(partner)
    }

    async fn save_partner(&self, p: &Partner) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO partners (partner_id, partner_name, notification_url, webhook_secret, creator_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (partner_id) DO UPDATE
            SET partner_name = EXCLUDED.partner_name,
                notification_url = EXCLUDED.notification_url,
                webhook_secret = EXCLUDED.webhook_secret
            "#,
        )
        .bind(p.partner_id)
        .bind(&p.partner_name)
        .bind(&p.notification_url)
        .bind(&p.webhook_secret)
        .bind(&p.creator_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_terminal_row<'e, E>(executor: E, t: &Terminal) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO terminals (
            terminal_id, terminal_label, terminal_favorite_contract_type,
            terminal_subscription_id, terminal_subscription_type,
            terminal_created_at, terminal_last_modified, account_id, creator_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(t.terminal_id)
    .bind(&t.terminal_label)
    .bind(t.terminal_favorite_contract_type.as_str())
    .bind(&t.terminal_subscription_id)
    .bind(t.terminal_subscription_type.as_str())
    .bind(t.terminal_created_at)
    .bind(t.terminal_last_modified)
    .bind(t.account_id)
    .bind(&t.creator_id)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_user_row<'e, E>(executor: E, u: &User) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO users (
            user_id, user_first_name, user_last_name, user_email, user_phone,
            user_birth_date, user_birth_city, user_birth_country,
            user_last_modified, creator_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(u.user_id)
    .bind(&u.user_first_name)
    .bind(&u.user_last_name)
    .bind(&u.user_email)
    .bind(&u.user_phone)
    .bind(&u.user_birth_date)
    .bind(&u.user_birth_city)
    .bind(&u.user_birth_country)
    .bind(u.user_last_modified)
    .bind(&u.creator_id)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_membership_row<'e, E>(executor: E, m: &Membership) -> Result<(), AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("INSERT INTO user_has_accounts (user_id, account_id, user_role) VALUES ($1, $2, $3)")
        .bind(m.user_id)
        .bind(m.account_id)
        .bind(m.user_role.as_str())
        .execute(executor)
        .await
        .map_err(|e| unique_as_conflict(e, "User is already linked to this account"))?;
    Ok(())
}
