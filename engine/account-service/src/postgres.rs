//! Postgres ledger backend
//!
//! Balance mutations lock the account row with `SELECT ... FOR UPDATE` inside a
//! transaction, so concurrent deposits and withdrawals on one account
//! serialize on the check-and-update. Lock waits and statements inside the
//! transaction are bounded with `SET LOCAL`; the commit itself is not, so a
//! reported failure always means nothing was written. Dropping an uncommitted
//! transaction rolls it back.

use crate::account::{Account, NewAccount};
use crate::balance::Balance;
use crate::config::DatabaseConfig;
use crate::hierarchy::UserType;
use crate::ledger::{DateRange, LedgerEntry, Mutation, Receipt, TransferReceipt};
use crate::store::{next_balance, LedgerStore};
use crate::{AccountServiceError, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;

const ACCOUNT_COLUMNS: &str =
    "id, user_name, user_type, parent_id, balance, created_at, updated_at";

/// SQLSTATE lock_not_available, raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// SQLSTATE query_canceled, raised when `statement_timeout` expires
const QUERY_CANCELED: &str = "57014";

fn is_timeout_code(code: Option<&str>) -> bool {
    matches!(code, Some(LOCK_NOT_AVAILABLE | QUERY_CANCELED))
}

/// Ledger store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
    ledger_timeout: Duration,
}

impl PgLedger {
    /// Connect, then run the embedded migrations
    pub async fn connect(config: &DatabaseConfig, ledger_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(ledger_timeout)
            .connect(&config.url)
            .await?;

        // The gateway's migrations share this database
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator.run(&pool).await?;
        tracing::info!("Ledger database ready (max_connections={})", config.max_connections);

        Ok(Self { pool, ledger_timeout })
    }

    /// Begin a transaction whose lock waits and statements are bounded
    async fn begin_bounded(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        let ms = self.ledger_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", ms)).execute(&mut *tx).await?;
        sqlx::query(&format!("SET LOCAL statement_timeout = '{}ms'", ms)).execute(&mut *tx).await?;
        Ok(tx)
    }

    fn timed_out(&self, account_id: i64, err: AccountServiceError) -> AccountServiceError {
        let expired = match &err {
            AccountServiceError::DatabaseError(sqlx::Error::Database(db)) => {
                is_timeout_code(db.code().as_deref())
            }
            _ => false,
        };
        if expired {
            AccountServiceError::LedgerTimeout {
                account_id,
                timeout_ms: self.ledger_timeout.as_millis() as u64,
            }
        } else {
            err
        }
    }
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let rank: i16 = row.try_get("user_type")?;
    Ok(Account {
        id: row.try_get("id")?,
        user_name: row.try_get("user_name")?,
        user_type: UserType::try_from(rank)?,
        parent_id: row.try_get("parent_id")?,
        balance: Balance::from_cents(row.try_get("balance")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let kind: String = row.try_get("kind")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: Balance::from_cents(row.try_get("amount")?),
        kind: kind.parse()?,
        meta: row.try_get("meta")?,
        balance_after: Balance::from_cents(row.try_get("balance_after")?),
        created_at: row.try_get("created_at")?,
    })
}

/// Lock the account row, check, update the balance and append the entry
async fn apply_in_tx(tx: &mut Transaction<'_, Postgres>, mutation: &Mutation) -> Result<Receipt> {
    let row = sqlx::query("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(mutation.account_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AccountServiceError::AccountNotFound { account_id: mutation.account_id })?;

    let balance_before = Balance::from_cents(row.try_get("balance")?);
    let balance_after = next_balance(mutation.account_id, balance_before, mutation.amount)?;

    sqlx::query("UPDATE accounts SET balance = $1, updated_at = NOW() WHERE id = $2")
        .bind(balance_after.to_cents())
        .bind(mutation.account_id)
        .execute(&mut **tx)
        .await?;

    let row = sqlx::query(
        "INSERT INTO ledger_entries (account_id, amount, kind, meta, balance_after)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, account_id, amount, kind, meta, balance_after, created_at",
    )
    .bind(mutation.account_id)
    .bind(mutation.amount.to_cents())
    .bind(mutation.kind.as_str())
    .bind(&mutation.meta)
    .bind(balance_after.to_cents())
    .fetch_one(&mut **tx)
    .await?;

    Ok(Receipt { entry: entry_from_row(&row)?, balance_before, balance_after })
}

#[async_trait::async_trait]
impl LedgerStore for PgLedger {
    async fn create_account(&self, new: NewAccount) -> Result<Account> {
        let query = format!(
            "INSERT INTO accounts (user_name, user_type, parent_id) VALUES ($1, $2, $3)
             RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let result = sqlx::query(&query)
            .bind(&new.user_name)
            .bind(new.user_type.rank())
            .bind(new.parent_id)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => account_from_row(&row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AccountServiceError::DuplicateUserName { user_name: new.user_name })
            }
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(AccountServiceError::AccountNotFound {
                    account_id: new.parent_id.unwrap_or_default(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, account_id: i64) -> Result<Option<Account>> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query).bind(account_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_name(&self, user_name: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {} FROM accounts WHERE user_name = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query).bind(user_name).fetch_optional(&self.pool).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_user_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT user_name FROM accounts ORDER BY user_name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("user_name").map_err(AccountServiceError::from))
            .collect()
    }

    async fn children(&self, parent_id: i64) -> Result<Vec<Account>> {
        let query =
            format!("SELECT {} FROM accounts WHERE parent_id = $1 ORDER BY id", ACCOUNT_COLUMNS);
        let rows = sqlx::query(&query).bind(parent_id).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn apply(&self, mutation: Mutation) -> Result<Receipt> {
        let mut tx = self.begin_bounded().await?;
        let receipt = apply_in_tx(&mut tx, &mutation)
            .await
            .map_err(|e| self.timed_out(mutation.account_id, e))?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn apply_transfer(&self, debit: Mutation, credit: Mutation) -> Result<TransferReceipt> {
        if debit.account_id == credit.account_id {
            return Err(AccountServiceError::NotRelated {
                from: debit.account_id,
                to: credit.account_id,
            });
        }

        let mut tx = self.begin_bounded().await?;

        // Row locks are taken in id order so opposite transfers cannot deadlock
        let (debit_receipt, credit_receipt) = if debit.account_id < credit.account_id {
            let d = apply_in_tx(&mut tx, &debit)
                .await
                .map_err(|e| self.timed_out(debit.account_id, e))?;
            let c = apply_in_tx(&mut tx, &credit)
                .await
                .map_err(|e| self.timed_out(credit.account_id, e))?;
            (d, c)
        } else {
            let c = apply_in_tx(&mut tx, &credit)
                .await
                .map_err(|e| self.timed_out(credit.account_id, e))?;
            let d = apply_in_tx(&mut tx, &debit)
                .await
                .map_err(|e| self.timed_out(debit.account_id, e))?;
            (d, c)
        };

        tx.commit().await?;
        Ok(TransferReceipt { debit: debit_receipt, credit: credit_receipt })
    }

    async fn entries(
        &self,
        account_id: i64,
        range: &DateRange,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerEntry>> {
        let limit = limit.map(i64::from).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT id, account_id, amount, kind, meta, balance_after, created_at
             FROM ledger_entries
             WHERE account_id = $1
               AND ($2::timestamp IS NULL OR created_at >= $2)
               AND ($3::timestamp IS NULL OR created_at < $3)
             ORDER BY id DESC LIMIT $4",
        )
        .bind(account_id)
        .bind(range.from)
        .bind(range.to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
