//! Ledger storage trait and the in-memory backend

use crate::account::{Account, NewAccount};
use crate::balance::Balance;
use crate::config::DEFAULT_LEDGER_TIMEOUT_MS;
use crate::ledger::{DateRange, LedgerEntry, Mutation, Receipt, TransferReceipt};
use crate::{AccountServiceError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Storage behind the wallet ledger boundary
///
/// `apply` and `apply_transfer` are the only ways a balance changes. Each call
/// is one all-or-nothing transaction that updates the materialized balance and
/// appends exactly one entry per touched account. Calls touching the same
/// account serialize on that account; waiting for that account longer than
/// the store's ledger timeout fails with `LedgerTimeout` and changes nothing.
/// Once the change is committed the call reports success.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new account with a zero balance
    async fn create_account(&self, new: NewAccount) -> Result<Account>;

    async fn find_by_id(&self, account_id: i64) -> Result<Option<Account>>;

    async fn find_by_name(&self, user_name: &str) -> Result<Option<Account>>;

    /// Every user name in the directory
    async fn list_user_names(&self) -> Result<Vec<String>>;

    /// Direct children of an account
    async fn children(&self, parent_id: i64) -> Result<Vec<Account>>;

    /// Apply one signed balance change atomically
    async fn apply(&self, mutation: Mutation) -> Result<Receipt>;

    /// Apply a debit and a credit on two accounts in one transaction
    async fn apply_transfer(&self, debit: Mutation, credit: Mutation) -> Result<TransferReceipt>;

    /// Ledger entries of an account inside `range`, newest first
    async fn entries(
        &self,
        account_id: i64,
        range: &DateRange,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerEntry>>;

    async fn health_check(&self) -> Result<()>;
}

/// Balance after applying `amount`, or the reason it cannot be applied
pub(crate) fn next_balance(account_id: i64, current: Balance, amount: Balance) -> Result<Balance> {
    if amount.is_zero() {
        return Err(AccountServiceError::InvalidAmount { amount });
    }
    let next = current
        .checked_add(amount)
        .ok_or(AccountServiceError::BalanceOverflow { account_id })?;
    if next.is_negative() {
        return Err(AccountServiceError::InsufficientBalance {
            required: amount.abs(),
            available: current,
        });
    }
    Ok(next)
}

#[derive(Debug)]
struct AccountState {
    account: Account,
    entries: Vec<LedgerEntry>,
}

/// In-memory ledger (for tests and local development)
///
/// Each account sits behind its own async mutex, so mutations on one account
/// serialize while different accounts proceed in parallel.
#[derive(Debug)]
pub struct InMemoryLedger {
    accounts: DashMap<i64, Arc<Mutex<AccountState>>>,
    names: DashMap<String, i64>,
    next_account_id: AtomicI64,
    next_entry_id: AtomicI64,
    lock_timeout: Duration,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::with_lock_timeout(Duration::from_millis(DEFAULT_LEDGER_TIMEOUT_MS))
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger whose mutations give up after waiting `lock_timeout` for an account
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            names: DashMap::new(),
            next_account_id: AtomicI64::new(0),
            next_entry_id: AtomicI64::new(0),
            lock_timeout,
        }
    }

    async fn lock<'a>(
        &self,
        account_id: i64,
        state: &'a Mutex<AccountState>,
    ) -> Result<MutexGuard<'a, AccountState>> {
        tokio::time::timeout(self.lock_timeout, state.lock()).await.map_err(|_| {
            AccountServiceError::LedgerTimeout {
                account_id,
                timeout_ms: self.lock_timeout.as_millis() as u64,
            }
        })
    }

    fn state(&self, account_id: i64) -> Result<Arc<Mutex<AccountState>>> {
        self.accounts
            .get(&account_id)
            .map(|state| state.value().clone())
            .ok_or(AccountServiceError::AccountNotFound { account_id })
    }

    fn settle(&self, state: &mut AccountState, mutation: &Mutation, next: Balance) -> Receipt {
        let now = chrono::Utc::now().naive_utc();
        let balance_before = state.account.balance;
        let entry = LedgerEntry {
            id: self.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1,
            account_id: mutation.account_id,
            amount: mutation.amount,
            kind: mutation.kind,
            meta: mutation.meta.clone(),
            balance_after: next,
            created_at: now,
        };
        state.account.balance = next;
        state.account.updated_at = now;
        state.entries.push(entry.clone());
        Receipt { entry, balance_before, balance_after: next }
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedger {
    async fn create_account(&self, new: NewAccount) -> Result<Account> {
        if let Some(parent_id) = new.parent_id {
            if !self.accounts.contains_key(&parent_id) {
                return Err(AccountServiceError::AccountNotFound { account_id: parent_id });
            }
        }

        let id = match self.names.entry(new.user_name.clone()) {
            Entry::Occupied(_) => {
                return Err(AccountServiceError::DuplicateUserName { user_name: new.user_name })
            }
            Entry::Vacant(slot) => {
                let id = self.next_account_id.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(id);
                id
            }
        };

        let now = chrono::Utc::now().naive_utc();
        let account = Account {
            id,
            user_name: new.user_name,
            user_type: new.user_type,
            parent_id: new.parent_id,
            balance: Balance::ZERO,
            created_at: now,
            updated_at: now,
        };
        self.accounts.insert(
            id,
            Arc::new(Mutex::new(AccountState { account: account.clone(), entries: Vec::new() })),
        );

        Ok(account)
    }

    async fn find_by_id(&self, account_id: i64) -> Result<Option<Account>> {
        let state = match self.accounts.get(&account_id) {
            Some(state) => state.value().clone(),
            None => return Ok(None),
        };
        let state = state.lock().await;
        Ok(Some(state.account.clone()))
    }

    async fn find_by_name(&self, user_name: &str) -> Result<Option<Account>> {
        let id = match self.names.get(user_name) {
            Some(id) => *id.value(),
            None => return Ok(None),
        };
        self.find_by_id(id).await
    }

    async fn list_user_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.names.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn children(&self, parent_id: i64) -> Result<Vec<Account>> {
        let states: Vec<Arc<Mutex<AccountState>>> =
            self.accounts.iter().map(|entry| entry.value().clone()).collect();

        let mut children = Vec::new();
        for state in states {
            let state = state.lock().await;
            if state.account.parent_id == Some(parent_id) {
                children.push(state.account.clone());
            }
        }
        children.sort_by_key(|account| account.id);
        Ok(children)
    }

    async fn apply(&self, mutation: Mutation) -> Result<Receipt> {
        let state = self.state(mutation.account_id)?;
        let mut state = self.lock(mutation.account_id, &state).await?;

        let next = next_balance(mutation.account_id, state.account.balance, mutation.amount)?;
        Ok(self.settle(&mut state, &mutation, next))
    }

    async fn apply_transfer(&self, debit: Mutation, credit: Mutation) -> Result<TransferReceipt> {
        if debit.account_id == credit.account_id {
            return Err(AccountServiceError::NotRelated {
                from: debit.account_id,
                to: credit.account_id,
            });
        }

        let debit_state = self.state(debit.account_id)?;
        let credit_state = self.state(credit.account_id)?;

        // Lock in id order so opposite transfers cannot deadlock
        let (mut debit_guard, mut credit_guard) = if debit.account_id < credit.account_id {
            let d = self.lock(debit.account_id, &debit_state).await?;
            let c = self.lock(credit.account_id, &credit_state).await?;
            (d, c)
        } else {
            let c = self.lock(credit.account_id, &credit_state).await?;
            let d = self.lock(debit.account_id, &debit_state).await?;
            (d, c)
        };

        let debit_next = next_balance(debit.account_id, debit_guard.account.balance, debit.amount)?;
        let credit_next =
            next_balance(credit.account_id, credit_guard.account.balance, credit.amount)?;

        let debit_receipt = self.settle(&mut debit_guard, &debit, debit_next);
        let credit_receipt = self.settle(&mut credit_guard, &credit, credit_next);

        Ok(TransferReceipt { debit: debit_receipt, credit: credit_receipt })
    }

    async fn entries(
        &self,
        account_id: i64,
        range: &DateRange,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerEntry>> {
        let state = self.state(account_id)?;
        let state = state.lock().await;
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|entry| range.contains(entry.created_at))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
