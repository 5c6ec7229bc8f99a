//! WalletService: the ledger boundary
//!
//! Deposits, withdrawals and transfers go through here and nowhere else. The
//! store bounds how long a call may wait for an account; a call that gives up
//! has written nothing, and a call that committed always reports its receipt.

use crate::account::{Account, NewAccount};
use crate::balance::Balance;
use crate::config::AccountServiceConfig;
use crate::ledger::{
    DateRange, LedgerEntry, Mutation, Receipt, TransactionKind, TransactionReport,
    TransferReceipt,
};
use crate::store::LedgerStore;
use crate::{AccountServiceError, Result};
use std::sync::Arc;

/// Wallet operations over a ledger store
#[derive(Clone)]
pub struct WalletService {
    store: Arc<dyn LedgerStore>,
    history_limit: u32,
}

impl std::fmt::Debug for WalletService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletService").field("history_limit", &self.history_limit).finish()
    }
}

fn ensure_positive(amount: Balance) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(AccountServiceError::InvalidAmount { amount })
    }
}

impl WalletService {
    pub fn new(store: Arc<dyn LedgerStore>, config: &AccountServiceConfig) -> Self {
        Self { store, history_limit: config.history_limit }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    async fn apply(&self, mutation: Mutation) -> Result<Receipt> {
        let account_id = mutation.account_id;
        let kind = mutation.kind;
        let amount = mutation.amount;

        match self.store.apply(mutation).await {
            Ok(receipt) => {
                tracing::info!(
                    account_id,
                    kind = %kind,
                    amount = %amount,
                    balance_before = %receipt.balance_before,
                    balance_after = %receipt.balance_after,
                    "Ledger entry {} committed",
                    receipt.entry.id
                );
                Ok(receipt)
            }
            Err(e) if e.is_rejection() => {
                tracing::warn!(
                    account_id,
                    kind = %kind,
                    amount = %amount,
                    "Ledger operation rejected: {}",
                    e
                );
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    account_id,
                    kind = %kind,
                    amount = %amount,
                    "Ledger operation failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Credit `amount` to an account
    pub async fn deposit(
        &self,
        account_id: i64,
        amount: Balance,
        kind: TransactionKind,
        meta: serde_json::Value,
    ) -> Result<Receipt> {
        ensure_positive(amount)?;
        self.apply(Mutation { account_id, amount, kind, meta }).await
    }

    /// Debit `amount` from an account; fails without effect on insufficient balance
    pub async fn withdraw(
        &self,
        account_id: i64,
        amount: Balance,
        kind: TransactionKind,
        meta: serde_json::Value,
    ) -> Result<Receipt> {
        ensure_positive(amount)?;
        self.apply(Mutation { account_id, amount: -amount, kind, meta }).await
    }

    /// Move funds between a parent and its direct child, in either direction
    pub async fn transfer(
        &self,
        from_id: i64,
        to_id: i64,
        amount: Balance,
        meta: serde_json::Value,
    ) -> Result<TransferReceipt> {
        ensure_positive(amount)?;

        let from = self.account(from_id).await?;
        let to = self.account(to_id).await?;
        if !to.is_child_of(&from) && !from.is_child_of(&to) {
            return Err(AccountServiceError::NotRelated { from: from_id, to: to_id });
        }

        let debit = Mutation {
            account_id: from_id,
            amount: -amount,
            kind: TransactionKind::TransferOut,
            meta: with_counterparty(&meta, &to),
        };
        let credit = Mutation {
            account_id: to_id,
            amount,
            kind: TransactionKind::TransferIn,
            meta: with_counterparty(&meta, &from),
        };

        let receipt = self.store.apply_transfer(debit, credit).await?;
        tracing::info!(
            "Transferred {} from {} to {} (balances {} / {})",
            amount,
            from.user_name,
            to.user_name,
            receipt.debit.balance_after,
            receipt.credit.balance_after
        );
        Ok(receipt)
    }

    /// Open an account, enforcing the hierarchy rules
    pub async fn create_account(&self, new: NewAccount) -> Result<Account> {
        new.user_type.validate_user_name(&new.user_name)?;

        match new.parent_id {
            Some(parent_id) => {
                let parent = self.account(parent_id).await?;
                if !parent.user_type.can_have_child(new.user_type) {
                    return Err(AccountServiceError::IllegalHierarchy {
                        parent: parent.user_type,
                        child: new.user_type,
                    });
                }
            }
            None if !new.user_type.is_root() => {
                return Err(AccountServiceError::ParentRequired { user_type: new.user_type });
            }
            None => {}
        }

        let account = self.store.create_account(new).await?;
        tracing::info!(
            "Created {} account {} (id={}, parent={:?})",
            account.user_type,
            account.user_name,
            account.id,
            account.parent_id
        );
        Ok(account)
    }

    /// Look up an account by id
    pub async fn account(&self, account_id: i64) -> Result<Account> {
        self.store
            .find_by_id(account_id)
            .await?
            .ok_or(AccountServiceError::AccountNotFound { account_id })
    }

    /// Look up an account by login name
    pub async fn account_by_name(&self, user_name: &str) -> Result<Account> {
        self.store
            .find_by_name(user_name)
            .await?
            .ok_or_else(|| AccountServiceError::UserNameNotFound { user_name: user_name.to_string() })
    }

    pub async fn balance(&self, account_id: i64) -> Result<Balance> {
        Ok(self.account(account_id).await?.balance)
    }

    pub async fn children(&self, parent_id: i64) -> Result<Vec<Account>> {
        self.store.children(parent_id).await
    }

    /// Most recent ledger entries inside `range`, newest first
    pub async fn history(
        &self,
        account_id: i64,
        range: &DateRange,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerEntry>> {
        self.account(account_id).await?;
        self.store.entries(account_id, range, Some(limit.unwrap_or(self.history_limit))).await
    }

    /// Per-kind totals of an account's entries inside `range`
    pub async fn report(&self, account_id: i64, range: &DateRange) -> Result<TransactionReport> {
        self.account(account_id).await?;
        let entries = self.store.entries(account_id, range, None).await?;
        Ok(TransactionReport::from_entries(account_id, *range, &entries))
    }
}

fn with_counterparty(meta: &serde_json::Value, counterparty: &Account) -> serde_json::Value {
    let mut meta = match meta {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("note".to_string(), other.clone());
            map
        }
    };
    meta.insert("counterparty".to_string(), serde_json::json!(counterparty.user_name));
    serde_json::Value::Object(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::UserType;
    use crate::store::InMemoryLedger;
    use serde_json::json;

    fn wallet() -> WalletService {
        WalletService::new(Arc::new(InMemoryLedger::new()), &AccountServiceConfig::default())
    }

    async fn owner_agent_player(wallet: &WalletService) -> (Account, Account, Account) {
        let owner = wallet.create_account(NewAccount::root("OWNER1", UserType::Owner)).await.unwrap();
        let agent = wallet
            .create_account(NewAccount::child_of(&owner, "AGENT01", UserType::Agent))
            .await
            .unwrap();
        let player = wallet
            .create_account(NewAccount::child_of(&agent, "PLAYER0101", UserType::Player))
            .await
            .unwrap();
        (owner, agent, player)
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw() {
        let wallet = wallet();
        let (_, _, player) = owner_agent_player(&wallet).await;

        let receipt = wallet
            .deposit(player.id, Balance::from_units(1000), TransactionKind::Deposit, json!({}))
            .await
            .unwrap();
        assert_eq!(receipt.balance_after, Balance::from_units(1000));

        let receipt = wallet
            .withdraw(player.id, Balance::from_units(500), TransactionKind::GameLoss, json!({}))
            .await
            .unwrap();
        assert_eq!(receipt.balance_before, Balance::from_units(1000));
        assert_eq!(receipt.balance_after, Balance::from_units(500));
        assert_eq!(receipt.entry.amount, Balance::from_units(-500));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let wallet = wallet();
        let (_, _, player) = owner_agent_player(&wallet).await;

        for amount in [Balance::ZERO, Balance::from_units(-5)] {
            let deposit =
                wallet.deposit(player.id, amount, TransactionKind::Deposit, json!({})).await;
            assert!(matches!(deposit, Err(AccountServiceError::InvalidAmount { .. })));
            let withdraw =
                wallet.withdraw(player.id, amount, TransactionKind::Withdraw, json!({})).await;
            assert!(matches!(withdraw, Err(AccountServiceError::InvalidAmount { .. })));
        }
        assert!(wallet.history(player.id, &DateRange::ALL, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_reported() {
        let wallet = wallet();
        let (_, _, player) = owner_agent_player(&wallet).await;
        wallet
            .deposit(player.id, Balance::from_units(100), TransactionKind::Deposit, json!({}))
            .await
            .unwrap();

        let err = wallet
            .withdraw(player.id, Balance::from_units(101), TransactionKind::GameLoss, json!({}))
            .await
            .unwrap_err();
        match err {
            AccountServiceError::InsufficientBalance { required, available } => {
                assert_eq!(required, Balance::from_units(101));
                assert_eq!(available, Balance::from_units(100));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(wallet.balance(player.id).await.unwrap(), Balance::from_units(100));
    }

    #[tokio::test]
    async fn test_hierarchy_enforced_on_create() {
        let wallet = wallet();
        let (owner, agent, player) = owner_agent_player(&wallet).await;

        let err = wallet
            .create_account(NewAccount::child_of(&player, "PLAYER0202", UserType::Player))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccountServiceError::IllegalHierarchy { parent: UserType::Player, child: UserType::Player }
        ));

        let err = wallet
            .create_account(NewAccount::child_of(&agent, "MASTER1", UserType::Master))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountServiceError::IllegalHierarchy { .. }));

        let err =
            wallet.create_account(NewAccount::root("AGENT99", UserType::Agent)).await.unwrap_err();
        assert!(matches!(err, AccountServiceError::ParentRequired { user_type: UserType::Agent }));

        let senior = wallet
            .create_account(NewAccount::child_of(&owner, "SENIOR1", UserType::Senior))
            .await
            .unwrap();
        assert_eq!(senior.parent_id, Some(owner.id));

        let err = wallet
            .create_account(NewAccount::child_of(&owner, "x", UserType::Agent))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountServiceError::InvalidUserName { .. }));
    }

    #[tokio::test]
    async fn test_transfer_along_hierarchy_edge() {
        let wallet = wallet();
        let (owner, agent, player) = owner_agent_player(&wallet).await;
        wallet
            .deposit(agent.id, Balance::from_units(1000), TransactionKind::Deposit, json!({}))
            .await
            .unwrap();

        let receipt = wallet
            .transfer(agent.id, player.id, Balance::from_units(300), json!({"note": "top up"}))
            .await
            .unwrap();
        assert_eq!(receipt.debit.balance_after, Balance::from_units(700));
        assert_eq!(receipt.credit.balance_after, Balance::from_units(300));
        assert_eq!(receipt.credit.entry.kind, TransactionKind::TransferIn);
        assert_eq!(receipt.credit.entry.meta["counterparty"], "AGENT01");

        // Child back to parent is allowed, skipping a tier is not
        wallet.transfer(player.id, agent.id, Balance::from_units(100), json!({})).await.unwrap();
        let err = wallet
            .transfer(owner.id, player.id, Balance::from_units(1), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountServiceError::NotRelated { .. }));
    }

    #[tokio::test]
    async fn test_balance_equals_sum_of_entries_under_concurrency() {
        let wallet = wallet();
        let (_, _, player) = owner_agent_player(&wallet).await;
        wallet
            .deposit(player.id, Balance::from_units(1000), TransactionKind::Deposit, json!({}))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..50i64 {
            let wallet = wallet.clone();
            let account_id = player.id;
            handles.push(tokio::spawn(async move {
                let amount = Balance::from_units(10 + i % 7);
                if i % 2 == 0 {
                    wallet
                        .deposit(account_id, amount, TransactionKind::GameWin, json!({}))
                        .await
                        .map(|_| amount)
                } else {
                    wallet
                        .withdraw(account_id, amount, TransactionKind::GameLoss, json!({}))
                        .await
                        .map(|_| -amount)
                }
            }));
        }

        let mut expected = Balance::from_units(1000);
        for handle in handles {
            expected = expected + handle.await.unwrap().unwrap();
        }

        let entries = wallet.history(player.id, &DateRange::ALL, Some(1000)).await.unwrap();
        assert_eq!(entries.len(), 51);
        let sum: Balance = entries.iter().map(|e| e.amount).sum();
        assert_eq!(sum, expected);
        assert_eq!(wallet.balance(player.id).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_report_totals() {
        let wallet = wallet();
        let (_, _, player) = owner_agent_player(&wallet).await;
        wallet
            .deposit(player.id, Balance::from_units(1000), TransactionKind::Deposit, json!({}))
            .await
            .unwrap();
        wallet
            .withdraw(player.id, Balance::from_units(500), TransactionKind::GameLoss, json!({}))
            .await
            .unwrap();
        wallet
            .deposit(player.id, Balance::from_units(4500), TransactionKind::GameWin, json!({}))
            .await
            .unwrap();

        let report = wallet.report(player.id, &DateRange::ALL).await.unwrap();
        assert_eq!(report.net, Balance::from_units(5000));
        assert_eq!(report.by_kind[&TransactionKind::GameWin].total, Balance::from_units(4500));
        assert_eq!(report.by_kind.len(), 3);

        let today = chrono::Utc::now().date_naive();
        let earlier = DateRange::days(None, today.pred_opt());
        let report = wallet.report(player.id, &earlier).await.unwrap();
        assert_eq!(report.net, Balance::ZERO);
        assert!(report.by_kind.is_empty());
        assert!(wallet.history(player.id, &earlier, None).await.unwrap().is_empty());
        assert_eq!(
            wallet.history(player.id, &DateRange::days(Some(today), None), None).await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_descendant_gets_default_type() {
        let wallet = wallet();
        let (owner, agent, _) = owner_agent_player(&wallet).await;

        let sub_agent =
            wallet.create_account(NewAccount::descendant_of(&agent, "SUB0001")).await.unwrap();
        assert_eq!(sub_agent.user_type, UserType::SubAgent);
        let player =
            wallet.create_account(NewAccount::descendant_of(&sub_agent, "PL000007")).await.unwrap();
        assert_eq!(player.user_type, UserType::Player);
        let agent =
            wallet.create_account(NewAccount::descendant_of(&owner, "AGENT02")).await.unwrap();
        assert_eq!(agent.user_type, UserType::Agent);

        let err = wallet
            .create_account(NewAccount::descendant_of(&player, "PL000008"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountServiceError::IllegalHierarchy { .. }));
    }

    /// Store that commits immediately but acknowledges slowly
    struct SlowAckLedger(InMemoryLedger);

    #[async_trait::async_trait]
    impl LedgerStore for SlowAckLedger {
        async fn create_account(&self, new: NewAccount) -> Result<Account> {
            self.0.create_account(new).await
        }
        async fn find_by_id(&self, account_id: i64) -> Result<Option<Account>> {
            self.0.find_by_id(account_id).await
        }
        async fn find_by_name(&self, user_name: &str) -> Result<Option<Account>> {
            self.0.find_by_name(user_name).await
        }
        async fn list_user_names(&self) -> Result<Vec<String>> {
            self.0.list_user_names().await
        }
        async fn children(&self, parent_id: i64) -> Result<Vec<Account>> {
            self.0.children(parent_id).await
        }
        async fn apply(&self, mutation: Mutation) -> Result<Receipt> {
            let receipt = self.0.apply(mutation).await?;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(receipt)
        }
        async fn apply_transfer(&self, debit: Mutation, credit: Mutation) -> Result<TransferReceipt> {
            self.0.apply_transfer(debit, credit).await
        }
        async fn entries(
            &self,
            account_id: i64,
            range: &DateRange,
            limit: Option<u32>,
        ) -> Result<Vec<LedgerEntry>> {
            self.0.entries(account_id, range, limit).await
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_committed_change_is_reported_even_when_slow() {
        let config = AccountServiceConfig { ledger_timeout_ms: 20, ..Default::default() };
        let store = SlowAckLedger(InMemoryLedger::with_lock_timeout(config.ledger_timeout()));
        let wallet = WalletService::new(Arc::new(store), &config);
        let owner = wallet.create_account(NewAccount::root("OWNER1", UserType::Owner)).await.unwrap();

        let receipt = wallet
            .deposit(owner.id, Balance::from_units(10), TransactionKind::Deposit, json!({}))
            .await
            .unwrap();
        assert_eq!(receipt.balance_after, Balance::from_units(10));
        assert_eq!(wallet.balance(owner.id).await.unwrap(), Balance::from_units(10));
        assert_eq!(wallet.history(owner.id, &DateRange::ALL, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_account_lookups() {
        let wallet = wallet();
        assert!(matches!(
            wallet.account_by_name("NOBODY").await,
            Err(AccountServiceError::UserNameNotFound { .. })
        ));
        assert!(matches!(
            wallet.deposit(42, Balance::from_units(1), TransactionKind::Deposit, json!({})).await,
            Err(AccountServiceError::AccountNotFound { account_id: 42 })
        ));
    }
}
