//! AccountService - agent hierarchy, wallet ledger and balances
//!
//! This crate provides the account directory, the [`UserType`] hierarchy policy
//! and the [`WalletService`] ledger boundary through which every balance change
//! of the platform flows.

pub mod account;
pub mod balance;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod ledger;
pub mod postgres;
pub mod store;
pub mod wallet;

pub use account::{Account, NewAccount};
pub use config::{AccountServiceConfig, StorageBackend};
pub use error::AccountServiceError;
pub use hierarchy::UserType;
pub use wallet::WalletService;

// Re-export commonly used types
pub use balance::Balance;
pub use ledger::{
    DateRange, LedgerEntry, Receipt, TransactionKind, TransactionReport, TransferReceipt,
};
pub use postgres::PgLedger;
pub use store::{InMemoryLedger, LedgerStore};

// Result type alias
pub type Result<T> = std::result::Result<T, AccountServiceError>;

use std::sync::Arc;

/// Build the wallet over the configured backend
pub async fn connect(config: &AccountServiceConfig) -> Result<WalletService> {
    let store: Arc<dyn LedgerStore> = match config.backend {
        StorageBackend::Postgres => {
            Arc::new(PgLedger::connect(&config.database, config.ledger_timeout()).await?)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory ledger; balances will not survive a restart");
            Arc::new(InMemoryLedger::with_lock_timeout(config.ledger_timeout()))
        }
    };
    Ok(WalletService::new(store, config))
}
