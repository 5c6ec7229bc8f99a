//! Error types for AccountService

use crate::balance::Balance;
use crate::hierarchy::UserType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccountServiceError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Balance, available: Balance },

    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: i64 },

    #[error("Account not found for user name: {user_name}")]
    UserNameNotFound { user_name: String },

    #[error("User name already taken: {user_name}")]
    DuplicateUserName { user_name: String },

    #[error("Invalid user name {user_name:?}: {reason}")]
    InvalidUserName { user_name: String, reason: String },

    #[error("A {parent} account cannot have a {child} child")]
    IllegalHierarchy { parent: UserType, child: UserType },

    #[error("A {user_type} account requires a parent")]
    ParentRequired { user_type: UserType },

    #[error("Accounts {from} and {to} are not directly related")]
    NotRelated { from: i64, to: i64 },

    #[error("Invalid amount {amount}: must be positive")]
    InvalidAmount { amount: Balance },

    #[error("Balance overflow on account {account_id}")]
    BalanceOverflow { account_id: i64 },

    #[error("Ledger operation on account {account_id} timed out after {timeout_ms}ms")]
    LedgerTimeout { account_id: i64, timeout_ms: u64 },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AccountServiceError {
    /// Whether the failure was a business-rule rejection rather than an infrastructure fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AccountServiceError::InsufficientBalance { .. }
                | AccountServiceError::InvalidAmount { .. }
                | AccountServiceError::AccountNotFound { .. }
                | AccountServiceError::UserNameNotFound { .. }
                | AccountServiceError::DuplicateUserName { .. }
                | AccountServiceError::InvalidUserName { .. }
                | AccountServiceError::IllegalHierarchy { .. }
                | AccountServiceError::ParentRequired { .. }
                | AccountServiceError::NotRelated { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_business_rule_failures() {
        let insufficient = AccountServiceError::InsufficientBalance {
            required: Balance::from_units(10),
            available: Balance::ZERO,
        };
        assert!(insufficient.is_rejection());
        assert!(AccountServiceError::NotRelated { from: 1, to: 2 }.is_rejection());
        assert!(!AccountServiceError::LedgerTimeout { account_id: 1, timeout_ms: 20 }.is_rejection());
        assert!(!AccountServiceError::Internal { message: "boom".to_string() }.is_rejection());
    }
}
