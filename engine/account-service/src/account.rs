//! Account records of the agent hierarchy

use crate::balance::Balance;
use crate::hierarchy::UserType;
use serde::{Deserialize, Serialize};

/// Account represents a player, agent or system wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_name: String,
    pub user_type: UserType,
    /// Hierarchy edge only; the parent never owns the child's balance
    pub parent_id: Option<i64>,
    /// Materialized from the ledger, changed only by ledger operations
    pub balance: Balance,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl Account {
    pub fn is_child_of(&self, other: &Account) -> bool {
        self.parent_id == Some(other.id)
    }
}

/// Request to open a new account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub user_name: String,
    pub user_type: UserType,
    pub parent_id: Option<i64>,
}

impl NewAccount {
    pub fn root(user_name: impl Into<String>, user_type: UserType) -> Self {
        Self { user_name: user_name.into(), user_type, parent_id: None }
    }

    pub fn child_of(parent: &Account, user_name: impl Into<String>, user_type: UserType) -> Self {
        Self { user_name: user_name.into(), user_type, parent_id: Some(parent.id) }
    }

    /// Child of `parent` with the parent's default descendant type
    pub fn descendant_of(parent: &Account, user_name: impl Into<String>) -> Self {
        Self::child_of(parent, user_name, parent.user_type.child_type())
    }
}
