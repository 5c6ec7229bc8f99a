//! Agent hierarchy policy
//!
//! Every account has a [`UserType`]. The type decides which child types an
//! account may create, the default type of a new descendant, and the length of
//! generated login names. The rules are a fixed table; adding a tier means
//! extending every `match` below.

use crate::{AccountServiceError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Longest login name accepted anywhere in the platform
pub const MAX_USER_NAME_LEN: usize = 40;

/// Account tier in the agent hierarchy, carrying its numeric rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum UserType {
    Owner = 10,
    Senior = 11,
    Master = 15,
    Agent = 20,
    SubAgent = 30,
    Player = 40,
    SystemWallet = 50,
}

impl UserType {
    pub const ALL: [UserType; 7] = [
        UserType::Owner,
        UserType::Senior,
        UserType::Master,
        UserType::Agent,
        UserType::SubAgent,
        UserType::Player,
        UserType::SystemWallet,
    ];

    /// Numeric rank, as persisted
    pub fn rank(self) -> i16 {
        self as i16
    }

    /// Required length of the numeric part of a generated login name
    pub fn username_length(self) -> usize {
        match self {
            UserType::Owner => 1,
            UserType::Senior => 2,
            UserType::Master => 3,
            UserType::Agent => 4,
            UserType::SubAgent => 5,
            UserType::Player => 6,
            UserType::SystemWallet => 7,
        }
    }

    /// Type given to a new descendant when none is requested
    pub fn child_type(self) -> UserType {
        match self {
            UserType::Owner | UserType::Senior | UserType::Master => UserType::Agent,
            UserType::Agent => UserType::SubAgent,
            UserType::SubAgent | UserType::Player | UserType::SystemWallet => UserType::Player,
        }
    }

    /// Whether `self` may be the direct parent of an account of type `child`
    pub fn can_have_child(self, child: UserType) -> bool {
        match self {
            UserType::Owner => {
                matches!(child, UserType::Agent | UserType::Senior | UserType::Master)
            }
            UserType::Senior => matches!(child, UserType::Agent | UserType::Master),
            UserType::Master => child == UserType::Agent,
            UserType::Agent => matches!(child, UserType::SubAgent | UserType::Player),
            UserType::SubAgent => child == UserType::Player,
            UserType::Player | UserType::SystemWallet => false,
        }
    }

    /// Types that sit at the top of a tree and need no parent
    pub fn is_root(self) -> bool {
        match self {
            UserType::Owner | UserType::SystemWallet => true,
            UserType::Senior
            | UserType::Master
            | UserType::Agent
            | UserType::SubAgent
            | UserType::Player => false,
        }
    }

    /// Short tier code used as the login-name prefix
    pub fn code(self) -> &'static str {
        match self {
            UserType::Owner => "OW",
            UserType::Senior => "SE",
            UserType::Master => "MA",
            UserType::Agent => "AG",
            UserType::SubAgent => "SA",
            UserType::Player => "PL",
            UserType::SystemWallet => "SW",
        }
    }

    /// Stable lowercase name, matching the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Owner => "owner",
            UserType::Senior => "senior",
            UserType::Master => "master",
            UserType::Agent => "agent",
            UserType::SubAgent => "sub_agent",
            UserType::Player => "player",
            UserType::SystemWallet => "system_wallet",
        }
    }

    /// Generate a login name: tier code plus `seq` zero-padded to `username_length` digits
    pub fn generate_user_name(self, seq: u64) -> String {
        format!("{}{:0width$}", self.code(), seq, width = self.username_length())
    }

    /// Validate a login name for an account of this type
    pub fn validate_user_name(self, name: &str) -> Result<()> {
        let reason = if name.is_empty() {
            Some("must not be empty".to_string())
        } else if name.len() > MAX_USER_NAME_LEN {
            Some(format!("must be at most {} characters", MAX_USER_NAME_LEN))
        } else if !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Some("must contain only ASCII letters and digits".to_string())
        } else if name.len() < self.username_length() {
            Some(format!(
                "must be at least {} characters for {}",
                self.username_length(),
                self.as_str()
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => {
                Err(AccountServiceError::InvalidUserName { user_name: name.to_string(), reason })
            }
            None => Ok(()),
        }
    }
}

impl TryFrom<i16> for UserType {
    type Error = AccountServiceError;

    fn try_from(rank: i16) -> Result<Self> {
        UserType::ALL.into_iter().find(|t| t.rank() == rank).ok_or_else(|| {
            AccountServiceError::Internal { message: format!("unknown user type rank {}", rank) }
        })
    }
}

impl FromStr for UserType {
    type Err = AccountServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let normalized = match normalized.as_str() {
            "subagent" => "sub_agent",
            "systemwallet" => "system_wallet",
            other => other,
        };
        UserType::ALL.into_iter().find(|t| t.as_str() == normalized).ok_or_else(|| {
            AccountServiceError::Internal { message: format!("unknown user type {:?}", s) }
        })
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
