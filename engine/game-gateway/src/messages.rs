//! Message types for the Buffalo provider and operator endpoints

use crate::error::{GatewayError, GatewayResult};
use crate::rooms::RoomConfig;
use account_service::Balance;
use serde::{Deserialize, Deserializer, Serialize};

/// Longest UID accepted from the provider
pub const MAX_UID_LEN: usize = 50;

/// Whole number given either as a JSON number or a numeric string
fn units<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 1e15).map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("not a whole amount: {}", n))),
        serde_json::Value::String(s) => {
            s.trim().parse::<i64>().map_err(|_| D::Error::custom(format!("not numeric: {}", s)))
        }
        other => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}

fn check_credentials(uid: &str, token: &str) -> GatewayResult<()> {
    if uid.is_empty() || uid.len() > MAX_UID_LEN {
        return Err(GatewayError::InvalidRequest(format!("uid length {}", uid.len())));
    }
    if token.is_empty() {
        return Err(GatewayError::InvalidRequest("empty token".to_string()));
    }
    Ok(())
}

/// Provider balance query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub uid: String,
    pub token: String,
}

impl BalanceRequest {
    pub fn validate(&self) -> GatewayResult<()> {
        check_credentials(&self.uid, &self.token)
    }
}

/// Provider balance change after a spin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeBalanceRequest {
    pub uid: String,
    pub token: String,

    /// Signed net change in whole units
    #[serde(deserialize_with = "units")]
    pub changemoney: i64,

    #[serde(deserialize_with = "units")]
    pub bet: i64,

    #[serde(deserialize_with = "units")]
    pub win: i64,

    #[serde(rename = "gameId", deserialize_with = "units")]
    pub game_id: i64,
}

/// Ledger amounts carried by a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinAmounts {
    pub change: Balance,
    /// Stake, always non-negative
    pub bet: Balance,
    pub win: Balance,
}

impl ChangeBalanceRequest {
    pub fn validate(&self) -> GatewayResult<()> {
        check_credentials(&self.uid, &self.token)
    }

    /// Convert the whole-unit fields, refusing any that do not fit a balance
    pub fn amounts(&self) -> GatewayResult<SpinAmounts> {
        let convert = |field: &str, units: i64| {
            Balance::checked_from_units(units).ok_or_else(|| {
                GatewayError::InvalidRequest(format!("{} out of range: {}", field, units))
            })
        };
        Ok(SpinAmounts {
            change: convert("changemoney", self.changemoney)?,
            bet: convert("bet", self.bet.checked_abs().unwrap_or(i64::MAX))?,
            win: convert("win", self.win)?,
        })
    }
}

/// Response body understood by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub code: u8,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

impl ProviderResponse {
    pub fn success(msg: &str) -> Self {
        Self { code: 1, msg: msg.to_string(), balance: None }
    }

    pub fn with_balance(balance: i64) -> Self {
        Self { code: 1, msg: "Success".to_string(), balance: Some(balance) }
    }

    pub fn failure(msg: &str) -> Self {
        Self { code: 0, msg: msg.to_string(), balance: None }
    }

    pub fn is_success(&self) -> bool {
        self.code == 1
    }
}

impl From<&GatewayError> for ProviderResponse {
    fn from(err: &GatewayError) -> Self {
        ProviderResponse::failure(err.public_message())
    }
}

/// Operator request for provider credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameAuthRequest {
    pub user_name: String,
}

/// Operator request for a game launch URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchGameRequest {
    pub user_name: String,
    pub room_id: Option<u8>,
    pub lobby_url: Option<String>,
}

/// Credentials handed to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCredentials {
    pub uid: String,
    pub token: String,
    pub user_name: String,
}

/// Credentials plus the rooms the player may enter
#[derive(Debug, Clone, Serialize)]
pub struct GameAuthData {
    pub auth: AuthCredentials,
    pub available_rooms: Vec<RoomConfig>,
    pub all_rooms: Vec<RoomConfig>,
    pub user_balance: i64,
}

/// A ready-to-open game URL
#[derive(Debug, Clone, Serialize)]
pub struct LaunchData {
    #[serde(rename = "Url")]
    pub url: String,
    pub game_url: String,
    pub room_info: RoomConfig,
    pub user_balance: i64,
}

/// Envelope for operator responses
#[derive(Debug, Clone, Serialize)]
pub struct OperatorResponse<T: Serialize> {
    pub code: u8,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> OperatorResponse<T> {
    pub fn ok(msg: &str, data: T) -> Self {
        Self { code: 1, msg: msg.to_string(), data: Some(data) }
    }

    pub fn failure(msg: &str) -> Self {
        Self { code: 0, msg: msg.to_string(), data: None }
    }
}

/// Launch responses carry their fields at the top level
#[derive(Debug, Clone, Serialize)]
pub struct LaunchResponse {
    pub code: u8,
    pub msg: String,
    #[serde(flatten)]
    pub launch: LaunchData,
}
