//! Error types for the GameGateway

use account_service::AccountServiceError;
use thiserror::Error;

/// Errors that can occur in the GameGateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] AccountServiceError),

    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    #[error("Room {room_id} requires a balance of {min_bet}")]
    RoomUnavailable { room_id: u8, min_bet: i64 },

    #[error("Invalid room: {0}")]
    InvalidRoom(u8),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("System error: {0}")]
    System(String),
}

impl GatewayError {
    /// Short fixed message returned to the caller; details stay in the logs
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::Authentication(_) => "Invalid token",
            GatewayError::IdentityNotFound(_) => "User not found",
            GatewayError::Ledger(_) => "Transaction failed",
            GatewayError::AuditWrite(_) | GatewayError::Config(_) | GatewayError::System(_) => {
                "Internal error"
            }
            GatewayError::RoomUnavailable { .. } => "Room not available for your balance level",
            GatewayError::InvalidRoom(_) => "Invalid room",
            GatewayError::InvalidRequest(_) => "Invalid request",
        }
    }
}

/// Result type for GameGateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
