//! GameGateway - Buffalo provider adapter
//!
//! This module provides the provider-facing interface of the platform: UID and
//! token identity, balance query and balance change callbacks, room
//! eligibility, launch URLs and the bet audit log.

pub mod audit;
pub mod config;
pub mod error;
pub mod messages;
pub mod provider;
pub mod rest_api;
pub mod rooms;
pub mod token;
pub mod uid;

pub use audit::{
    BetAuditLog, BetAuditRecord, BetFilter, BetOutcome, InMemoryAuditLog, MemberBetSummary,
    PgAuditLog,
};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use provider::BuffaloService;

