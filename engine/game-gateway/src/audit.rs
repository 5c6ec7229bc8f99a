//! Bet audit log
//!
//! One record per committed provider balance change. Records are written after
//! the ledger commit; a failed write is the caller's to log, never to undo.

use crate::error::{GatewayError, GatewayResult};
use account_service::{Balance, DateRange};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Status written for every settled provider call
pub const STATUS_COMPLETED: &str = "completed";

/// Audit record before it is assigned an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBetRecord {
    pub member_account: String,
    pub player_id: i64,
    pub parent_id: Option<i64>,
    pub provider_game_id: i64,
    pub bet_amount: Balance,
    pub win_amount: Balance,
    pub change_amount: Balance,
    pub before_balance: Balance,
    pub after_balance: Balance,
    /// Raw provider request
    pub payload: serde_json::Value,
    pub game_name: String,
    pub status: String,
    pub request_time: chrono::NaiveDateTime,
}

/// Stored audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetAuditRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewBetRecord,
}

/// Result of a spin as seen from the player's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Win,
    Lose,
    Draw,
}

impl BetOutcome {
    pub fn of(change: Balance) -> Self {
        if change.is_positive() {
            BetOutcome::Win
        } else if change.is_negative() {
            BetOutcome::Lose
        } else {
            BetOutcome::Draw
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BetOutcome::Win => "win",
            BetOutcome::Lose => "lose",
            BetOutcome::Draw => "draw",
        }
    }
}

impl std::str::FromStr for BetOutcome {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win" => Ok(BetOutcome::Win),
            "lose" | "loss" => Ok(BetOutcome::Lose),
            "draw" => Ok(BetOutcome::Draw),
            other => Err(GatewayError::InvalidRequest(format!("unknown bet outcome {:?}", other))),
        }
    }
}

/// Which audit records a query covers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BetFilter {
    /// Only this member; every member when `None`
    pub member_account: Option<String>,
    /// Matched against `request_time`
    pub range: DateRange,
    pub outcome: Option<BetOutcome>,
}

impl BetFilter {
    pub fn member(member_account: impl Into<String>) -> Self {
        Self { member_account: Some(member_account.into()), ..Default::default() }
    }

    pub fn matches(&self, record: &NewBetRecord) -> bool {
        self.member_account.as_deref().map_or(true, |m| m == record.member_account)
            && self.range.contains(record.request_time)
            && self.outcome.map_or(true, |o| o == BetOutcome::of(record.change_amount))
    }
}

/// Per-member totals over a set of audit records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBetSummary {
    pub member_account: String,
    pub count: u64,
    pub total_bet: Balance,
    pub total_win: Balance,
    /// Sum of signed balance changes
    pub net: Balance,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
}

impl MemberBetSummary {
    fn add(&mut self, record: &NewBetRecord) {
        self.count += 1;
        self.total_bet = self.total_bet + record.bet_amount;
        self.total_win = self.total_win + record.win_amount;
        self.net = self.net + record.change_amount;
        match BetOutcome::of(record.change_amount) {
            BetOutcome::Win => self.wins += 1,
            BetOutcome::Lose => self.losses += 1,
            BetOutcome::Draw => self.draws += 1,
        }
    }
}

#[async_trait::async_trait]
pub trait BetAuditLog: Send + Sync {
    async fn record(&self, record: NewBetRecord) -> GatewayResult<BetAuditRecord>;

    /// Most recent records matching `filter`, newest first
    async fn recent_for(&self, filter: &BetFilter, limit: u32)
        -> GatewayResult<Vec<BetAuditRecord>>;

    /// Totals per member of the records matching `filter`, ordered by member
    async fn summary(&self, filter: &BetFilter) -> GatewayResult<Vec<MemberBetSummary>>;
}

/// In-memory audit log (for tests and local development)
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<BetAuditRecord>>,
    next_id: AtomicI64,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait::async_trait]
impl BetAuditLog for InMemoryAuditLog {
    async fn record(&self, record: NewBetRecord) -> GatewayResult<BetAuditRecord> {
        let stored =
            BetAuditRecord { id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1, record };
        self.records.write().push(stored.clone());
        Ok(stored)
    }

    async fn recent_for(
        &self,
        filter: &BetFilter,
        limit: u32,
    ) -> GatewayResult<Vec<BetAuditRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| filter.matches(&r.record))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn summary(&self, filter: &BetFilter) -> GatewayResult<Vec<MemberBetSummary>> {
        let mut by_member: BTreeMap<String, MemberBetSummary> = BTreeMap::new();
        for stored in self.records.read().iter().filter(|r| filter.matches(&r.record)) {
            let member = &stored.record.member_account;
            by_member
                .entry(member.clone())
                .or_insert_with(|| MemberBetSummary {
                    member_account: member.clone(),
                    ..Default::default()
                })
                .add(&stored.record);
        }
        Ok(by_member.into_values().collect())
    }
}

/// Audit log backed by Postgres
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    /// Connect, then run the audit migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> GatewayResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| GatewayError::System(format!("Audit database unavailable: {}", e)))?;

        // Shares the database with the ledger migrations
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|e| GatewayError::System(format!("Audit migration failed: {}", e)))?;

        Ok(Self { pool })
    }
}

fn write_failed(err: sqlx::Error) -> GatewayError {
    GatewayError::AuditWrite(err.to_string())
}

fn query_failed(err: sqlx::Error) -> GatewayError {
    GatewayError::System(format!("Audit query failed: {}", err))
}

/// Filter clause over `$1` member, `$2`/`$3` range and `$4` outcome
const FILTER_CLAUSE: &str = "($1::text IS NULL OR member_account = $1)
       AND ($2::timestamp IS NULL OR request_time >= $2)
       AND ($3::timestamp IS NULL OR request_time < $3)
       AND ($4::text IS NULL
            OR ($4 = 'win' AND change_amount > 0)
            OR ($4 = 'lose' AND change_amount < 0)
            OR ($4 = 'draw' AND change_amount = 0))";

const RECORD_COLUMNS: &str = "id, member_account, player_id, parent_id, provider_game_id, \
     bet_amount, win_amount, change_amount, before_balance, after_balance, payload, game_name, \
     status, request_time";

fn record_from_row(row: &PgRow) -> Result<BetAuditRecord, sqlx::Error> {
    Ok(BetAuditRecord {
        id: row.try_get("id")?,
        record: NewBetRecord {
            member_account: row.try_get("member_account")?,
            player_id: row.try_get("player_id")?,
            parent_id: row.try_get("parent_id")?,
            provider_game_id: row.try_get("provider_game_id")?,
            bet_amount: Balance::from_cents(row.try_get("bet_amount")?),
            win_amount: Balance::from_cents(row.try_get("win_amount")?),
            change_amount: Balance::from_cents(row.try_get("change_amount")?),
            before_balance: Balance::from_cents(row.try_get("before_balance")?),
            after_balance: Balance::from_cents(row.try_get("after_balance")?),
            payload: row.try_get("payload")?,
            game_name: row.try_get("game_name")?,
            status: row.try_get("status")?,
            request_time: row.try_get("request_time")?,
        },
    })
}

fn summary_from_row(row: &PgRow) -> Result<MemberBetSummary, sqlx::Error> {
    let count = |column: &str| row.try_get::<i64, _>(column).map(|n| n.max(0) as u64);
    Ok(MemberBetSummary {
        member_account: row.try_get("member_account")?,
        count: count("count")?,
        total_bet: Balance::from_cents(row.try_get("total_bet")?),
        total_win: Balance::from_cents(row.try_get("total_win")?),
        net: Balance::from_cents(row.try_get("net")?),
        wins: count("wins")?,
        losses: count("losses")?,
        draws: count("draws")?,
    })
}

#[async_trait::async_trait]
impl BetAuditLog for PgAuditLog {
    async fn record(&self, record: NewBetRecord) -> GatewayResult<BetAuditRecord> {
        let query = format!(
            "INSERT INTO bet_audit_log (member_account, player_id, parent_id, provider_game_id,
                 bet_amount, win_amount, change_amount, before_balance, after_balance, payload,
                 game_name, status, request_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {}",
            RECORD_COLUMNS
        );
        let stored = sqlx::query(&query)
            .bind(&record.member_account)
            .bind(record.player_id)
            .bind(record.parent_id)
            .bind(record.provider_game_id)
            .bind(record.bet_amount.to_cents())
            .bind(record.win_amount.to_cents())
            .bind(record.change_amount.to_cents())
            .bind(record.before_balance.to_cents())
            .bind(record.after_balance.to_cents())
            .bind(&record.payload)
            .bind(&record.game_name)
            .bind(&record.status)
            .bind(record.request_time)
            .fetch_one(&self.pool)
            .await
            .and_then(|row| record_from_row(&row))
            .map_err(write_failed)?;
        Ok(stored)
    }

    async fn recent_for(
        &self,
        filter: &BetFilter,
        limit: u32,
    ) -> GatewayResult<Vec<BetAuditRecord>> {
        let query = format!(
            "SELECT {} FROM bet_audit_log WHERE {} ORDER BY id DESC LIMIT $5",
            RECORD_COLUMNS, FILTER_CLAUSE
        );
        let rows = sqlx::query(&query)
            .bind(filter.member_account.as_deref())
            .bind(filter.range.from)
            .bind(filter.range.to)
            .bind(filter.outcome.map(BetOutcome::as_str))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(record_from_row).collect::<Result<Vec<_>, _>>().map_err(query_failed)
    }

    async fn summary(&self, filter: &BetFilter) -> GatewayResult<Vec<MemberBetSummary>> {
        let query = format!(
            "SELECT member_account,
                    COUNT(*) AS count,
                    COALESCE(SUM(bet_amount), 0)::BIGINT AS total_bet,
                    COALESCE(SUM(win_amount), 0)::BIGINT AS total_win,
                    COALESCE(SUM(change_amount), 0)::BIGINT AS net,
                    COUNT(*) FILTER (WHERE change_amount > 0) AS wins,
                    COUNT(*) FILTER (WHERE change_amount < 0) AS losses,
                    COUNT(*) FILTER (WHERE change_amount = 0) AS draws
             FROM bet_audit_log WHERE {}
             GROUP BY member_account ORDER BY member_account",
            FILTER_CLAUSE
        );
        let rows = sqlx::query(&query)
            .bind(filter.member_account.as_deref())
            .bind(filter.range.from)
            .bind(filter.range.to)
            .bind(filter.outcome.map(BetOutcome::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(summary_from_row).collect::<Result<Vec<_>, _>>().map_err(query_failed)
    }
}
