//! Ledger entries and the mutations that produce them

use crate::balance::Balance;
use crate::AccountServiceError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    GameWin,
    GameLoss,
    TransferIn,
    TransferOut,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::GameWin => "game_win",
            TransactionKind::GameLoss => "game_loss",
            TransactionKind::TransferIn => "transfer_in",
            TransactionKind::TransferOut => "transfer_out",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = AccountServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "game_win" => Ok(TransactionKind::GameWin),
            "game_loss" => Ok(TransactionKind::GameLoss),
            "transfer_in" => Ok(TransactionKind::TransferIn),
            "transfer_out" => Ok(TransactionKind::TransferOut),
            other => Err(AccountServiceError::Internal {
                message: format!("unknown transaction kind {:?}", other),
            }),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single balance change to apply atomically
#[derive(Debug, Clone)]
pub struct Mutation {
    pub account_id: i64,
    /// Signed: positive credits the account, negative debits it
    pub amount: Balance,
    pub kind: TransactionKind,
    pub meta: serde_json::Value,
}

/// Immutable record of one balance change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: i64,
    pub amount: Balance,
    pub kind: TransactionKind,
    pub meta: serde_json::Value,
    pub balance_after: Balance,
    pub created_at: chrono::NaiveDateTime,
}

/// Outcome of a committed ledger operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub entry: LedgerEntry,
    pub balance_before: Balance,
    pub balance_after: Balance,
}

/// Outcome of a committed transfer between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub debit: Receipt,
    pub credit: Receipt,
}

/// Half-open time window `[from, to)`; a missing end is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl DateRange {
    pub const ALL: DateRange = DateRange { from: None, to: None };

    /// Whole calendar days, both ends inclusive
    pub fn days(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            from: from.and_then(|day| day.and_hms_opt(0, 0, 0)),
            to: to.and_then(|day| day.succ_opt()).and_then(|day| day.and_hms_opt(0, 0, 0)),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}

/// Count and sum of entries of one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTotals {
    pub count: u64,
    pub total: Balance,
}

/// Per-kind summary of an account's ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionReport {
    pub account_id: i64,
    pub range: DateRange,
    pub by_kind: BTreeMap<TransactionKind, KindTotals>,
    pub net: Balance,
}

impl TransactionReport {
    pub fn from_entries(account_id: i64, range: DateRange, entries: &[LedgerEntry]) -> Self {
        let mut report = TransactionReport { account_id, range, ..Default::default() };
        for entry in entries.iter().filter(|entry| range.contains(entry.created_at)) {
            let totals = report.by_kind.entry(entry.kind).or_default();
            totals.count += 1;
            totals.total = totals.total + entry.amount;
            report.net = report.net + entry.amount;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, amount: i64, kind: TransactionKind) -> LedgerEntry {
        LedgerEntry {
            id,
            account_id: 1,
            amount: Balance::from_units(amount),
            kind,
            meta: serde_json::json!({}),
            balance_after: Balance::ZERO,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            TransactionKind::Deposit,
            TransactionKind::Withdraw,
            TransactionKind::GameWin,
            TransactionKind::GameLoss,
            TransactionKind::TransferIn,
            TransactionKind::TransferOut,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>().unwrap(), kind);
        }
        assert!("bonus".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_report_groups_by_kind() {
        let entries = vec![
            entry(1, 1000, TransactionKind::Deposit),
            entry(2, -500, TransactionKind::GameLoss),
            entry(3, 4500, TransactionKind::GameWin),
            entry(4, -200, TransactionKind::GameLoss),
        ];
        let report = TransactionReport::from_entries(1, DateRange::ALL, &entries);

        assert_eq!(report.net, Balance::from_units(4800));
        let losses = report.by_kind[&TransactionKind::GameLoss];
        assert_eq!(losses.count, 2);
        assert_eq!(losses.total, Balance::from_units(-700));
        assert!(!report.by_kind.contains_key(&TransactionKind::TransferIn));
    }

    #[test]
    fn test_day_range_includes_both_days() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let range = DateRange::days(Some(day(10)), Some(day(11)));

        assert!(range.contains(day(10).and_hms_opt(0, 0, 0).unwrap()));
        assert!(range.contains(day(11).and_hms_opt(23, 59, 59).unwrap()));
        assert!(!range.contains(day(12).and_hms_opt(0, 0, 0).unwrap()));
        assert!(!range.contains(day(9).and_hms_opt(23, 59, 59).unwrap()));
        assert!(DateRange::days(None, Some(day(11))).contains(day(1).and_hms_opt(8, 0, 0).unwrap()));
        assert!(DateRange::ALL.contains(day(1).and_hms_opt(8, 0, 0).unwrap()));
    }

    #[test]
    fn test_report_skips_entries_outside_range() {
        let mut old = entry(1, 1000, TransactionKind::Deposit);
        old.created_at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let recent = entry(2, -200, TransactionKind::GameLoss);
        let today = chrono::Utc::now().date_naive();

        let report = TransactionReport::from_entries(
            1,
            DateRange::days(Some(today), Some(today)),
            &[recent, old],
        );
        assert_eq!(report.net, Balance::from_units(-200));
        assert_eq!(report.by_kind.len(), 1);
    }
}
