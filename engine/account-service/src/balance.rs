//! Balance type for wallet amounts

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// Number of minor units in one whole unit
pub const CENTS_PER_UNIT: i64 = 100;

/// Balance represents a signed monetary amount in minor units (1/100th of a unit)
///
/// Game providers exchange whole units only; the two extra decimal places keep
/// agent transfers and manual adjustments exact.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Balance {
    /// Amount in minor units
    pub cents: i64,
}

impl Balance {
    pub const ZERO: Balance = Balance { cents: 0 };

    /// Create a balance from minor units
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Create a balance from whole units, saturating at the representable range
    pub fn from_units(units: i64) -> Self {
        Self { cents: units.saturating_mul(CENTS_PER_UNIT) }
    }

    /// Create a balance from whole units, or `None` if it does not fit
    pub fn checked_from_units(units: i64) -> Option<Self> {
        units.checked_mul(CENTS_PER_UNIT).map(Self::from_cents)
    }

    /// Get the value in minor units
    pub fn to_cents(self) -> i64 {
        self.cents
    }

    /// Get the value as a decimal with two places
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.cents, 2)
    }

    /// Create from decimal; `None` if it has more than two places or does not fit
    pub fn from_decimal(decimal: Decimal) -> Option<Self> {
        if decimal.normalize().scale() > 2 {
            return None;
        }
        decimal
            .checked_mul(Decimal::from(CENTS_PER_UNIT))
            .and_then(|cents| cents.to_i64())
            .map(Self::from_cents)
    }

    /// Whole units, fractional part truncated toward zero
    pub fn to_units_truncated(self) -> i64 {
        self.cents / CENTS_PER_UNIT
    }

    pub fn is_zero(self) -> bool {
        self.cents == 0
    }

    pub fn is_positive(self) -> bool {
        self.cents > 0
    }

    pub fn is_negative(self) -> bool {
        self.cents < 0
    }

    pub fn abs(self) -> Self {
        Self { cents: self.cents.saturating_abs() }
    }

    /// Addition that reports overflow instead of wrapping
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.cents.checked_add(other.cents).map(Self::from_cents)
    }

    /// Subtraction that reports overflow instead of wrapping
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.cents.checked_sub(other.cents).map(Self::from_cents)
    }
}

impl Add for Balance {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self { cents: self.cents + other.cents }
    }
}

impl Sub for Balance {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self { cents: self.cents - other.cents }
    }
}

impl Neg for Balance {
    type Output = Self;

    fn neg(self) -> Self {
        Self { cents: -self.cents }
    }
}

impl std::iter::Sum for Balance {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Balance::ZERO, |acc, amount| acc + amount)
    }
}

/// Failure to parse a decimal amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount {0:?}: expected units with at most two decimals")]
pub struct ParseBalanceError(pub String);

impl FromStr for Balance {
    type Err = ParseBalanceError;

    /// Parse `"1234"`, `"-0.5"` or `"12.34"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .ok()
            .and_then(Balance::from_decimal)
            .ok_or_else(|| ParseBalanceError(s.to_string()))
    }
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.to_decimal().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_creation() {
        let balance = Balance::from_units(1000);
        assert_eq!(balance.cents, 100_000);
        assert_eq!(balance.to_units_truncated(), 1000);
    }

    #[test]
    fn test_balance_arithmetic() {
        let a = Balance::from_units(100);
        let b = Balance::from_units(50);

        assert_eq!(a + b, Balance::from_units(150));
        assert_eq!(a - b, Balance::from_units(50));
        assert_eq!(-a, Balance::from_units(-100));
        assert_eq!(vec![a, b, -b].into_iter().sum::<Balance>(), a);
    }

    #[test]
    fn test_truncation_drops_fraction() {
        assert_eq!(Balance::from_cents(123_499).to_units_truncated(), 1234);
        assert_eq!(Balance::from_cents(99).to_units_truncated(), 0);
        assert_eq!(Balance::from_cents(-150).to_units_truncated(), -1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Balance::from_cents(500_050).to_string(), "5000.50");
        assert_eq!(Balance::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Balance::ZERO.to_string(), "0.00");
        assert_eq!(format!("{:>8}", Balance::from_units(12)), "   12.00");
    }

    #[test]
    fn test_decimal_conversion() {
        let balance = Balance::from_cents(12_345);
        assert_eq!(balance.to_decimal(), Decimal::new(12_345, 2));
        assert_eq!(Balance::from_decimal(balance.to_decimal()), Some(balance));
        assert_eq!(Balance::from_decimal(Decimal::new(1_001, 3)), None);
        assert_eq!(Balance::from_decimal(Decimal::MAX), None);
    }

    #[test]
    fn test_checked_from_units() {
        assert_eq!(Balance::checked_from_units(-500), Some(Balance::from_cents(-50_000)));
        assert_eq!(Balance::checked_from_units(100_000_000_000_000_000), None);
        assert_eq!(Balance::checked_from_units(i64::MIN), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("1000".parse::<Balance>().unwrap(), Balance::from_units(1000));
        assert_eq!("12.3".parse::<Balance>().unwrap(), Balance::from_cents(1230));
        assert_eq!("-0.05".parse::<Balance>().unwrap(), Balance::from_cents(-5));
        assert_eq!(" 7.25 ".parse::<Balance>().unwrap(), Balance::from_cents(725));
        assert_eq!("1.500".parse::<Balance>().unwrap(), Balance::from_cents(150));
        for bad in ["", "-", "1.234", "1e3", "abc", "1.-5", "99999999999999999999"] {
            assert!(bad.parse::<Balance>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_checked_arithmetic() {
        let max = Balance::from_cents(i64::MAX);
        assert!(max.checked_add(Balance::from_cents(1)).is_none());
        assert_eq!(
            Balance::from_cents(10).checked_sub(Balance::from_cents(4)),
            Some(Balance::from_cents(6))
        );
    }
}
