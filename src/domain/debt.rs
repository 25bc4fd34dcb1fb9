use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of digits after the decimal point.
const SCALE: u32 = 2;
const CENTS_PER_UNIT: i64 = 10_i64.pow(SCALE);

/// An amount owed by a unit to its supplier.
///
/// Stored as a fixed-point number with two decimal places. The core never
/// interprets the value; it is carried through reads and only changed by
/// administrative actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Debt {
    cents: i64,
}

impl Debt {
    /// A debt of zero.
    pub const ZERO: Self = Self { cents: 0 };

    /// Create a debt from an amount in hundredths.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// The amount in hundredths.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.cents
    }

    /// Whether the debt is exactly zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.cents == 0
    }

    /// Total number of significant digits, counting the two decimal places.
    ///
    /// `1234.50` has six digits, `0.00` has two.
    #[must_use]
    pub const fn digits(self) -> u32 {
        let whole = self.cents.unsigned_abs() / CENTS_PER_UNIT.unsigned_abs();
        let whole_digits = if whole == 0 { 0 } else { whole.ilog10() + 1 };
        whole_digits + SCALE
    }
}

impl fmt::Display for Debt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        let per = CENTS_PER_UNIT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

/// Error returned when a string is not a valid debt amount.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid amount '{0}': expected a decimal number with at most 2 decimal places")]
pub struct InvalidDebtError(String);

impl FromStr for Debt {
    type Err = InvalidDebtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDebtError(s.to_string());
        let trimmed = s.trim();

        let (negative, unsigned) = trimmed.strip_prefix('-').map_or_else(
            || (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
            |rest| (true, rest),
        );

        let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if fraction.len() > SCALE as usize {
            return Err(invalid());
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: i64 = format!("{fraction:0<2}").parse().map_err(|_| invalid())?;

        let cents = whole
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(invalid)?;

        Ok(Self::from_cents(if negative { -cents } else { cents }))
    }
}

impl Serialize for Debt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Debt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
