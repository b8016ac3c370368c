//! Fixed-point currency stored as integer thousandths of a display unit.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of stored thousandths that make one display unit.
pub const THOUSANDTHS_PER_UNIT: i64 = 1_000;

/// Errors produced by money arithmetic and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Subtraction would leave a negative amount.
    #[error("cannot subtract {amount} from {balance}")]
    Underflow {
        /// Amount before the subtraction.
        balance: Money,
        /// Amount that was to be removed.
        amount: Money,
    },
    /// The result does not fit in 64 bits.
    #[error("money arithmetic overflowed")]
    Overflow,
    /// Input text is not a money amount.
    #[error("invalid money amount '{0}'")]
    Parse(String),
}

/// Currency amount in thousandths (`50_000_000` is `50,000.000`).
///
/// All arithmetic is exact integer arithmetic; floating point is never used.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero money.
    pub const ZERO: Money = Money(0);

    /// Wrap a raw amount of thousandths.
    pub const fn from_thousandths(thousandths: i64) -> Self {
        Self(thousandths)
    }

    /// Raw amount of thousandths.
    pub const fn thousandths(self) -> i64 {
        self.0
    }

    /// Build an amount from whole display units.
    pub fn from_units(units: i64) -> Result<Self, MoneyError> {
        units
            .checked_mul(THOUSANDTHS_PER_UNIT)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// True when the amount is strictly above zero.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True when the amount is below zero.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Add two amounts.
    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Subtract `amount`, failing with [`MoneyError::Underflow`] if the result would be negative.
    pub fn checked_sub(self, amount: Money) -> Result<Money, MoneyError> {
        match self.0.checked_sub(amount.0) {
            Some(value) if value >= 0 => Ok(Money(value)),
            Some(_) => Err(MoneyError::Underflow {
                balance: self,
                amount,
            }),
            None => Err(MoneyError::Overflow),
        }
    }

    /// Multiply by an integer count, e.g. pack count × pack price.
    pub fn checked_mul(self, count: u64) -> Result<Money, MoneyError> {
        let count = i64::try_from(count).map_err(|_| MoneyError::Overflow)?;
        self.0
            .checked_mul(count)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// How many whole `price` amounts fit into `self`. Zero for non-positive balances.
    ///
    /// Returns `None` if `price` is not positive.
    pub fn whole_multiples_of(self, price: Money) -> Option<u64> {
        if !price.is_positive() {
            return None;
        }
        if !self.is_positive() {
            return Some(0);
        }
        // both operands positive, so the quotient is non-negative and fits
        Some((self.0 / price.0) as u64)
    }

    /// Three decimals with `,` grouping, e.g. `50,000.000`.
    pub fn to_display_string(&self) -> String {
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / THOUSANDTHS_PER_UNIT as u64;
        let fraction = magnitude % THOUSANDTHS_PER_UNIT as u64;

        let digits = whole.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 6);
        if self.is_negative() {
            grouped.push('-');
        }
        for (index, ch) in digits.chars().enumerate() {
            if index > 0 && (digits.len() - index) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("{grouped}.{fraction:03}")
    }

    /// Parse a display string, rounding to the nearest thousandth (half away from zero).
    ///
    /// Accepts grouped (`1,234.5`) or plain (`1234.5`) forms, an optional leading `-`
    /// and an optional `$` prefix.
    pub fn parse_display_string(input: &str) -> Result<Money, MoneyError> {
        static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(-)?\$?([0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)(?:\.([0-9]+))?$")
                .expect("invalid money regex")
        });

        let trimmed = input.trim();
        let caps = MONEY_RE
            .captures(trimmed)
            .ok_or_else(|| MoneyError::Parse(input.to_string()))?;

        let negative = caps.get(1).is_some();
        let whole_digits = caps.get(2).map(|m| m.as_str()).unwrap_or("0").replace(',', "");
        let fraction_digits = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        // the pattern only admits ASCII digits, so byte arithmetic is exact
        let whole: u64 = whole_digits.parse().map_err(|_| MoneyError::Overflow)?;

        let mut fraction: u64 = 0;
        for (index, digit) in fraction_digits.bytes().take(3).enumerate() {
            fraction += u64::from(digit - b'0') * 10_u64.pow(2 - index as u32);
        }
        if fraction_digits.bytes().nth(3).is_some_and(|digit| digit >= b'5') {
            fraction += 1;
        }

        // magnitude is unsigned so that i64::MIN, whose magnitude exceeds i64::MAX, still parses
        let magnitude = whole
            .checked_mul(THOUSANDTHS_PER_UNIT as u64)
            .and_then(|value| value.checked_add(fraction))
            .ok_or(MoneyError::Overflow)?;

        let signed = if negative {
            0_i64.checked_sub_unsigned(magnitude)
        } else {
            i64::try_from(magnitude).ok()
        };
        signed.map(Money).ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse_display_string(s)
    }
}
