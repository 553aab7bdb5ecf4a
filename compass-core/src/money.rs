//! Money amounts held as integer cents.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Signed amount in cents. Serialises as a bare integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Parse user-entered money text.
    ///
    /// Accepts an optional leading `-`, an optional `$`, thousands separators
    /// and up to two decimal places.
    ///
    /// ```
    /// use compass_core::Amount;
    ///
    /// assert_eq!(Amount::parse("$1,234.5").unwrap().cents(), 123_450);
    /// assert!(Amount::parse("1.234").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason| CoreError::InvalidAmount {
            value: s.to_owned(),
            reason,
        };

        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rest = rest.strip_prefix('$').unwrap_or(rest);
        let cleaned: String = rest.chars().filter(|c| *c != ',').collect();

        if cleaned.is_empty() {
            return Err(invalid("empty"));
        }

        let (whole, frac) = match cleaned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (cleaned.as_str(), ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a number"));
        }
        if frac.len() > 2 {
            return Err(invalid("more than two decimal places"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("out of range"))?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("not a number"))? * 10,
            _ => frac.parse().map_err(|_| invalid("not a number"))?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl From<i64> for Amount {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Saturates at the `i64` bounds instead of wrapping or panicking.
impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

/// Saturating, like `Add`.
impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_decimal() {
        assert_eq!(Amount::parse("12").unwrap().cents(), 1200);
        assert_eq!(Amount::parse("12.5").unwrap().cents(), 1250);
        assert_eq!(Amount::parse("12.05").unwrap().cents(), 1205);
        assert_eq!(Amount::parse(".75").unwrap().cents(), 75);
        assert_eq!(Amount::parse(" 3 ").unwrap().cents(), 300);
    }

    #[test]
    fn parses_currency_formatting() {
        assert_eq!(Amount::parse("$1,234.56").unwrap().cents(), 123_456);
        assert_eq!(Amount::parse("-3.00").unwrap().cents(), -300);
        assert_eq!(Amount::parse("-$10").unwrap().cents(), -1000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Amount::parse("").is_err());
        assert!(Amount::parse("$").is_err());
        assert!(Amount::parse(".").is_err());
        assert!(Amount::parse("abc").is_err());
        assert!(Amount::parse("1.2.3").is_err());
        assert!(Amount::parse("1.234").is_err());
        assert!(Amount::parse("99999999999999999999").is_err());
    }

    #[test]
    fn display_pads_cents() {
        assert_eq!(Amount::from_cents(123_456).to_string(), "1234.56");
        assert_eq!(Amount::from_cents(5).to_string(), "0.05");
        assert_eq!(Amount::from_cents(-300).to_string(), "-3.00");
    }

    #[test]
    fn sums() {
        let total: Amount = [100, 250, -50].into_iter().map(Amount::from_cents).sum();
        assert_eq!(total.cents(), 300);
    }

    #[test]
    fn arithmetic_saturates() {
        let max = Amount::from_cents(i64::MAX);
        let min = Amount::from_cents(i64::MIN);
        assert_eq!(max + Amount::from_cents(1), max);
        assert_eq!(min - Amount::from_cents(1), min);
        let total: Amount = [max, max, Amount::from_cents(-5)].into_iter().sum();
        assert_eq!(total, Amount::from_cents(i64::MAX - 5));
    }

    #[test]
    fn serializes_as_cents() {
        let json = serde_json::to_string(&Amount::from_cents(2500)).unwrap();
        assert_eq!(json, "2500");
    }
}
