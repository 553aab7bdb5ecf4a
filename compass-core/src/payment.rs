//! Payment methods accepted on a donation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Check,
    Cash,
    Card,
    Ach,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Cash => "cash",
            Self::Card => "card",
            Self::Ach => "ach",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "check" | "cheque" | "chk" => Ok(Self::Check),
            "cash" => Ok(Self::Cash),
            "card" | "credit" | "credit card" => Ok(Self::Card),
            "ach" | "eft" => Ok(Self::Ach),
            "other" => Ok(Self::Other),
            other => Err(other.to_owned()),
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("CHK".parse::<PaymentMethod>(), Ok(PaymentMethod::Check));
        assert_eq!(" Credit Card".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert_eq!("eft".parse::<PaymentMethod>(), Ok(PaymentMethod::Ach));
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn round_trips_through_as_str() {
        for m in [
            PaymentMethod::Check,
            PaymentMethod::Cash,
            PaymentMethod::Card,
            PaymentMethod::Ach,
            PaymentMethod::Other,
        ] {
            assert_eq!(m.as_str().parse::<PaymentMethod>(), Ok(m));
        }
    }
}
