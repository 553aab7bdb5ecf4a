//! Client processing policies applied to each donation before it is saved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::money::Amount;
use crate::payment::PaymentMethod;

/// Stored policy kind (one row per client and kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RequireCheckNumber,
    MinimumAmount,
    MaximumAmount,
    RequireDonor,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequireCheckNumber => "require_check_number",
            Self::MinimumAmount => "minimum_amount",
            Self::MaximumAmount => "maximum_amount",
            Self::RequireDonor => "require_donor",
        }
    }

    /// Whether the policy carries an amount
    pub fn needs_amount(&self) -> bool {
        matches!(self, Self::MinimumAmount | Self::MaximumAmount)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "require_check_number" => Ok(Self::RequireCheckNumber),
            "minimum_amount" => Ok(Self::MinimumAmount),
            "maximum_amount" => Ok(Self::MaximumAmount),
            "require_donor" => Ok(Self::RequireDonor),
            other => Err(other.to_owned()),
        }
    }
}

impl TryFrom<String> for PolicyKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An enabled rule ready for evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRule {
    RequireCheckNumber,
    MinimumAmount(Amount),
    MaximumAmount(Amount),
    RequireDonor,
}

impl PolicyRule {
    /// Build a rule from its stored form. Amount kinds without an amount yield `None`.
    pub fn from_stored(kind: PolicyKind, amount: Option<Amount>) -> Option<Self> {
        match kind {
            PolicyKind::RequireCheckNumber => Some(Self::RequireCheckNumber),
            PolicyKind::RequireDonor => Some(Self::RequireDonor),
            PolicyKind::MinimumAmount => amount.map(Self::MinimumAmount),
            PolicyKind::MaximumAmount => amount.map(Self::MaximumAmount),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::RequireCheckNumber => PolicyKind::RequireCheckNumber,
            Self::MinimumAmount(_) => PolicyKind::MinimumAmount,
            Self::MaximumAmount(_) => PolicyKind::MaximumAmount,
            Self::RequireDonor => PolicyKind::RequireDonor,
        }
    }
}

/// What a donation looks like before it is written
#[derive(Debug, Clone)]
pub struct DonationDraft<'a> {
    pub amount: Amount,
    pub method: PaymentMethod,
    pub check_number: Option<&'a str>,
    pub has_donor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub policy: PolicyKind,
    pub message: String,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.policy, self.message)
    }
}

/// Check a draft against every rule, returning all violations.
pub fn evaluate(rules: &[PolicyRule], draft: &DonationDraft<'_>) -> Vec<PolicyViolation> {
    rules
        .iter()
        .filter_map(|rule| {
            let message = match rule {
                PolicyRule::RequireCheckNumber => {
                    let missing = draft.check_number.map_or(true, |n| n.trim().is_empty());
                    (draft.method == PaymentMethod::Check && missing)
                        .then(|| "check donations need a check number".to_owned())
                }
                PolicyRule::MinimumAmount(min) => (draft.amount < *min)
                    .then(|| format!("amount {} is below the minimum of {}", draft.amount, min)),
                PolicyRule::MaximumAmount(max) => (draft.amount > *max)
                    .then(|| format!("amount {} exceeds the maximum of {}", draft.amount, max)),
                PolicyRule::RequireDonor => {
                    (!draft.has_donor).then(|| "donation must be linked to a donor".to_owned())
                }
            };
            message.map(|message| PolicyViolation {
                policy: rule.kind(),
                message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(cents: i64, method: PaymentMethod, check: Option<&str>) -> DonationDraft<'_> {
        DonationDraft {
            amount: Amount::from_cents(cents),
            method,
            check_number: check,
            has_donor: true,
        }
    }

    #[test]
    fn no_rules_no_violations() {
        assert!(evaluate(&[], &draft(100, PaymentMethod::Check, None)).is_empty());
    }

    #[test]
    fn check_number_only_applies_to_checks() {
        let rules = [PolicyRule::RequireCheckNumber];
        assert_eq!(evaluate(&rules, &draft(100, PaymentMethod::Check, None)).len(), 1);
        assert_eq!(evaluate(&rules, &draft(100, PaymentMethod::Check, Some("  "))).len(), 1);
        assert!(evaluate(&rules, &draft(100, PaymentMethod::Check, Some("1001"))).is_empty());
        assert!(evaluate(&rules, &draft(100, PaymentMethod::Cash, None)).is_empty());
    }

    #[test]
    fn amount_bounds_are_inclusive() {
        let rules = [
            PolicyRule::MinimumAmount(Amount::from_cents(500)),
            PolicyRule::MaximumAmount(Amount::from_cents(10_000)),
        ];
        assert!(evaluate(&rules, &draft(500, PaymentMethod::Cash, None)).is_empty());
        assert!(evaluate(&rules, &draft(10_000, PaymentMethod::Cash, None)).is_empty());

        let low = evaluate(&rules, &draft(499, PaymentMethod::Cash, None));
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].policy, PolicyKind::MinimumAmount);
        assert_eq!(low[0].message, "amount 4.99 is below the minimum of 5.00");

        let high = evaluate(&rules, &draft(10_001, PaymentMethod::Cash, None));
        assert_eq!(high[0].policy, PolicyKind::MaximumAmount);
    }

    #[test]
    fn collects_every_violation() {
        let rules = [
            PolicyRule::RequireCheckNumber,
            PolicyRule::RequireDonor,
            PolicyRule::MinimumAmount(Amount::from_cents(1000)),
        ];
        let mut d = draft(100, PaymentMethod::Check, None);
        d.has_donor = false;
        assert_eq!(evaluate(&rules, &d).len(), 3);
    }

    #[test]
    fn from_stored_needs_amount_for_bounds() {
        assert_eq!(PolicyRule::from_stored(PolicyKind::MinimumAmount, None), None);
        assert_eq!(
            PolicyRule::from_stored(PolicyKind::MaximumAmount, Some(Amount::from_cents(5))),
            Some(PolicyRule::MaximumAmount(Amount::from_cents(5)))
        );
        assert!(PolicyKind::MinimumAmount.needs_amount());
        assert!(!PolicyKind::RequireDonor.needs_amount());
    }

    #[test]
    fn kind_parses_from_path_segment() {
        assert_eq!("require_donor".parse::<PolicyKind>(), Ok(PolicyKind::RequireDonor));
        assert!("nope".parse::<PolicyKind>().is_err());
    }
}
