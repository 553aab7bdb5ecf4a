//! Donation input validation

use chrono::NaiveDate;
use compass_core::{Amount, PaymentMethod};
use serde::Deserialize;
use uuid::Uuid;

use super::validation::optional_text;
use super::ValidationError;

const MAX_CHECK_NUMBER_LEN: usize = 30;
const MAX_NOTES_LEN: usize = 1000;

/// Donation body for create
#[derive(Debug, Clone, Deserialize)]
pub struct DonationInput {
    pub donor_id: Option<Uuid>,
    pub amount_cents: i64,
    pub method: String,
    pub check_number: Option<String>,
    pub received_date: NaiveDate,
    pub notes: Option<String>,
}

/// Partial update. `donor_id: null` is not distinguishable from absent,
/// so unlinking uses `clear_donor`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonationPatch {
    pub donor_id: Option<Uuid>,
    #[serde(default)]
    pub clear_donor: bool,
    pub amount_cents: Option<i64>,
    pub method: Option<String>,
    pub check_number: Option<String>,
    pub received_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Validated donation, ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct DonationFields {
    pub donor_id: Option<Uuid>,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub check_number: Option<String>,
    pub received_date: NaiveDate,
    pub notes: Option<String>,
}

pub fn parse_method(s: &str) -> Result<PaymentMethod, ValidationError> {
    s.parse().map_err(|value| ValidationError::InvalidVariant {
        field: "payment method",
        value,
    })
}

pub fn positive_amount(cents: i64) -> Result<Amount, ValidationError> {
    if cents <= 0 {
        return Err(ValidationError::OutOfRange {
            field: "amount",
            reason: "must be positive".to_owned(),
        });
    }
    Ok(Amount::from_cents(cents))
}

impl DonationInput {
    pub fn validate(&self) -> Result<DonationFields, ValidationError> {
        Ok(DonationFields {
            donor_id: self.donor_id,
            amount: positive_amount(self.amount_cents)?,
            method: parse_method(&self.method)?,
            check_number: optional_text("check number", self.check_number.as_deref(), MAX_CHECK_NUMBER_LEN)?,
            received_date: self.received_date,
            notes: optional_text("notes", self.notes.as_deref(), MAX_NOTES_LEN)?,
        })
    }
}

impl DonationFields {
    pub fn apply_patch(&self, patch: DonationPatch) -> Result<DonationFields, ValidationError> {
        let donor_id = if patch.clear_donor {
            None
        } else {
            patch.donor_id.or(self.donor_id)
        };

        DonationInput {
            donor_id,
            amount_cents: patch.amount_cents.unwrap_or(self.amount.cents()),
            method: patch.method.unwrap_or_else(|| self.method.as_str().to_owned()),
            check_number: patch.check_number.or_else(|| self.check_number.clone()),
            received_date: patch.received_date.unwrap_or(self.received_date),
            notes: patch.notes.or_else(|| self.notes.clone()),
        }
        .validate()
    }
}
