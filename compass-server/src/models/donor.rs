//! Donor field validation
//!
//! Create and update requests both end up as a full [`DonorFields`], so the
//! same checks apply whichever way a record was written.

use compass_core::matching::DonorProfile;
use serde::Deserialize;

use super::validation::{optional_text, required_text};
use super::ValidationError;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;
const MAX_PHONE_LEN: usize = 30;
const MAX_ADDRESS_LEN: usize = 200;
const MAX_CITY_LEN: usize = 100;
const MAX_POSTAL_LEN: usize = 10;

/// Donor fields as submitted (create body, or import row)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonorInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// Partial update; a blank string clears an optional field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonorPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// Validated donor fields, ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct DonorFields {
    pub first_name: Option<String>,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

impl DonorInput {
    pub fn validate(&self) -> Result<DonorFields, ValidationError> {
        Ok(DonorFields {
            first_name: optional_text("first name", self.first_name.as_deref(), MAX_NAME_LEN)?,
            last_name: required_text(
                "last name",
                self.last_name.as_deref().unwrap_or_default(),
                MAX_NAME_LEN,
            )?,
            email: validate_email(self.email.as_deref())?,
            phone: optional_text("phone", self.phone.as_deref(), MAX_PHONE_LEN)?,
            address1: optional_text("address", self.address1.as_deref(), MAX_ADDRESS_LEN)?,
            city: optional_text("city", self.city.as_deref(), MAX_CITY_LEN)?,
            state: validate_state(self.state.as_deref())?,
            postal_code: optional_text("postal code", self.postal_code.as_deref(), MAX_POSTAL_LEN)?,
        })
    }

    /// Fields used for duplicate matching (not validated)
    pub fn profile(&self) -> DonorProfile {
        DonorProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            postal_code: self.postal_code.clone(),
            address1: self.address1.clone(),
        }
    }
}

impl DonorFields {
    /// Merge a patch over the current values and re-validate.
    pub fn apply_patch(&self, patch: DonorPatch) -> Result<DonorFields, ValidationError> {
        let pick = |new: Option<String>, old: &Option<String>| new.or_else(|| old.clone());
        DonorInput {
            first_name: pick(patch.first_name, &self.first_name),
            last_name: Some(patch.last_name.unwrap_or_else(|| self.last_name.clone())),
            email: pick(patch.email, &self.email),
            phone: pick(patch.phone, &self.phone),
            address1: pick(patch.address1, &self.address1),
            city: pick(patch.city, &self.city),
            state: pick(patch.state, &self.state),
            postal_code: pick(patch.postal_code, &self.postal_code),
        }
        .validate()
    }
}

/// One `@` with something on each side.
fn validate_email(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(email) = optional_text("email", value, MAX_EMAIL_LEN)? else {
        return Ok(None);
    };

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(Some(email))
        }
        _ => Err(ValidationError::InvalidFormat {
            field: "email",
            reason: "must have one @ with a name and a domain",
        }),
    }
}

fn validate_state(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    match optional_text("state", value, 2)? {
        Some(s) if s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(Some(s.to_ascii_uppercase()))
        }
        Some(_) => Err(ValidationError::InvalidFormat {
            field: "state",
            reason: "must be a two-letter state code",
        }),
        None => Ok(None),
    }
}
