//! Batch status and naming

use std::fmt;

use serde::Serialize;

use super::validation::required_text;
use super::ValidationError;

const MAX_BATCH_NAME_LEN: usize = 120;

/// Lifecycle of a batch: donations can only change while it is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Open,
    Closed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for BatchStatus {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(ValidationError::InvalidVariant {
                field: "batch status",
                value,
            }),
        }
    }
}

pub fn batch_name(s: &str) -> Result<String, ValidationError> {
    required_text("batch name", s, MAX_BATCH_NAME_LEN)
}
