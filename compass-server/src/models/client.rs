//! Client code validation
//!
//! Codes are short slugs used in exports and batch names.

use once_cell::sync::Lazy;
use regex::Regex;

use super::validation::required_text;
use super::ValidationError;

const MAX_CLIENT_CODE_LEN: usize = 32;
const MAX_CLIENT_NAME_LEN: usize = 200;

/// Matches DB constraint: ^[a-z0-9][a-z0-9_-]{0,31}$
static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]{0,31}$").expect("invalid client code regex")
});

/// Validated client code (slug format)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientCode(String);

impl ClientCode {
    /// Create a client code, validating slug format.
    ///
    /// # Example
    /// ```
    /// use compass_server::models::ClientCode;
    ///
    /// assert!(ClientCode::new("acme-relief").is_ok());
    /// assert!(ClientCode::new("Acme").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "client code" });
        }

        if s.len() > MAX_CLIENT_CODE_LEN {
            return Err(ValidationError::TooLong {
                field: "client code",
                max: MAX_CLIENT_CODE_LEN,
            });
        }

        if !CODE_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field: "client code",
                reason: "must be lowercase alphanumeric with hyphens/underscores, starting with alphanumeric",
            });
        }

        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn client_name(s: &str) -> Result<String, ValidationError> {
    required_text("client name", s, MAX_CLIENT_NAME_LEN)
}
