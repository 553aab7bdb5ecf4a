/// Structured error types for compass-core.
///
/// Binary crates (compass-cli) wrap these with `anyhow`, the server maps
/// them onto HTTP responses.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for compass-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Config file could not be parsed
    #[error("Invalid config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Configuration value rejected by validation
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Amount text could not be parsed
    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: &'static str },

    /// Date text could not be parsed
    #[error("Invalid date '{value}': expected YYYY-MM-DD or MM/DD/YYYY")]
    InvalidDate { value: String },

    /// CSV file is unusable as a whole (bad header, unreadable)
    #[error("CSV error: {reason}")]
    Csv { reason: String },
}

/// Result type alias for compass-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a CSV error
    pub fn csv(reason: impl Into<String>) -> Self {
        Self::Csv {
            reason: reason.into(),
        }
    }
}

impl From<csv::Error> for CoreError {
    fn from(e: csv::Error) -> Self {
        Self::csv(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_error_display() {
        let err = CoreError::InvalidAmount {
            value: "abc".into(),
            reason: "not a number",
        };
        assert_eq!(err.to_string(), "Invalid amount 'abc': not a number");
    }

    #[test]
    fn config_helper() {
        let err = CoreError::config("database.url is empty");
        assert!(matches!(err, CoreError::Config { .. }));
        assert_eq!(err.to_string(), "Configuration error: database.url is empty");
    }
}
