use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// Centralized configuration for the compass server and CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub matching: MatchingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: SocketAddr,
    /// Allow any origin (development only)
    pub cors_permissive: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_permissive: false,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/compass".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub session_ttl_hours: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            session_ttl_hours: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSection {
    /// Minimum score for a donor to be reported as a possible duplicate
    pub duplicate_threshold: f64,
    pub max_candidates: usize,
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.85,
            max_candidates: 10,
        }
    }
}

impl CompassConfig {
    /// Load config from an explicit path, or ~/.compass/config.toml.
    ///
    /// An explicit path must exist. The default path falls back to built-in
    /// defaults when absent. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!(path = %default_path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.expand_variables();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get config file path: ~/.compass/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".compass/config.toml")
    }

    /// Apply DATABASE_URL, COMPASS_BIND and COMPASS_MAX_CONNECTIONS
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = get("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = url;
        }
        if let Some(bind) = get("COMPASS_BIND") {
            self.server.bind = bind
                .parse()
                .map_err(|_| CoreError::config(format!("COMPASS_BIND is not an address: {}", bind)))?;
        }
        if let Some(max) = get("COMPASS_MAX_CONNECTIONS") {
            self.database.max_connections = max.parse().map_err(|_| {
                CoreError::config(format!("COMPASS_MAX_CONNECTIONS is not a number: {}", max))
            })?;
        }
        Ok(())
    }

    /// Expand ${VAR} references in the database URL (e.g. a password kept in the environment)
    fn expand_variables(&mut self) {
        let vars: HashMap<String, String> = env::vars().collect();
        self.database.url = Self::expand_string(&self.database.url, &vars);
    }

    /// Expand ${var} references in a string
    fn expand_string(s: &str, vars: &HashMap<String, String>) -> String {
        let mut result = s.to_string();

        for (key, value) in vars {
            let pattern = format!("${{{}}}", key);
            result = result.replace(&pattern, value);
        }

        result
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.database.url.trim().is_empty() {
            errors.push("database.url is empty".to_string());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.matching.duplicate_threshold) {
            errors.push(format!(
                "matching.duplicate_threshold must be between 0 and 1 (got {})",
                self.matching.duplicate_threshold
            ));
        }
        if self.auth.session_ttl_hours <= 0 {
            errors.push("auth.session_ttl_hours must be positive".to_string());
        }

        if !errors.is_empty() {
            return Err(CoreError::config(errors.join("; ")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = CompassConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind.port(), 3030);
        assert!(!config.server.cors_permissive);
        assert_eq!(config.matching.duplicate_threshold, 0.85);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"postgres://db/compass\"\n\n[matching]\nmax_candidates = 3"
        )
        .unwrap();

        let config = CompassConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.url, "postgres://db/compass");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.matching.max_candidates, 3);
        assert_eq!(config.auth.session_ttl_hours, 12);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database\nurl = ").unwrap();
        let err = CompassConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse { .. }));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let err = CompassConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[test]
    fn env_overrides() {
        let mut config = CompassConfig::default();
        config
            .apply_env(|key| match key {
                "DATABASE_URL" => Some("postgres://env/compass".into()),
                "COMPASS_BIND" => Some("0.0.0.0:8080".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.database.url, "postgres://env/compass");
        assert_eq!(config.server.bind.port(), 8080);
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut config = CompassConfig::default();
        let err = config
            .apply_env(|key| (key == "COMPASS_MAX_CONNECTIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("COMPASS_MAX_CONNECTIONS"));
    }

    #[test]
    fn validate_collects_errors() {
        let mut config = CompassConfig::default();
        config.database.url = " ".into();
        config.matching.duplicate_threshold = 1.5;
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("database.url"));
        assert!(msg.contains("duplicate_threshold"));
    }

    #[test]
    fn expands_variables() {
        let mut vars = HashMap::new();
        vars.insert("PGPASS".to_string(), "s3cret".to_string());
        let out = CompassConfig::expand_string("postgres://app:${PGPASS}@db/compass", &vars);
        assert_eq!(out, "postgres://app:s3cret@db/compass");
    }
}
