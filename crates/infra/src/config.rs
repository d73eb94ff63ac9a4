//! Configuration loading and representation.
//!
//! Everything comes from the process environment:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `DATABASE_URL` | required | Postgres connection string |
//! | `FORGECAT_DB_MAX_CONNECTIONS` | `5` | pool size |
//! | `FORGECAT_DB_ACQUIRE_TIMEOUT_SECS` | `10` | how long to wait for a pooled connection |

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} must be a positive integer (got '{value}')")]
    Invalid { var: &'static str, value: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

// Keeps credentials embedded in the URL out of logs.
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = match lookup("FORGECAT_DB_MAX_CONNECTIONS") {
            Some(raw) => positive("FORGECAT_DB_MAX_CONNECTIONS", &raw)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let acquire_timeout = match lookup("FORGECAT_DB_ACQUIRE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(u64::from(positive("FORGECAT_DB_ACQUIRE_TIMEOUT_SECS", &raw)?)),
            None => DEFAULT_ACQUIRE_TIMEOUT,
        };

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout,
        })
    }
}

fn positive(var: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_url_is_set() {
        let config = StoreConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/cat")])).unwrap();
        assert_eq!(config, StoreConfig::new("postgres://localhost/cat"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/cat"),
            ("FORGECAT_DB_MAX_CONNECTIONS", " 12 "),
            ("FORGECAT_DB_ACQUIRE_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
    }

    #[test]
    fn missing_url_and_bad_numbers_are_errors() {
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
        let err = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/cat"),
            ("FORGECAT_DB_MAX_CONNECTIONS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "FORGECAT_DB_MAX_CONNECTIONS", .. }));
    }

    #[test]
    fn debug_output_hides_the_url() {
        let config = StoreConfig::new("postgres://user:secret@db/cat");
        assert!(!format!("{config:?}").contains("secret"));
    }
}
