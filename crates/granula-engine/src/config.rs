//! Configuration management

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

// ============================================================================
// Engine Configuration Constants
// ============================================================================

/// Default number of concurrent chunk workers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default data rows per chunk.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry, in seconds.
pub const DEFAULT_BASE_BACKOFF_SECS: f64 = 1.0;

/// Default upper bound for any retry delay, in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: f64 = 30.0;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker count, also the global bound on chunks in `processing`
    pub max_concurrency: usize,
    pub chunk_size: u64,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub default_priority: i32,
    /// PostgreSQL store settings; `None` selects the in-memory store
    pub database: Option<DatabaseConfig>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl EngineConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let database = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                )?,
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
            }),
            _ => None,
        };

        let config = EngineConfig {
            max_concurrency: env_or("GRANULA_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?,
            chunk_size: env_or("GRANULA_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            max_retries: env_or("GRANULA_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            base_backoff: env_secs("GRANULA_BASE_BACKOFF", DEFAULT_BASE_BACKOFF_SECS)?,
            max_backoff: env_secs("GRANULA_MAX_BACKOFF", DEFAULT_MAX_BACKOFF_SECS)?,
            default_priority: env_or(
                "GRANULA_DEFAULT_PRIORITY",
                granula_common::types::DEFAULT_PRIORITY,
            )?,
            database,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        use granula_common::types::{MAX_PRIORITY, MIN_PRIORITY};

        if self.max_concurrency == 0 {
            return Err(EngineError::Config(
                "max_concurrency must be greater than 0".into(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk_size must be greater than 0".into()));
        }

        if self.base_backoff.is_zero() || self.max_backoff.is_zero() {
            return Err(EngineError::Config(
                "backoff durations must be greater than 0".into(),
            ));
        }

        if self.base_backoff > self.max_backoff {
            return Err(EngineError::Config(format!(
                "base_backoff ({:?}) cannot be greater than max_backoff ({:?})",
                self.base_backoff, self.max_backoff
            )));
        }

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.default_priority) {
            return Err(EngineError::Config(format!(
                "default_priority must be between {} and {}",
                MIN_PRIORITY, MAX_PRIORITY
            )));
        }

        if let Some(ref db) = self.database {
            if db.max_connections == 0 {
                return Err(EngineError::Config(
                    "Database max_connections must be greater than 0".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = Some(database);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_secs_f64(DEFAULT_BASE_BACKOFF_SECS),
            max_backoff: Duration::from_secs_f64(DEFAULT_MAX_BACKOFF_SECS),
            default_priority: granula_common::types::DEFAULT_PRIORITY,
            database: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> EngineResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: f64) -> EngineResult<Duration> {
    let secs: f64 = env_or(key, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| EngineError::Config(format!("{} must be a non-negative number of seconds", key)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "GRANULA_MAX_CONCURRENCY",
        "GRANULA_CHUNK_SIZE",
        "GRANULA_MAX_RETRIES",
        "GRANULA_BASE_BACKOFF",
        "GRANULA_MAX_BACKOFF",
        "GRANULA_DEFAULT_PRIORITY",
        "DATABASE_URL",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::default()
            .with_max_concurrency(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default().with_chunk_size(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_backoff(Duration::from_secs(5), Duration::from_secs(1))
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_default_priority(11)
            .validate()
            .is_err());
        assert!(EngineConfig::default().with_max_retries(0).validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_reads_environment() {
        clear_env();
        std::env::set_var("GRANULA_MAX_CONCURRENCY", "4");
        std::env::set_var("GRANULA_CHUNK_SIZE", "500");
        std::env::set_var("GRANULA_BASE_BACKOFF", "0.5");
        let config = EngineConfig::load();
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.base_backoff, Duration::from_millis(500));
    }

    #[test]
    #[serial]
    fn test_load_rejects_malformed_value() {
        clear_env();
        std::env::set_var("GRANULA_MAX_RETRIES", "three");
        let result = EngineConfig::load();
        clear_env();

        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
