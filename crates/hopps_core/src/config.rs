//! Store configuration knobs.
//!
//! # Invariants
//! - Every field has a conservative default so a partial config parses.
//! - `max_append_attempts` and `pool_size` are never zero after validation.

use crate::db::PoolOptions;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_APPEND_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 2;
const DEFAULT_POOL_SIZE: usize = 8;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CHECKOUT_TIMEOUT_MS: u64 = 10_000;

/// Runtime configuration for a [`crate::VersionedStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Ceiling on the compact JSON encoding of one payload.
    pub max_payload_bytes: usize,
    /// Total insert attempts per save before `VersionConflict`.
    pub max_append_attempts: u32,
    /// Base sleep between conflicting attempts; grows linearly per attempt.
    pub retry_backoff_ms: u64,
    pub pool_size: usize,
    pub busy_timeout_ms: u64,
    pub checkout_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_append_attempts: DEFAULT_MAX_APPEND_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            checkout_timeout_ms: DEFAULT_CHECKOUT_TIMEOUT_MS,
        }
    }
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid config `{}`: {}", self.field, self.reason)
    }
}

impl Error for ConfigError {}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_append_attempts == 0 {
            return Err(ConfigError {
                field: "max_append_attempts",
                reason: "at least one attempt is required",
            });
        }
        if self.pool_size == 0 {
            return Err(ConfigError {
                field: "pool_size",
                reason: "pool needs at least one connection",
            });
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError {
                field: "max_payload_bytes",
                reason: "ceiling must be positive",
            });
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Pool options derived from this config.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.pool_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            checkout_timeout: Duration::from_millis(self.checkout_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreConfig, DEFAULT_MAX_APPEND_ATTEMPTS};

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"max_payload_bytes":1024}"#).unwrap();
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.max_append_attempts, DEFAULT_MAX_APPEND_ATTEMPTS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_attempts_and_pool() {
        let no_attempts = StoreConfig {
            max_append_attempts: 0,
            ..StoreConfig::default()
        };
        assert_eq!(no_attempts.validate().unwrap_err().field, "max_append_attempts");

        let no_pool = StoreConfig {
            pool_size: 0,
            ..StoreConfig::default()
        };
        assert_eq!(no_pool.validate().unwrap_err().field, "pool_size");
    }

    #[test]
    fn pool_options_carry_timeouts() {
        let options = StoreConfig::default().pool_options();
        assert_eq!(options.max_size, 8);
        assert_eq!(options.busy_timeout.as_millis(), 5_000);
    }
}
