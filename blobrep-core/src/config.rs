//! Runtime configuration values passed into the storage layer at construction.

use crate::{BlobError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Production,
    Test,
    Development,
}

impl ServerMode {
    /// Development surfaces storage failures instead of degrading them.
    pub fn fails_fast(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for ServerMode {
    type Err = BlobError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            "development" => Ok(Self::Development),
            other => Err(BlobError::Config(format!(
                "unsupported server mode '{}': expected production | test | development",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub enabled: bool,
    pub mode: ServerMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ServerMode::Production,
        }
    }
}

impl StorageConfig {
    /// Applies the facade-boundary error policy: log, then either degrade to
    /// `fallback` or hand the error back.
    pub fn degrade<T>(&self, operation: &str, key: &str, result: Result<T>, fallback: T) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                tracing::error!(
                    "blob storage error: operation={} key={} error={}",
                    operation,
                    key,
                    error
                );
                if self.mode.fails_fast() || !error.is_degradable() {
                    Err(error)
                } else {
                    Ok(fallback)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub enabled: bool,
    pub bucket_prefix: String,
    pub partitions: usize,
    pub retry_backoff_ms: u64,
    /// Upper bound for the delay between retries of one message.
    pub max_backoff_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket_prefix: "blobrep".to_string(),
            partitions: 4,
            retry_backoff_ms: 200,
            max_backoff_ms: 30_000,
        }
    }
}

impl ReplicationConfig {
    /// Backoff before the given retry (1-based), doubling up to `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let millis = self.retry_backoff_ms.saturating_mul(factor);
        Duration::from_millis(millis.min(self.max_backoff_ms.max(self.retry_backoff_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_mode() {
        assert_eq!("Development".parse::<ServerMode>().unwrap(), ServerMode::Development);
        assert_eq!(" test ".parse::<ServerMode>().unwrap(), ServerMode::Test);
        assert!("staging".parse::<ServerMode>().is_err());
    }

    #[test]
    fn test_degrade_policy() {
        let production = StorageConfig {
            enabled: true,
            mode: ServerMode::Production,
        };
        let development = StorageConfig {
            enabled: true,
            mode: ServerMode::Development,
        };

        let failed = || Err::<bool, _>(BlobError::TransientStore("timeout".to_string()));
        assert!(!production.degrade("exists", "draft/a", failed(), false).unwrap());
        assert!(development.degrade("exists", "draft/a", failed(), false).is_err());

        let drift = Err::<bool, _>(BlobError::IntegrityMismatch {
            key: "draft/a".to_string(),
            detail: "sha384".to_string(),
        });
        assert!(production.degrade("retrieve", "draft/a", drift, false).is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ReplicationConfig {
            retry_backoff_ms: 10,
            max_backoff_ms: 500,
            ..Default::default()
        };
        assert_eq!(config.backoff_for(1), Duration::from_millis(10));
        assert_eq!(config.backoff_for(3), Duration::from_millis(40));
        assert_eq!(config.backoff_for(6), Duration::from_millis(320));
        assert_eq!(config.backoff_for(7), Duration::from_millis(500));
        assert_eq!(config.backoff_for(u32::MAX), Duration::from_millis(500));
    }
}
