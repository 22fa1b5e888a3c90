// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! Storage manager configuration.
//!
//! Defaults:
//! - prefix: `app_`, version: `1.0.0`
//! - memory fallback on, debug logging off
//! - 3 attempts per operation, 100ms backoff unit
//! - read-time schema validation on, ASCII-safe rendering off
//! - TTL stored inline in the entry envelope

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::retry::RetryPolicy;

/// Where a key's expiry timestamp is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlLayout {
    /// Inside the entry envelope; value and expiry are written together.
    #[default]
    Inline,
    /// In a `<key>_ttl` sidecar entry written after the value.
    Sidecar,
}

/// Configuration for a [`crate::StorageManager`]. Immutable once the
/// manager is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prepended to every logical key.
    pub prefix: String,
    /// Format version stamped into envelopes and the version key.
    pub version: String,
    /// Use an in-memory map when the persistent store fails its probe.
    pub fallback_to_memory: bool,
    /// Emit per-operation debug events.
    pub enable_debug: bool,
    /// Attempts per backend operation, including the first.
    pub max_retries: u32,
    /// Backoff unit in milliseconds.
    pub retry_delay_ms: u64,
    /// Validate values read with a schema; invalid reads return the default.
    pub validate_on_load: bool,
    /// Render envelopes as ASCII-safe JSON.
    pub compression_enabled: bool,
    pub ttl_layout: TtlLayout,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: "app_".to_string(),
            version: "1.0.0".to_string(),
            fallback_to_memory: true,
            enable_debug: false,
            max_retries: 3,
            retry_delay_ms: 100,
            validate_on_load: true,
            compression_enabled: false,
            ttl_layout: TtlLayout::Inline,
        }
    }
}

impl StorageConfig {
    /// Default configuration with a different prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> StorageResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| StorageError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the manager cannot work with.
    pub fn validate(&self) -> StorageResult<()> {
        if self.version.trim().is_empty() {
            return Err(StorageError::Config("version must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.prefix, "app_");
        assert_eq!(config.version, "1.0.0");
        assert!(config.fallback_to_memory);
        assert!(!config.enable_debug);
        assert!(config.validate_on_load);
        assert_eq!(config.ttl_layout, TtlLayout::Inline);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = StorageConfig::from_json_str(
            r#"{"prefix": "timesheet_", "max_retries": 5, "ttl_layout": "sidecar"}"#,
        )
        .unwrap();
        assert_eq!(config.prefix, "timesheet_");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.ttl_layout, TtlLayout::Sidecar);
        assert_eq!(config.retry_delay_ms, 100);
    }

    #[test]
    fn test_empty_version_is_rejected() {
        let err = StorageConfig::from_json_str(r#"{"version": " "}"#).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_malformed_json_is_a_config_error() {
        assert!(matches!(
            StorageConfig::from_json_str("{prefix"),
            Err(StorageError::Config(_))
        ));
    }
}
