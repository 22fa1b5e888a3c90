// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for Tidemark.
//
// One enum covers every failure a caller can observe: schema rejection,
// encoding and decoding failures, an unusable backend, transient backend
// faults, reserved-key misuse, migration failures and bad configuration.
// Each Display string starts with its category phrase so callers can tell
// categories apart from the message alone.

use thiserror::Error;

/// Errors that can occur when interacting with a [`crate::StorageManager`]
/// or one of its backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A value failed schema validation on write. Nothing was written.
    #[error("validation failed: {}", errors.join("; "))]
    Validation {
        /// Every accumulated validation message, in evaluation order.
        errors: Vec<String>,
    },

    /// A value could not be encoded (circular reference, non-finite float,
    /// non-string map key, ...).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored text could not be decoded into an entry envelope.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// No usable backend: the persistent store failed its probe and the
    /// memory fallback is disabled.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A transient backend failure (quota exceeded, intermittent fault).
    /// Retried by the retry executor.
    #[error("backend error: {0}")]
    Backend(String),

    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The logical key collides with the reserved bookkeeping namespace.
    #[error("reserved key: '{0}' lies in the bookkeeping namespace")]
    ReservedKey(String),

    /// A migration or rollback step could not be completed.
    #[error("migration {version} failed: {message}")]
    Migration {
        /// Version of the offending migration.
        version: String,
        /// What went wrong.
        message: String,
    },

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether retrying the same operation might succeed.
    ///
    /// Only backend I/O faults are worth retrying; validation and codec
    /// failures are deterministic and an unavailable backend stays
    /// unavailable for the lifetime of the manager.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Backend(_) | StorageError::Io(_))
    }
}

/// Convenience type alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;
