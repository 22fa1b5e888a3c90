// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core storage backend trait for Tidemark.
//
// Defines the `StorageBackend` trait that every backing store implements:
// a flat string-to-string map with get/set/remove/clear/enumerate, shared by
// every manager opened against it. Key prefixing, envelopes and expiry all
// live above this layer.

use async_trait::async_trait;

use crate::error::StorageError;

/// A pluggable string key-value store.
///
/// Keys are fully-qualified (already prefixed) and values are rendered
/// entry envelopes. Each primitive call is assumed atomic on its own; no
/// multi-key atomicity is required.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieve the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist, rather than an error.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`.
    ///
    /// Returns `Ok(true)` if the key existed and was removed, `Ok(false)` if
    /// the key was not present.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Delete every key in the store, regardless of prefix.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Enumerate every key in the store, in backend order.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Number of keys in the store.
    async fn len(&self) -> Result<usize, StorageError>;

    /// A human-readable name for this backend, used in logging and
    /// [`crate::StorageInfo`].
    fn name(&self) -> &str;
}
