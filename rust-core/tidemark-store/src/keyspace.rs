// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key namespacing for Tidemark.
//
// Every logical key is stored as `prefix + key`. Bookkeeping entries live in
// the reserved `prefix + "__meta__"` sub-namespace and never show up in
// enumeration. With sidecar TTLs, `prefix + key + "_ttl"` holds the expiry of
// `prefix + key`.

use crate::config::TtlLayout;
use crate::error::{StorageError, StorageResult};

/// Logical-key prefix reserved for bookkeeping entries.
pub const META_NAMESPACE: &str = "__meta__";

/// Suffix of TTL sidecar keys.
pub const TTL_SUFFIX: &str = "_ttl";

/// Bookkeeping key holding the last applied migration version.
pub const LAST_MIGRATION_KEY: &str = "last_migration";

/// Bookkeeping key holding the library format version.
pub const VERSION_KEY: &str = "version";

/// Maps logical keys to fully-qualified backend keys and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    layout: TtlLayout,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>, layout: TtlLayout) -> Self {
        Self {
            prefix: prefix.into(),
            layout,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully-qualified key for a caller-supplied key.
    ///
    /// Fails with [`StorageError::ReservedKey`] when the key falls inside the
    /// bookkeeping namespace, or names a sidecar in the sidecar layout.
    pub fn user_key(&self, key: &str) -> StorageResult<String> {
        if key.starts_with(META_NAMESPACE) {
            return Err(StorageError::ReservedKey(key.to_string()));
        }
        if self.layout == TtlLayout::Sidecar && key.ends_with(TTL_SUFFIX) {
            return Err(StorageError::ReservedKey(key.to_string()));
        }
        Ok(self.qualify(key))
    }

    /// Fully-qualified key for a bookkeeping entry.
    pub fn meta_key(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, META_NAMESPACE, name)
    }

    /// TTL sidecar key for a fully-qualified key.
    pub fn sidecar_key(full_key: &str) -> String {
        format!("{full_key}{TTL_SUFFIX}")
    }

    /// Strip the prefix from a backend key, returning the logical key when
    /// the backend key is a user entry owned by this key space.
    pub fn logical<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        let logical = full_key.strip_prefix(self.prefix.as_str())?;
        if logical.starts_with(META_NAMESPACE) {
            return None;
        }
        if self.layout == TtlLayout::Sidecar && logical.ends_with(TTL_SUFFIX) {
            return None;
        }
        Some(logical)
    }

    /// Whether a backend key is a sidecar owned by this key space.
    pub fn is_sidecar(&self, full_key: &str) -> bool {
        self.layout == TtlLayout::Sidecar
            && full_key
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|logical| {
                    !logical.starts_with(META_NAMESPACE) && logical.ends_with(TTL_SUFFIX)
                })
    }

    /// User entries and their sidecars; everything `clear` removes.
    pub fn is_data(&self, full_key: &str) -> bool {
        full_key
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|logical| !logical.starts_with(META_NAMESPACE))
    }

    /// User entries among `keys`, as `(full_key, logical_key)` pairs in the
    /// order given.
    pub fn user_entries<'a>(&self, keys: &'a [String]) -> Vec<(&'a str, &'a str)> {
        keys.iter()
            .filter_map(|full| self.logical(full).map(|logical| (full.as_str(), logical)))
            .collect()
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}
