// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lazy TTL expiry for Tidemark.
//
// Expiry is checked when an entry is read and by explicit sweeps; nothing
// runs on a timer. An entry is expired once `now > expires_at`. With the
// inline layout the expiry sits in the entry envelope; with the sidecar
// layout it sits in a separate `<key>_ttl` envelope written after the value.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::codec::{self, Codec, Envelope};
use crate::config::TtlLayout;
use crate::error::StorageResult;
use crate::history::OperationKind;
use crate::keyspace::{KeySpace, TTL_SUFFIX};
use crate::retry::{OperationMeta, RetryExecutor};

/// Applies the configured [`TtlLayout`] on write, read and sweep.
pub struct TtlManager {
    layout: TtlLayout,
    codec: Arc<Codec>,
    executor: Arc<RetryExecutor>,
}

impl TtlManager {
    pub fn new(layout: TtlLayout, codec: Arc<Codec>, executor: Arc<RetryExecutor>) -> Self {
        Self {
            layout,
            codec,
            executor,
        }
    }

    /// Absolute expiry for a TTL starting now.
    pub fn expiry_for(&self, ttl: Duration) -> i64 {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.codec.now_millis().saturating_add(ttl_millis)
    }

    /// The expiry to embed in the entry envelope itself.
    pub fn inline_expiry(&self, expires_at: Option<i64>) -> Option<i64> {
        match self.layout {
            TtlLayout::Inline => expires_at,
            TtlLayout::Sidecar => None,
        }
    }

    /// Establish (or drop) the sidecar after the primary write succeeded.
    ///
    /// Best-effort: failures are logged and never surface to the caller.
    pub async fn after_write(&self, backend: &dyn StorageBackend, full_key: &str, expires_at: Option<i64>) {
        if self.layout != TtlLayout::Sidecar {
            return;
        }
        let sidecar = KeySpace::sidecar_key(full_key);
        let sidecar = sidecar.as_str();
        let outcome = match expires_at {
            Some(at) => match self.codec.seal(Value::from(at), None) {
                Ok(text) => {
                    let text = text.as_str();
                    self.executor
                        .execute(OperationMeta::silent(OperationKind::Set, sidecar), move || {
                            backend.set(sidecar, text)
                        })
                        .await
                }
                Err(err) => Err(err),
            },
            None => self
                .executor
                .execute(OperationMeta::silent(OperationKind::Remove, sidecar), move || async move {
                    backend.remove(sidecar).await.map(|_| ())
                })
                .await,
        };
        if let Err(err) = outcome {
            warn!(key = sidecar, error = %err, "ttl sidecar update failed");
        }
    }

    /// Expiry recorded for `full_key`, from `envelope` or its sidecar.
    pub async fn expiry_of(
        &self,
        backend: &dyn StorageBackend,
        full_key: &str,
        envelope: &Envelope,
    ) -> StorageResult<Option<i64>> {
        match self.layout {
            TtlLayout::Inline => Ok(envelope.expires_at),
            TtlLayout::Sidecar => self.sidecar_expiry(backend, full_key).await,
        }
    }

    /// Whether the entry at `full_key` is expired right now.
    pub async fn is_expired(
        &self,
        backend: &dyn StorageBackend,
        full_key: &str,
        envelope: &Envelope,
    ) -> StorageResult<bool> {
        let now = self.codec.now_millis();
        let expires_at = self.expiry_of(backend, full_key, envelope).await?;
        Ok(codec::is_expired(expires_at, now))
    }

    /// Delete an entry and its sidecar.
    pub async fn evict(&self, backend: &dyn StorageBackend, full_key: &str) -> StorageResult<()> {
        self.executor
            .execute(OperationMeta::silent(OperationKind::Remove, full_key), move || async move {
                backend.remove(full_key).await.map(|_| ())
            })
            .await?;
        if self.layout == TtlLayout::Sidecar {
            let sidecar = KeySpace::sidecar_key(full_key);
            let sidecar = sidecar.as_str();
            self.executor
                .execute(OperationMeta::silent(OperationKind::Remove, sidecar), move || async move {
                    backend.remove(sidecar).await.map(|_| ())
                })
                .await?;
        }
        debug!(key = full_key, "evicted expired entry");
        Ok(())
    }

    /// Evict every expired entry among `keys`. Returns the number of user
    /// entries evicted.
    ///
    /// Entries that cannot be decoded are left alone. Sidecars whose primary
    /// entry is gone are removed once they expire.
    pub async fn sweep(
        &self,
        backend: &dyn StorageBackend,
        space: &KeySpace,
        keys: &[String],
    ) -> StorageResult<usize> {
        let now = self.codec.now_millis();
        let mut evicted = 0;

        for (full_key, _) in space.user_entries(keys) {
            let Some(raw) = self.read_silent(backend, full_key).await? else {
                continue;
            };
            let envelope = match self.codec.decode_envelope(&raw) {
                Ok(envelope) => envelope,
                Err(err) => {
                    debug!(key = full_key, error = %err, "skipping undecodable entry during sweep");
                    continue;
                }
            };
            if self.is_expired(backend, full_key, &envelope).await? {
                self.evict(backend, full_key).await?;
                evicted += 1;
            }
        }

        if self.layout == TtlLayout::Sidecar {
            for sidecar in keys.iter().filter(|key| space.is_sidecar(key)) {
                let primary = &sidecar[..sidecar.len() - TTL_SUFFIX.len()];
                if keys.iter().any(|key| key == primary) {
                    continue;
                }
                let orphan_expired = self
                    .sidecar_expiry(backend, primary)
                    .await?
                    .is_some_and(|at| now > at);
                if orphan_expired {
                    let sidecar = sidecar.as_str();
                    self.executor
                        .execute(OperationMeta::silent(OperationKind::Remove, sidecar), move || async move {
                            backend.remove(sidecar).await.map(|_| ())
                        })
                        .await?;
                }
            }
        }

        Ok(evicted)
    }

    async fn sidecar_expiry(&self, backend: &dyn StorageBackend, full_key: &str) -> StorageResult<Option<i64>> {
        let sidecar = KeySpace::sidecar_key(full_key);
        let Some(raw) = self.read_silent(backend, &sidecar).await? else {
            return Ok(None);
        };
        match self.codec.deserialize(&raw).map(|value| value.as_i64()) {
            Ok(Some(at)) => Ok(Some(at)),
            Ok(None) | Err(_) => {
                warn!(key = %sidecar, "ignoring malformed ttl sidecar");
                Ok(None)
            }
        }
    }

    async fn read_silent(&self, backend: &dyn StorageBackend, key: &str) -> StorageResult<Option<String>> {
        self.executor
            .execute(OperationMeta::silent(OperationKind::Get, key), move || backend.get(key))
            .await
    }
}
