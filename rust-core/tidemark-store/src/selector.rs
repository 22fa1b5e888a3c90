// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend selection for Tidemark.
//
// A manager decides once, when it opens, whether it talks to the persistent
// store or to an in-memory map. The decision is driven by a write-then-delete
// probe and never revisited: a persistent store that recovers later is not
// re-promoted.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::error::StorageError;
use crate::memory::InMemoryBackend;

/// Key written and immediately removed by [`probe`].
pub const PROBE_KEY: &str = "__tidemark_probe__";

/// Which kind of store a manager ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The platform-provided persistent store.
    Persistent,
    /// The in-memory fallback map.
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Persistent => write!(f, "persistent"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// Check whether `backend` accepts writes by storing and deleting a
/// sentinel key. Any error means the store is unusable.
pub async fn probe(backend: &dyn StorageBackend) -> bool {
    if let Err(err) = backend.set(PROBE_KEY, PROBE_KEY).await {
        warn!(backend = backend.name(), error = %err, "storage probe write failed");
        return false;
    }
    match backend.remove(PROBE_KEY).await {
        Ok(_) => true,
        Err(err) => {
            warn!(backend = backend.name(), error = %err, "storage probe delete failed");
            false
        }
    }
}

/// The backend a manager is bound to for its whole lifetime.
#[derive(Clone)]
pub struct SelectedBackend {
    kind: BackendKind,
    handle: Option<Arc<dyn StorageBackend>>,
}

impl SelectedBackend {
    /// What was chosen. An unavailable persistent store still reports
    /// [`BackendKind::Persistent`].
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Whether operations can reach a store at all.
    pub fn is_available(&self) -> bool {
        self.handle.is_some()
    }

    /// The live handle, or `BackendUnavailable` without touching anything.
    pub fn handle(&self) -> Result<&Arc<dyn StorageBackend>, StorageError> {
        self.handle.as_ref().ok_or_else(|| {
            StorageError::BackendUnavailable(
                "persistent store failed its probe and memory fallback is disabled".to_string(),
            )
        })
    }

    /// Backend name for diagnostics.
    pub fn name(&self) -> &str {
        self.handle.as_ref().map_or("unavailable", |h| h.name())
    }
}

impl fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("kind", &self.kind)
            .field("backend", &self.name())
            .finish()
    }
}

/// Pick the backend given a probe result.
///
/// `persistent` is `None` when the environment offers no persistent store.
pub fn select(
    persistent: Option<Arc<dyn StorageBackend>>,
    probe_ok: bool,
    fallback_allowed: bool,
) -> SelectedBackend {
    match persistent {
        Some(store) if probe_ok => {
            info!(backend = store.name(), "using persistent storage backend");
            SelectedBackend {
                kind: BackendKind::Persistent,
                handle: Some(store),
            }
        }
        _ if fallback_allowed => {
            warn!("persistent storage unavailable, falling back to in-memory backend");
            SelectedBackend {
                kind: BackendKind::Memory,
                handle: Some(Arc::new(InMemoryBackend::new())),
            }
        }
        _ => {
            warn!("persistent storage unavailable and fallback disabled");
            SelectedBackend {
                kind: BackendKind::Persistent,
                handle: None,
            }
        }
    }
}

/// Probe `persistent` (if any) and select in one step.
pub async fn probe_and_select(
    persistent: Option<Arc<dyn StorageBackend>>,
    fallback_allowed: bool,
) -> SelectedBackend {
    let probe_ok = match &persistent {
        Some(store) => probe(store.as_ref()).await,
        None => false,
    };
    select(persistent, probe_ok, fallback_allowed)
}
