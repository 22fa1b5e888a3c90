// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tidemark Store
//
// Namespaced key-value persistence for small applications: every value is
// wrapped in a versioned envelope, optionally validated against a schema,
// written with retries, expired lazily and migrated between data versions.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` trait all stores implement.
// - [`memory`] -- `BTreeMap` store, also the fallback when no persistent
//   store is usable.
// - [`selector`] -- Probes the persistent store once and picks a backend.
// - [`codec`] -- Entry envelopes and depth-bounded encoding.
// - [`schema`] -- Declarative schemas with coercion and sanitization.
// - [`retry`] -- Linear-backoff retry executor.
// - [`ttl`] -- Inline or sidecar expiry, read-triggered eviction and sweeps.
// - [`migration`] -- Versioned data migrations with rollback.
// - [`manager`] -- The `StorageManager` facade.
//
// # Example
//
// ```rust
// use serde_json::json;
// use tidemark_store::{GetOptions, ImportOptions, SetOptions, StorageConfig, StorageManager};
//
// # tokio_test::block_on(async {
// let storage = StorageManager::builder(StorageConfig::default()).open().await.unwrap();
// storage.set("theme", &json!("dark"), SetOptions::new()).await.unwrap();
//
// let backup = storage.export().await.unwrap();
// storage.clear().await.unwrap();
// storage.import(&backup, ImportOptions::default()).await.unwrap();
//
// assert_eq!(
//     storage.get("theme", GetOptions::new()).await.unwrap(),
//     Some(json!("dark"))
// );
// # });
// ```

pub mod backend;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod history;
pub mod keyspace;
pub mod manager;
pub mod memory;
pub mod migration;
pub mod retry;
pub mod schema;
pub mod selector;
pub mod ttl;

// Optional persistent backend, feature-gated to keep the default build lean.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::StorageBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, Envelope};
pub use config::{StorageConfig, TtlLayout};
pub use error::{StorageError, StorageResult};
pub use history::{OperationKind, OperationRecord};
pub use manager::{GetOptions, ImportOptions, SetOptions, StorageInfo, StorageManager, StorageManagerBuilder};
pub use memory::InMemoryBackend;
pub use migration::{Migration, MigrationReport, MigrationVersion};
pub use schema::{Pattern, Schema, SchemaType, ValidationResult};
pub use selector::BackendKind;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
