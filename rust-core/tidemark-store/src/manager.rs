// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The Tidemark storage facade.
//
// `StorageManager` ties the pieces together:
//
// ```text
// set: KeySpace -> Codec::encode_value -> Schema -> Codec::seal -> RetryExecutor -> backend
//                                                                 -> TtlManager::after_write
// get: KeySpace -> RetryExecutor -> backend -> Codec::decode_envelope -> TtlManager -> Schema
// ```
//
// Every `set`, `get`, `remove` and `clear` appends exactly one record to the
// operation history, whatever the outcome. Enumeration, sweeps and
// bookkeeping reads are not recorded.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::clock::{Clock, SystemClock};
use crate::codec::Codec;
use crate::config::{StorageConfig, TtlLayout};
use crate::error::{StorageError, StorageResult};
use crate::history::{OperationHistory, OperationKind, OperationRecord};
use crate::keyspace::{KeySpace, VERSION_KEY};
use crate::migration::{Migration, MigrationRegistry, MigrationReport, MigrationRunner, MigrationVersion};
use crate::retry::{OperationMeta, RetryExecutor};
use crate::schema::Schema;
use crate::selector::{self, BackendKind, SelectedBackend};
use crate::ttl::TtlManager;

/// History key used for `clear`, which has no single logical key.
pub const CLEAR_HISTORY_KEY: &str = "*";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for [`StorageManager::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Validate (and sanitize) the value before writing.
    pub schema: Option<Schema>,
    /// Expire the entry this long after the write.
    pub ttl: Option<Duration>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Options for [`StorageManager::get`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Validate the stored value; an invalid value reads as absent.
    pub schema: Option<Schema>,
    /// Returned instead of `None` when the entry is absent, expired or
    /// invalid.
    pub default_value: Option<Value>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Options for [`StorageManager::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Replace entries that already exist. Off by default.
    pub overwrite: bool,
}

impl ImportOptions {
    pub fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

/// Snapshot returned by [`StorageManager::get_storage_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    #[serde(rename = "type")]
    pub kind: BackendKind,
    pub available: bool,
    /// Approximate bytes used by user entries.
    pub size: usize,
    pub key_count: usize,
    pub backend_name: String,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and opens a [`StorageManager`].
pub struct StorageManagerBuilder {
    config: StorageConfig,
    persistent: Option<Arc<dyn StorageBackend>>,
    clock: Option<Arc<dyn Clock>>,
    migrations: MigrationRegistry,
}

impl StorageManagerBuilder {
    fn new(config: StorageConfig) -> Self {
        Self {
            config,
            persistent: None,
            clock: None,
            migrations: MigrationRegistry::new(),
        }
    }

    /// The persistent store to probe. Without one the manager uses the
    /// in-memory fallback, or is unavailable when fallback is disabled.
    pub fn persistent(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.persistent = Some(backend);
        self
    }

    /// Time source for timestamps, TTLs and history. Defaults to the
    /// system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register a migration to run while opening.
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.register(migration);
        self
    }

    /// Probe and select the backend, record the format version and apply
    /// pending migrations.
    ///
    /// Only an invalid configuration makes this fail. An unavailable backend
    /// yields a manager whose operations fail fast; migration failures are
    /// logged.
    pub async fn open(self) -> StorageResult<StorageManager> {
        self.config.validate()?;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let selected = selector::probe_and_select(self.persistent, self.config.fallback_to_memory).await;
        let history = Arc::new(OperationHistory::default());
        let codec = Arc::new(Codec::new(
            self.config.version.clone(),
            self.config.compression_enabled,
            clock.clone(),
        ));
        let executor = Arc::new(RetryExecutor::new(self.config.retry_policy(), history.clone(), clock));
        let space = KeySpace::new(self.config.prefix.clone(), self.config.ttl_layout);

        let manager = StorageManager {
            ttl: TtlManager::new(self.config.ttl_layout, codec.clone(), executor.clone()),
            runner: MigrationRunner::new(space.clone(), codec.clone(), executor.clone()),
            debug: AtomicBool::new(self.config.enable_debug),
            migrations: Mutex::new(self.migrations),
            config: self.config,
            space,
            selected,
            codec,
            executor,
            history,
        };

        info!(
            prefix = manager.space.prefix(),
            backend = manager.selected.name(),
            kind = %manager.selected.kind(),
            available = manager.selected.is_available(),
            "storage manager opened"
        );

        if manager.selected.is_available() {
            if let Err(err) = manager.write_version_marker().await {
                warn!(error = %err, "could not record format version");
            }
            if let Err(err) = manager.run_migrations().await {
                warn!(error = %err, "migrations did not complete");
            }
        }

        Ok(manager)
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Namespaced key-value persistence over a [`StorageBackend`].
///
/// ```rust
/// use std::time::Duration;
/// use serde_json::json;
/// use tidemark_store::{GetOptions, Schema, SetOptions, StorageConfig, StorageManager};
///
/// # tokio_test::block_on(async {
/// let storage = StorageManager::builder(StorageConfig::with_prefix("timesheet_"))
///     .open()
///     .await
///     .unwrap();
///
/// let schema = Schema::object().property("hours", Schema::number().min(0.0).max(24.0));
/// storage
///     .set("monday", &json!({"hours": "7.5"}), SetOptions::new().schema(schema.clone()))
///     .await
///     .unwrap();
///
/// let day = storage.get("monday", GetOptions::new().schema(schema)).await.unwrap();
/// assert_eq!(day, Some(json!({"hours": 7.5})));
///
/// storage
///     .set("draft", &json!("wip"), SetOptions::new().ttl(Duration::from_secs(60)))
///     .await
///     .unwrap();
/// assert_eq!(storage.get_keys().await.unwrap(), vec!["draft", "monday"]);
/// # });
/// ```
pub struct StorageManager {
    config: StorageConfig,
    space: KeySpace,
    selected: SelectedBackend,
    codec: Arc<Codec>,
    executor: Arc<RetryExecutor>,
    history: Arc<OperationHistory>,
    ttl: TtlManager,
    runner: MigrationRunner,
    migrations: Mutex<MigrationRegistry>,
    debug: AtomicBool,
}

impl StorageManager {
    pub fn builder(config: StorageConfig) -> StorageManagerBuilder {
        StorageManagerBuilder::new(config)
    }

    /// The configuration this manager was opened with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Which backend was selected at open time.
    pub fn backend_kind(&self) -> BackendKind {
        self.selected.kind()
    }

    // -- Core operations ----------------------------------------------------

    /// Store `value` under `key`.
    ///
    /// With a schema the value is validated first and the sanitized form is
    /// stored; a failed validation writes nothing.
    pub async fn set(&self, key: &str, value: &Value, options: SetOptions) -> StorageResult<()> {
        self.set_typed(key, value, options).await
    }

    /// [`set`](Self::set) for any serializable value.
    pub async fn set_typed<T>(&self, key: &str, value: &T, options: SetOptions) -> StorageResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.recorded(OperationKind::Set, key, self.write_entry(key, value, &options))
            .await
    }

    /// Read the value under `key`.
    ///
    /// Returns `options.default_value` (or `None`) when the entry is absent,
    /// has expired, or fails the read schema. Expired entries are evicted.
    pub async fn get(&self, key: &str, options: GetOptions) -> StorageResult<Option<Value>> {
        self.recorded(OperationKind::Get, key, self.read_value(key, &options))
            .await
    }

    /// [`get`](Self::get) deserialized into `T`.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key, GetOptions::default()).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Whether `key` holds a live (unexpired) entry. Not recorded in the
    /// history.
    pub async fn contains(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.space.user_key(key)?;
        let backend = self.backend()?;
        Ok(self.read_entry(backend, &full_key).await?.is_some())
    }

    /// Delete `key` and its TTL sidecar. Returns whether the entry existed.
    pub async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.recorded(OperationKind::Remove, key, self.remove_entry(key))
            .await
    }

    /// Delete every entry under this manager's prefix. Keys of other
    /// prefixes and the bookkeeping entries are left alone. Returns the
    /// number of backend keys removed.
    pub async fn clear(&self) -> StorageResult<usize> {
        self.recorded(OperationKind::Clear, CLEAR_HISTORY_KEY, self.clear_entries())
            .await
    }

    // -- Enumeration --------------------------------------------------------

    /// Logical keys under the prefix, in backend order. Expired entries stay
    /// listed until they are read or swept.
    pub async fn get_keys(&self) -> StorageResult<Vec<String>> {
        let backend = self.backend()?;
        let keys = self.list_keys(backend).await?;
        Ok(self
            .space
            .user_entries(&keys)
            .into_iter()
            .map(|(_, logical)| logical.to_string())
            .collect())
    }

    /// Sum of key and stored text lengths over user entries, in bytes.
    pub async fn get_size(&self) -> StorageResult<usize> {
        let backend = self.backend()?;
        let keys = self.list_keys(backend).await?;

        let mut size = 0;
        for (full, _) in self.space.user_entries(&keys) {
            let raw = self
                .executor
                .execute(OperationMeta::silent(OperationKind::Get, full), move || backend.get(full))
                .await?;
            if let Some(raw) = raw {
                size += full.len() + raw.len();
            }
        }
        Ok(size)
    }

    /// Every live entry as a logical-key map. Entries that cannot be decoded
    /// are skipped.
    pub async fn export(&self) -> StorageResult<BTreeMap<String, Value>> {
        let backend = self.backend()?;
        let keys = self.list_keys(backend).await?;

        let mut exported = BTreeMap::new();
        for (full, logical) in self.space.user_entries(&keys) {
            match self.read_entry(backend, full).await {
                Ok(Some(value)) => {
                    exported.insert(logical.to_string(), value);
                }
                Ok(None) => {}
                Err(err @ (StorageError::Deserialization(_) | StorageError::Serialization(_))) => {
                    warn!(key = logical, error = %err, "skipping undecodable entry in export");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(exported)
    }

    /// Write each entry through [`set`](Self::set). Without `overwrite`,
    /// keys that already hold a live entry are skipped. Returns the number
    /// of entries written.
    pub async fn import(&self, data: &BTreeMap<String, Value>, options: ImportOptions) -> StorageResult<usize> {
        let mut written = 0;
        for (key, value) in data {
            if !options.overwrite && self.contains(key).await? {
                continue;
            }
            self.set(key, value, SetOptions::default()).await?;
            written += 1;
        }
        debug!(written, total = data.len(), "import finished");
        Ok(written)
    }

    // -- TTL ----------------------------------------------------------------

    /// Evict every expired entry now. Returns the number evicted.
    pub async fn cleanup_expired(&self) -> StorageResult<usize> {
        let backend = self.backend()?;
        let keys = self.list_keys(backend).await?;
        let evicted = self.ttl.sweep(backend, &self.space, &keys).await?;
        if evicted > 0 {
            info!(evicted, prefix = self.space.prefix(), "expired entries removed");
        }
        Ok(evicted)
    }

    // -- Migrations ---------------------------------------------------------

    /// Register a migration. It runs on the next
    /// [`run_migrations`](Self::run_migrations) or the next open.
    pub fn add_migration(&self, migration: Migration) {
        self.registry().register(migration);
    }

    /// Apply every registered migration newer than the stored marker.
    pub async fn run_migrations(&self) -> StorageResult<MigrationReport> {
        let backend = self.backend()?;
        let registry = self.registry().clone();
        if registry.is_empty() {
            return Ok(MigrationReport::default());
        }
        let report = self.runner.run_pending(backend, &registry).await?;
        if !report.applied.is_empty() {
            info!(
                applied = report.applied.len(),
                key_failures = report.key_failures,
                "migrations applied"
            );
        }
        Ok(report)
    }

    /// Revert applied migrations newer than `version`, newest first.
    pub async fn rollback_to(&self, version: &str) -> StorageResult<MigrationReport> {
        let backend = self.backend()?;
        let registry = self.registry().clone();
        self.runner
            .rollback_to(backend, &registry, MigrationVersion::parse(version))
            .await
    }

    // -- Introspection ------------------------------------------------------

    /// Oldest-first copy of the operation history.
    pub fn get_operation_history(&self) -> Vec<OperationRecord> {
        self.history.snapshot()
    }

    pub async fn get_storage_info(&self) -> StorageResult<StorageInfo> {
        let (size, key_count) = if self.selected.is_available() {
            (self.get_size().await?, self.get_keys().await?.len())
        } else {
            (0, 0)
        };
        Ok(StorageInfo {
            kind: self.selected.kind(),
            available: self.selected.is_available(),
            size,
            key_count,
            backend_name: self.selected.name().to_string(),
        })
    }

    /// Toggle per-operation debug events. Never changes behaviour.
    pub fn set_debug_mode(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    // -- Internals ----------------------------------------------------------

    fn backend(&self) -> StorageResult<&dyn StorageBackend> {
        Ok(self.selected.handle()?.as_ref())
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, MigrationRegistry> {
        self.migrations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a facade operation and append its single history record.
    async fn recorded<T, Fut>(&self, operation: OperationKind, key: &str, body: Fut) -> StorageResult<T>
    where
        Fut: Future<Output = StorageResult<T>>,
    {
        let result = body.await;
        let error = result.as_ref().err().map(ToString::to_string);
        if self.is_debug_mode() {
            debug!(
                operation = %operation,
                key,
                prefix = self.space.prefix(),
                success = error.is_none(),
                error = error.as_deref().unwrap_or(""),
                "storage operation"
            );
        }
        self.executor
            .record(&OperationMeta::recorded(operation, key), error);
        result
    }

    async fn write_entry<T>(&self, key: &str, value: &T, options: &SetOptions) -> StorageResult<()>
    where
        T: Serialize + ?Sized,
    {
        let full_key = self.space.user_key(key)?;
        let backend = self.backend()?;

        let mut tree = self.codec.encode_value(value)?;
        if let Some(schema) = &options.schema {
            let result = schema.validate(&tree);
            if !result.is_valid {
                return Err(StorageError::Validation { errors: result.errors });
            }
            tree = result.sanitized_value;
        }

        let expires_at = options.ttl.map(|ttl| self.ttl.expiry_for(ttl));
        let text = self.codec.seal(tree, self.ttl.inline_expiry(expires_at))?;
        let (full, text) = (full_key.as_str(), text.as_str());
        self.executor
            .execute(OperationMeta::silent(OperationKind::Set, full), move || {
                backend.set(full, text)
            })
            .await?;

        self.ttl.after_write(backend, full, expires_at).await;
        Ok(())
    }

    async fn read_value(&self, key: &str, options: &GetOptions) -> StorageResult<Option<Value>> {
        let full_key = self.space.user_key(key)?;
        let backend = self.backend()?;

        let Some(value) = self.read_entry(backend, &full_key).await? else {
            return Ok(options.default_value.clone());
        };

        match &options.schema {
            Some(schema) if self.config.validate_on_load => {
                let result = schema.validate(&value);
                if result.is_valid {
                    Ok(Some(result.sanitized_value))
                } else {
                    debug!(key, errors = ?result.errors, "stored value failed read validation");
                    Ok(options.default_value.clone())
                }
            }
            _ => Ok(Some(value)),
        }
    }

    async fn remove_entry(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.space.user_key(key)?;
        let backend = self.backend()?;
        let full = full_key.as_str();

        let existed = self
            .executor
            .execute(OperationMeta::silent(OperationKind::Remove, full), move || {
                backend.remove(full)
            })
            .await?;

        if self.config.ttl_layout == TtlLayout::Sidecar {
            let sidecar = KeySpace::sidecar_key(full);
            let sidecar = sidecar.as_str();
            self.executor
                .execute(OperationMeta::silent(OperationKind::Remove, sidecar), move || {
                    backend.remove(sidecar)
                })
                .await?;
        }
        Ok(existed)
    }

    async fn clear_entries(&self) -> StorageResult<usize> {
        let backend = self.backend()?;
        let keys = self.list_keys(backend).await?;

        let mut removed = 0;
        for full in keys.iter().filter(|key| self.space.is_data(key)) {
            let full = full.as_str();
            let existed = self
                .executor
                .execute(OperationMeta::silent(OperationKind::Remove, full), move || {
                    backend.remove(full)
                })
                .await?;
            if existed {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_keys(&self, backend: &dyn StorageBackend) -> StorageResult<Vec<String>> {
        self.executor
            .execute(OperationMeta::silent(OperationKind::Get, self.space.prefix()), move || {
                backend.keys()
            })
            .await
    }

    /// Decode the entry at `full_key`, evicting it when expired.
    async fn read_entry(&self, backend: &dyn StorageBackend, full_key: &str) -> StorageResult<Option<Value>> {
        let raw = self
            .executor
            .execute(OperationMeta::silent(OperationKind::Get, full_key), move || {
                backend.get(full_key)
            })
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let envelope = self.codec.decode_envelope(&raw)?;
        if self.ttl.is_expired(backend, full_key, &envelope).await? {
            self.ttl.evict(backend, full_key).await?;
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    async fn write_version_marker(&self) -> StorageResult<()> {
        let backend = self.backend()?;
        let key = self.space.meta_key(VERSION_KEY);
        let key = key.as_str();
        let text = self
            .codec
            .seal(Value::String(self.codec.format_version().to_string()), None)?;
        let text = text.as_str();
        self.executor
            .execute(OperationMeta::silent(OperationKind::Set, key), move || {
                backend.set(key, text)
            })
            .await
    }
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field("prefix", &self.space.prefix())
            .field("backend", &self.selected)
            .field("codec", &self.codec)
            .field("debug", &self.is_debug_mode())
            .finish()
    }
}
