// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Versioned data migrations for Tidemark.
//
// Migrations are kept sorted by `major.minor.patch`. A marker under the
// reserved namespace records the last applied version, so a migration runs
// at most once per store no matter how many managers are opened on it.
//
// Passes are best-effort: a key whose transform fails is logged and skipped,
// and the marker still advances once every key has been attempted.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::codec::Codec;
use crate::error::{StorageError, StorageResult};
use crate::history::OperationKind;
use crate::keyspace::{KeySpace, LAST_MIGRATION_KEY};
use crate::retry::{OperationMeta, RetryExecutor};

/// A value transform. Errors are reported per key and never abort a pass.
pub type MigrationFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// A `major.minor.patch` version compared field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MigrationVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl MigrationVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a dotted version. Missing or non-numeric fields read as zero, so
    /// `"2"` is `2.0.0` and `"1.x.3"` is `1.0.3`.
    pub fn parse(text: &str) -> Self {
        let mut fields = text
            .trim()
            .split('.')
            .map(|field| field.trim().parse::<u64>().unwrap_or(0));
        Self {
            major: fields.next().unwrap_or(0),
            minor: fields.next().unwrap_or(0),
            patch: fields.next().unwrap_or(0),
        }
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl From<&str> for MigrationVersion {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One registered migration.
#[derive(Clone)]
pub struct Migration {
    pub version: MigrationVersion,
    pub description: String,
    pub migrate: MigrationFn,
    pub rollback: Option<MigrationFn>,
}

impl Migration {
    pub fn new<F>(version: &str, description: impl Into<String>, migrate: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            version: MigrationVersion::parse(version),
            description: description.into(),
            migrate: Arc::new(migrate),
            rollback: None,
        }
    }

    /// Attach the inverse transform used by [`MigrationRunner::rollback_to`].
    pub fn with_rollback<F>(mut self, rollback: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.rollback = Some(Arc::new(rollback));
        self
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("reversible", &self.rollback.is_some())
            .finish()
    }
}

/// Registered migrations, ascending by version. Equal versions keep their
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, migration: Migration) {
        self.migrations.push(migration);
        self.migrations.sort_by_key(|m| m.version);
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// All migrations in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    /// Migrations newer than `applied`, ascending. Everything is pending
    /// when nothing has been applied.
    pub fn pending(&self, applied: Option<MigrationVersion>) -> impl Iterator<Item = &Migration> {
        self.migrations
            .iter()
            .filter(move |m| applied.map_or(true, |at| m.version > at))
    }
}

/// Outcome of a migration or rollback run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions whose pass completed, in the order they ran.
    pub applied: Vec<MigrationVersion>,
    /// Entries skipped because they could not be decoded, transformed or
    /// written back.
    pub key_failures: usize,
    /// Marker value after the run.
    pub marker: Option<MigrationVersion>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Applies registered migrations to every user entry of a key space.
pub struct MigrationRunner {
    space: KeySpace,
    codec: Arc<Codec>,
    executor: Arc<RetryExecutor>,
}

impl MigrationRunner {
    pub fn new(space: KeySpace, codec: Arc<Codec>, executor: Arc<RetryExecutor>) -> Self {
        Self {
            space,
            codec,
            executor,
        }
    }

    /// The persisted "last applied" marker, if any.
    pub async fn last_applied(&self, backend: &dyn StorageBackend) -> StorageResult<Option<MigrationVersion>> {
        let marker_key = self.space.meta_key(LAST_MIGRATION_KEY);
        let marker_key = marker_key.as_str();
        let raw = self
            .executor
            .execute(OperationMeta::silent(OperationKind::Get, marker_key), move || {
                backend.get(marker_key)
            })
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match self.codec.deserialize(&raw) {
            Ok(Value::String(version)) => Ok(Some(MigrationVersion::parse(&version))),
            Ok(_) | Err(_) => {
                warn!(key = marker_key, "ignoring unreadable migration marker");
                Ok(None)
            }
        }
    }

    /// Apply every migration newer than the marker, ascending.
    pub async fn run_pending(
        &self,
        backend: &dyn StorageBackend,
        registry: &MigrationRegistry,
    ) -> StorageResult<MigrationReport> {
        let mut marker = self.last_applied(backend).await?;
        let mut report = MigrationReport {
            marker,
            ..MigrationReport::default()
        };

        let pending: Vec<&Migration> = registry.pending(marker).collect();
        if pending.is_empty() {
            debug!(prefix = self.space.prefix(), "no pending migrations");
            return Ok(report);
        }

        for migration in pending {
            info!(
                version = %migration.version,
                description = %migration.description,
                "applying migration"
            );
            report.key_failures += self.pass(backend, migration.version, &migration.migrate).await?;
            self.write_marker(backend, migration.version).await?;
            marker = Some(migration.version);
            report.applied.push(migration.version);
        }

        report.marker = marker;
        Ok(report)
    }

    /// Undo applied migrations newer than `target`, newest first, then set
    /// the marker to `target`. Migrations without a rollback are skipped.
    pub async fn rollback_to(
        &self,
        backend: &dyn StorageBackend,
        registry: &MigrationRegistry,
        target: MigrationVersion,
    ) -> StorageResult<MigrationReport> {
        let marker = self.last_applied(backend).await?;
        let mut report = MigrationReport {
            marker,
            ..MigrationReport::default()
        };
        let Some(applied) = marker else {
            return Ok(report);
        };
        if target >= applied {
            return Ok(report);
        }

        let undo: Vec<&Migration> = registry
            .iter()
            .filter(|m| m.version > target && m.version <= applied)
            .collect();

        for migration in undo.into_iter().rev() {
            let Some(rollback) = &migration.rollback else {
                warn!(version = %migration.version, "migration has no rollback, skipping");
                continue;
            };
            info!(version = %migration.version, "rolling back migration");
            report.key_failures += self.pass(backend, migration.version, rollback).await?;
            report.applied.push(migration.version);
        }

        self.write_marker(backend, target).await?;
        report.marker = Some(target);
        Ok(report)
    }

    /// Transform every non-null user entry. Returns the number of entries
    /// that were skipped.
    async fn pass(
        &self,
        backend: &dyn StorageBackend,
        version: MigrationVersion,
        transform: &MigrationFn,
    ) -> StorageResult<usize> {
        let keys = self
            .executor
            .execute(OperationMeta::silent(OperationKind::Get, self.space.prefix()), move || {
                backend.keys()
            })
            .await?;

        let mut failures = 0;
        for (full_key, logical) in self.space.user_entries(&keys) {
            match self.migrate_entry(backend, full_key, version, transform).await {
                Ok(()) => {}
                Err(err) => {
                    failures += 1;
                    warn!(version = %version, key = logical, error = %err, "migration skipped key");
                }
            }
        }
        Ok(failures)
    }

    async fn migrate_entry(
        &self,
        backend: &dyn StorageBackend,
        full_key: &str,
        version: MigrationVersion,
        transform: &MigrationFn,
    ) -> StorageResult<()> {
        let raw = self
            .executor
            .execute(OperationMeta::silent(OperationKind::Get, full_key), move || {
                backend.get(full_key)
            })
            .await?;
        let Some(raw) = raw else {
            return Ok(());
        };
        let envelope = self.codec.decode_envelope(&raw)?;
        if envelope.value.is_null() {
            return Ok(());
        }

        let migrated = transform(envelope.value).map_err(|message| StorageError::Migration {
            version: version.to_string(),
            message,
        })?;
        let text = self.codec.seal(migrated, envelope.expires_at)?;
        let text = text.as_str();
        self.executor
            .execute(OperationMeta::silent(OperationKind::Set, full_key), move || {
                backend.set(full_key, text)
            })
            .await
    }

    async fn write_marker(&self, backend: &dyn StorageBackend, version: MigrationVersion) -> StorageResult<()> {
        let marker_key = self.space.meta_key(LAST_MIGRATION_KEY);
        let marker_key = marker_key.as_str();
        let text = self.codec.seal(Value::String(version.to_string()), None)?;
        let text = text.as_str();
        self.executor
            .execute(OperationMeta::silent(OperationKind::Set, marker_key), move || {
                backend.set(marker_key, text)
            })
            .await
            .map_err(|err| StorageError::Migration {
                version: version.to_string(),
                message: format!("could not record marker: {err}"),
            })
    }
}
