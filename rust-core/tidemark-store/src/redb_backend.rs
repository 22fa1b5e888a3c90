// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent storage backend for Tidemark.
//
// One redb database file plays the role of an origin-scoped persistent
// store: every manager opened over the same file shares its key space and
// isolates itself by prefix.
//
// # Design
//
// - Single redb `Database` file containing one `entries` table of
//   `&str -> &str`.
// - Read transactions for get/keys/len, write transactions for
//   set/remove/clear (serialised by redb internally).
// - Blocking redb calls run on `spawn_blocking` so the async facade never
//   stalls the runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Table holding every fully-qualified key and its rendered envelope.
const ENTRIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// A persistent storage backend powered by redb.
///
/// # Example
///
/// ```rust,no_run
/// use tidemark_store::redb_backend::RedbBackend;
/// use tidemark_store::backend::StorageBackend;
///
/// # tokio_test::block_on(async {
/// let store = RedbBackend::open("/tmp/tidemark-test.redb").unwrap();
/// store.set("hello", "world").await.unwrap();
/// assert_eq!(store.get("hello").await.unwrap(), Some("world".to_string()));
/// # });
/// ```
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// Creates parent directories if they don't exist. The entries table is
    /// created on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "opened redb backend");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Collect every key inside one read transaction. Blocking.
    fn read_keys(db: &Database) -> Result<Vec<String>, StorageError> {
        let txn = db
            .begin_read()
            .map_err(|e| StorageError::Backend(format!("read txn: {e}")))?;
        let table = match txn.open_table(ENTRIES_TABLE) {
            Ok(t) => t,
            // Table doesn't exist yet: nothing has been written.
            Err(_) => return Ok(Vec::new()),
        };

        let iter = table
            .iter()
            .map_err(|e| StorageError::Backend(format!("iterate: {e}")))?;

        let mut keys = Vec::new();
        for entry in iter {
            let (key, _) = entry.map_err(|e| StorageError::Backend(format!("scan entry: {e}")))?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::Backend(format!("task join: {e}"))
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<String>, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::Backend(format!("read txn: {e}")))?;

            let table = match txn.open_table(ENTRIES_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(None),
            };

            match table.get(key.as_str()) {
                Ok(Some(value)) => Ok(Some(value.value().to_string())),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Backend(format!("get: {e}"))),
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let value = value.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(ENTRIES_TABLE)
                    .map_err(|e| StorageError::Backend(format!("open table: {e}")))?;
                table
                    .insert(key.as_str(), value.as_str())
                    .map_err(|e| StorageError::Backend(format!("insert: {e}")))?;
            }
            txn.commit()
                .map_err(|e| StorageError::Backend(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(format!("write txn: {e}")))?;
            let existed;
            {
                let mut table = txn
                    .open_table(ENTRIES_TABLE)
                    .map_err(|e| StorageError::Backend(format!("open table: {e}")))?;
                existed = table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Backend(format!("remove: {e}")))?
                    .is_some();
            }
            txn.commit()
                .map_err(|e| StorageError::Backend(format!("commit: {e}")))?;
            Ok(existed)
        })
        .await
        .map_err(join_error)?
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(format!("write txn: {e}")))?;
            txn.delete_table(ENTRIES_TABLE)
                .map_err(|e| StorageError::Backend(format!("delete table: {e}")))?;
            txn.commit()
                .map_err(|e| StorageError::Backend(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || Self::read_keys(&db))
            .await
            .map_err(join_error)?
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.keys().await?.len())
    }

    fn name(&self) -> &str {
        "redb"
    }
}
