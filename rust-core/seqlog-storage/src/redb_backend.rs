// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Persistent storage backend on redb, a single-file embedded B-tree.
//
// Every key lives in one table. Reads open a read transaction and run
// concurrently; writes share a single write transaction per call, which is
// what makes `put_multiple` atomic: a batch of index entries and its sequence
// marker land in one commit. The head of a log is found by walking its key
// prefix backwards.

use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadOnlyTable, ReadableDatabase, ReadableTable, Table, TableDefinition, TableError};
use tracing::debug;

use crate::backend::{prefix_upper_bound, StorageBackend};
use crate::error::StorageError;

const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

type ReadTable = ReadOnlyTable<&'static [u8], &'static [u8]>;
type WriteTable<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

/// Storage backend persisted to a redb file.
///
/// Clones share the open database and its closed flag.
///
/// ```rust,no_run
/// use seqlog_storage::redb_backend::RedbBackend;
/// use seqlog_storage::backend::StorageBackend;
///
/// # tokio_test::block_on(async {
/// let store = RedbBackend::open("/var/lib/seqlog/feeds.redb").unwrap();
/// store.put(b"feed/\x00\x00\x00\x00\x00\x00\x00\x00", b"{}").await.unwrap();
/// assert!(store.last_key_with_prefix(b"feed/").await.unwrap().is_some());
/// # });
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
    closed: Arc<AtomicBool>,
}

impl RedbBackend {
    /// Open the database at `path`, creating it and any missing parent
    /// directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!("redb open {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "redb backend ready");

        Ok(Self {
            db: Arc::new(db),
            path,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn db(&self) -> Result<Arc<Database>, StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed("redb"));
        }
        Ok(Arc::clone(&self.db))
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn unavailable(what: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::BackendUnavailable(format!("redb {what}: {e}"))
}

fn corrupted(what: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::CorruptedData(format!("redb {what}: {e}"))
}

/// Key range holding every key under `prefix`.
fn prefix_bounds<'a>(prefix: &'a [u8], upper: Option<&'a [u8]>) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
    (
        Bound::Included(prefix),
        upper.map_or(Bound::Unbounded, Bound::Excluded),
    )
}

/// Run `op` against the entries table inside a read transaction on a
/// blocking thread. Returns `empty` when nothing was ever written.
async fn read_txn<R, F>(db: Arc<Database>, empty: R, op: F) -> Result<R, StorageError>
where
    R: Send + 'static,
    F: FnOnce(&ReadTable) -> Result<R, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<R, StorageError> {
        let txn = db.begin_read().map_err(|e| unavailable("begin read", e))?;
        match txn.open_table(ENTRIES) {
            Ok(table) => op(&table),
            Err(TableError::TableDoesNotExist(_)) => Ok(empty),
            Err(e) => Err(unavailable("open table", e)),
        }
    })
    .await
    .map_err(|e| unavailable("blocking task", e))?
}

/// Run `op` inside a write transaction on a blocking thread, committing only
/// if it succeeds.
async fn write_txn<R, F>(db: Arc<Database>, op: F) -> Result<R, StorageError>
where
    R: Send + 'static,
    F: FnOnce(&mut WriteTable<'_>) -> Result<R, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<R, StorageError> {
        let txn = db.begin_write().map_err(|e| unavailable("begin write", e))?;
        let out = {
            let mut table = txn.open_table(ENTRIES).map_err(|e| unavailable("open table", e))?;
            op(&mut table)?
        };
        txn.commit().map_err(|e| corrupted("commit", e))?;
        Ok(out)
    })
    .await
    .map_err(|e| unavailable("blocking task", e))?
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_vec();
        read_txn(self.db()?, None, move |table| {
            let found = table.get(key.as_slice()).map_err(|e| corrupted("get", e))?;
            Ok(found.map(|guard| guard.value().to_vec()))
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let (key, value) = (key.to_vec(), value.to_vec());
        write_txn(self.db()?, move |table| {
            table.insert(key.as_slice(), value.as_slice()).map_err(|e| corrupted("insert", e))?;
            Ok(())
        })
        .await
    }

    async fn put_multiple(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        let batch: Vec<(Vec<u8>, Vec<u8>)> = entries.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
        write_txn(self.db()?, move |table| {
            for (key, value) in &batch {
                table.insert(key.as_slice(), value.as_slice()).map_err(|e| corrupted("insert", e))?;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        let key = key.to_vec();
        write_txn(self.db()?, move |table| {
            let old = table.remove(key.as_slice()).map_err(|e| corrupted("remove", e))?;
            Ok(old.is_some())
        })
        .await
    }

    async fn delete_multiple(&self, keys: &[&[u8]]) -> Result<usize, StorageError> {
        let keys: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
        write_txn(self.db()?, move |table| {
            let mut removed = 0usize;
            for key in &keys {
                if table.remove(key.as_slice()).map_err(|e| corrupted("remove", e))?.is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        read_txn(self.db()?, Vec::new(), |table| {
            let mut keys = Vec::new();
            for entry in table.iter().map_err(|e| corrupted("iter", e))? {
                let (key, _) = entry.map_err(|e| corrupted("iter", e))?;
                keys.push(key.value().to_vec());
            }
            Ok(keys)
        })
        .await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let prefix = prefix.to_vec();
        read_txn(self.db()?, Vec::new(), move |table| {
            let upper = prefix_upper_bound(&prefix);
            let range = table
                .range::<&[u8]>(prefix_bounds(&prefix, upper.as_deref()))
                .map_err(|e| corrupted("range", e))?;
            let mut out = Vec::new();
            for entry in range.take(limit) {
                let (key, value) = entry.map_err(|e| corrupted("range", e))?;
                out.push((key.value().to_vec(), value.value().to_vec()));
            }
            Ok(out)
        })
        .await
    }

    async fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let prefix = prefix.to_vec();
        read_txn(self.db()?, None, move |table| {
            let upper = prefix_upper_bound(&prefix);
            let mut range = table
                .range::<&[u8]>(prefix_bounds(&prefix, upper.as_deref()))
                .map_err(|e| corrupted("range", e))?;
            match range.next_back() {
                Some(entry) => {
                    let (key, _) = entry.map_err(|e| corrupted("range", e))?;
                    Ok(Some(key.value().to_vec()))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn flush(&self) -> Result<(), StorageError> {
        // Commits are already durable.
        self.db().map(drop)
    }

    async fn close(&self) -> Result<(), StorageError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(path = %self.path.display(), "redb backend closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "redb"
    }
}
