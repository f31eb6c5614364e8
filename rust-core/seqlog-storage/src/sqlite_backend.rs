// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite storage backend for seqlog.
//
// A single `kv` table with a BLOB primary key. SQLite compares BLOBs with
// memcmp, so `ORDER BY key` is the same lexicographic order every other
// backend uses. The connection is guarded by a std mutex and every call runs
// on the blocking pool, like the redb backend.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::backend::{prefix_upper_bound, StorageBackend};
use crate::error::StorageError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key   BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID;";

/// A storage backend on a single SQLite table.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn sql_error(e: rusqlite::Error) -> StorageError {
    StorageError::BackendUnavailable(format!("sqlite: {e}"))
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::BackendUnavailable(format!("task join: {e}"))
}

impl SqliteBackend {
    /// Open or create a database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path).map_err(sql_error)?;
        // WAL keeps readers off the writer's back; in-memory reports "memory".
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(sql_error)?;
        let backend = Self::from_connection(conn, Some(path.clone()))?;
        debug!(path = %path.display(), "opened sqlite backend");
        Ok(backend)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA).map_err(sql_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Return the database path, or `None` for an in-memory database.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<R, F>(&self, op: F) -> Result<R, StorageError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R, rusqlite::Error> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed("sqlite"));
        }
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut guard).map_err(sql_error)
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_vec();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.put_multiple(&[(key, value)]).await
    }

    async fn put_multiple(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        let owned: Vec<(Vec<u8>, Vec<u8>)> = entries
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?;
                for (key, value) in &owned {
                    stmt.execute(params![key, value])?;
                }
            }
            tx.commit()
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.delete_multiple(&[key]).await? == 1)
    }

    async fn delete_multiple(&self, keys: &[&[u8]]) -> Result<usize, StorageError> {
        let owned: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM kv WHERE key = ?1")?;
                for key in &owned {
                    removed += stmt.execute(params![key])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT key FROM kv ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let lower = prefix.to_vec();
        let upper = prefix_upper_bound(prefix);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(Vec<u8>, Vec<u8>)> {
                Ok((row.get(0)?, row.get(1)?))
            };
            let rows = match upper {
                Some(upper) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 \
                         ORDER BY key LIMIT ?3",
                    )?;
                    let rows = stmt
                        .query_map(params![lower, upper, limit], map_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key LIMIT ?2",
                    )?;
                    let rows = stmt
                        .query_map(params![lower, limit], map_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
            };
            Ok(rows)
        })
        .await
    }

    async fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let lower = prefix.to_vec();
        let upper = prefix_upper_bound(prefix);
        self.with_conn(move |conn| match upper {
            Some(upper) => conn
                .query_row(
                    "SELECT key FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key DESC LIMIT 1",
                    params![lower, upper],
                    |row| row.get(0),
                )
                .optional(),
            None => conn
                .query_row(
                    "SELECT key FROM kv WHERE key >= ?1 ORDER BY key DESC LIMIT 1",
                    params![lower],
                    |row| row.get(0),
                )
                .optional(),
        })
        .await
    }

    async fn flush(&self) -> Result<(), StorageError> {
        // Every transaction is committed before returning.
        self.with_conn(|_| Ok(())).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
