// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory storage backend for seqlog.
//
// Entries live in a sorted map behind an async read/write lock, so prefix
// scans and head lookups are plain range queries. Clones share the map;
// dropping a log and reopening it on a clone behaves like a restart.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{prefix_upper_bound, StorageBackend};
use crate::error::StorageError;

type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile backend for tests and short-lived logs.
///
/// ```rust
/// use seqlog_storage::memory::InMemoryBackend;
/// use seqlog_storage::backend::StorageBackend;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBackend::new();
/// store.put(b"feed/\x00\x00\x00\x00\x00\x00\x00\x00", b"first").await.unwrap();
/// let head = store.last_key_with_prefix(b"feed/").await.unwrap();
/// assert_eq!(head.as_deref(), Some(&b"feed/\x00\x00\x00\x00\x00\x00\x00\x00"[..]));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    entries: Arc<RwLock<Entries>>,
}

/// Range bounds covering every key that starts with `prefix`.
fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let upper = prefix_upper_bound(prefix).map_or(Bound::Unbounded, Bound::Excluded);
    (Bound::Included(prefix.to_vec()), upper)
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn put_multiple(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        // One write guard for the whole batch keeps it atomic for readers.
        let mut guard = self.entries.write().await;
        guard.extend(entries.iter().map(|(k, v)| (k.to_vec(), v.to_vec())));
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_multiple(&self, keys: &[&[u8]]) -> Result<usize, StorageError> {
        let mut guard = self.entries.write().await;
        Ok(keys.iter().filter(|key| guard.remove(**key).is_some()).count())
    }

    async fn list(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let guard = self.entries.read().await;
        Ok(guard
            .range(prefix_range(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let guard = self.entries.read().await;
        Ok(guard.range(prefix_range(prefix)).next_back().map(|(k, _)| k.clone()))
    }

    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        // Entries outlive close for as long as a clone is held.
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
