// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core storage backend trait for seqlog.
//
// Defines the `StorageBackend` trait that every persistence engine satisfies:
// a byte-key/byte-value store with put, batched put, get, list, delete and
// close. Logs, multilogs and indexes only ever talk to this trait, so the
// engine behind it is chosen at construction time.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;

/// A backend shared between several logs or indexes.
pub type SharedBackend = Arc<dyn StorageBackend>;

/// Ordered byte-keyed store that logs, multilogs and indexes persist into.
///
/// All keys and values are opaque byte slices. Implementations must be safe
/// to share across threads and tokio tasks.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Value stored under `key`. A missing key is `Ok(None)`, never an error.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write `value` under `key`, replacing what was there.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Write multiple key-value pairs in one transaction.
    ///
    /// Either all entries are written or none are. Entries are applied in
    /// order; backends that cannot guarantee atomicity must at least write in
    /// order so that a trailing marker entry is never durable before the
    /// entries preceding it.
    async fn put_multiple(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError>;

    /// Remove `key`.
    ///
    /// `Ok(false)` means the key was already absent.
    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError>;

    /// Delete several keys in one transaction, returning how many existed.
    async fn delete_multiple(&self, keys: &[&[u8]]) -> Result<usize, StorageError>;

    /// List every key in the store, in lexicographic order.
    async fn list(&self) -> Result<Vec<Vec<u8>>, StorageError>;

    /// At most `limit` entries whose key starts with `prefix`, as
    /// byte-ordered (key, value) pairs.
    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Return the lexicographically greatest key starting with `prefix`.
    ///
    /// The default walks the whole prefix; ordered engines override this
    /// with a reverse range lookup.
    async fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.scan_prefix(prefix, usize::MAX).await?;
        Ok(entries.into_iter().next_back().map(|(k, _)| k))
    }

    /// Make every accepted write durable.
    async fn flush(&self) -> Result<(), StorageError>;

    /// Close the backend. Later operations fail with [`StorageError::Closed`]
    /// on engines that hold OS resources.
    async fn close(&self) -> Result<(), StorageError>;

    /// A human-readable name for this backend, used in logging.
    fn name(&self) -> &str;
}

/// Compute the exclusive upper bound for a prefix scan.
///
/// Given a prefix like `[0x61, 0x62]` ("ab"), returns the first key after all
/// keys starting with that prefix: `[0x61, 0x63]` ("ac"). Returns `None` if
/// the prefix is empty or all 0xFF bytes (no upper bound).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}
