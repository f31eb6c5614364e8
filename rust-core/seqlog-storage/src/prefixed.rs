// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key-prefix isolation for seqlog storage.
//
// Wraps a shared backend so that every key is transparently prefixed with a
// fixed namespace. Several logs, multilogs and indexes can then share one
// physical store without key collisions. Keys returned by `list` and
// `scan_prefix` have the namespace stripped again.

use async_trait::async_trait;

use crate::backend::{SharedBackend, StorageBackend};
use crate::error::StorageError;

/// A view of a backend restricted to keys under one namespace.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use seqlog_storage::{InMemoryBackend, PrefixedBackend, StorageBackend};
///
/// # tokio_test::block_on(async {
/// let shared = Arc::new(InMemoryBackend::new());
/// let a = PrefixedBackend::new(shared.clone(), "a:");
/// let b = PrefixedBackend::new(shared.clone(), "b:");
///
/// a.put(b"key", b"1").await.unwrap();
/// assert_eq!(b.get(b"key").await.unwrap(), None);
/// assert_eq!(shared.get(b"a:key").await.unwrap(), Some(b"1".to_vec()));
/// # });
/// ```
#[derive(Clone)]
pub struct PrefixedBackend {
    inner: SharedBackend,
    namespace: Vec<u8>,
    name: String,
}

impl PrefixedBackend {
    /// Wrap `inner`, prefixing every key with `namespace`.
    pub fn new(inner: SharedBackend, namespace: impl AsRef<[u8]>) -> Self {
        let namespace = namespace.as_ref().to_vec();
        let name = format!("{}[{}]", inner.name(), hex::encode(&namespace));
        Self {
            inner,
            namespace,
            name,
        }
    }

    /// Return the namespace prefix.
    pub fn namespace(&self) -> &[u8] {
        &self.namespace
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.namespace.len() + key.len());
        full.extend_from_slice(&self.namespace);
        full.extend_from_slice(key);
        full
    }

    fn strip(&self, key: Vec<u8>) -> Vec<u8> {
        key[self.namespace.len()..].to_vec()
    }
}

impl std::fmt::Debug for PrefixedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedBackend").field("name", &self.name).finish()
    }
}

#[async_trait]
impl StorageBackend for PrefixedBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(&self.full_key(key)).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.inner.put(&self.full_key(key), value).await
    }

    async fn put_multiple(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        let keys: Vec<Vec<u8>> = entries.iter().map(|(k, _)| self.full_key(k)).collect();
        let full: Vec<(&[u8], &[u8])> = keys
            .iter()
            .zip(entries)
            .map(|(k, (_, v))| (k.as_slice(), *v))
            .collect();
        self.inner.put_multiple(&full).await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.inner.delete(&self.full_key(key)).await
    }

    async fn delete_multiple(&self, keys: &[&[u8]]) -> Result<usize, StorageError> {
        let owned: Vec<Vec<u8>> = keys.iter().map(|k| self.full_key(k)).collect();
        let refs: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        self.inner.delete_multiple(&refs).await
    }

    async fn list(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let entries = self.inner.scan_prefix(&self.namespace, usize::MAX).await?;
        Ok(entries.into_iter().map(|(k, _)| self.strip(k)).collect())
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let entries = self.inner.scan_prefix(&self.full_key(prefix), limit).await?;
        Ok(entries
            .into_iter()
            .map(|(k, v)| (self.strip(k), v))
            .collect())
    }

    async fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let last = self.inner.last_key_with_prefix(&self.full_key(prefix)).await?;
        Ok(last.map(|k| self.strip(k)))
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.inner.flush().await
    }

    async fn close(&self) -> Result<(), StorageError> {
        // The physical store is shared; closing one view leaves the others open.
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let shared: SharedBackend = Arc::new(InMemoryBackend::new());
        let left = PrefixedBackend::new(shared.clone(), b"L");
        let right = PrefixedBackend::new(shared.clone(), b"R");

        left.put_multiple(&[(b"1" as &[u8], b"a" as &[u8]), (b"2", b"b")])
            .await
            .unwrap();
        right.put(b"1", b"z").await.unwrap();

        assert_eq!(left.list().await.unwrap(), vec![b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(right.list().await.unwrap(), vec![b"1".to_vec()]);
        assert_eq!(right.get(b"1").await.unwrap(), Some(b"z".to_vec()));
        assert_eq!(shared.list().await.unwrap().len(), 3);

        assert_eq!(
            left.last_key_with_prefix(b"").await.unwrap(),
            Some(b"2".to_vec())
        );
        assert_eq!(left.delete_multiple(&[b"1" as &[u8], b"2"]).await.unwrap(), 2);
        assert!(left.list().await.unwrap().is_empty());
        assert_eq!(right.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_name_mentions_inner_backend() {
        let shared: SharedBackend = Arc::new(InMemoryBackend::new());
        let view = PrefixedBackend::new(shared, b"ns");
        assert_eq!(view.name(), "in-memory[6e73]");
    }
}
