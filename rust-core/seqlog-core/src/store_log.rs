// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Log over a generic key-value backend.
//
// Each entry is stored under `prefix ++ seq` with the sequence as 8 bytes
// big-endian, so the keys of one log sort in sequence order and the head is
// the last key under the prefix. Several logs can share one backend as long
// as no prefix is a prefix of another.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use seqlog_storage::SharedBackend;
use tracing::{debug, info};

use crate::codec::Codec;
use crate::error::LogError;
use crate::log::{check_bounds, Log};
use crate::observable::Observable;
use crate::query::{Entry, EntrySource, Query, QuerySpec};
use crate::seq::{Seq, SEQ_EMPTY};

const OPEN: u8 = 0;
const CLOSED: u8 = 1;
const DELETED: u8 = 2;

/// Storage key of entry `seq` under `prefix`.
pub fn entry_key(prefix: &[u8], seq: Seq) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&(seq as u64).to_be_bytes());
    key
}

/// Decode the sequence from a key produced by [`entry_key`].
pub fn seq_from_key(prefix: &[u8], key: &[u8]) -> Result<Seq, LogError> {
    let raw: [u8; 8] = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.try_into().ok())
        .ok_or_else(|| LogError::Corrupted(format!("bad entry key {}", hex::encode(key))))?;
    let seq = u64::from_be_bytes(raw);
    Seq::try_from(seq).map_err(|_| LogError::Corrupted(format!("sequence {seq} out of range")))
}

struct StoreInner<T> {
    backend: SharedBackend,
    prefix: Vec<u8>,
    codec: Arc<dyn Codec<T>>,
    write: tokio::sync::Mutex<()>,
    head: Observable<Seq>,
    state: AtomicU8,
}

/// A log stored in a [`seqlog_storage::StorageBackend`] under a key prefix.
pub struct StoreLog<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for StoreLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> StoreLog<T> {
    /// Open the log stored under `prefix`, recovering its head from the
    /// highest stored key.
    pub async fn open(
        backend: SharedBackend,
        prefix: impl Into<Vec<u8>>,
        codec: impl Codec<T> + 'static,
    ) -> Result<Self, LogError> {
        Self::open_shared(backend, prefix.into(), Arc::new(codec)).await
    }

    /// Like [`StoreLog::open`] with a codec shared between several logs.
    pub async fn open_shared(
        backend: SharedBackend,
        prefix: Vec<u8>,
        codec: Arc<dyn Codec<T>>,
    ) -> Result<Self, LogError> {
        let head = match backend.last_key_with_prefix(&prefix).await? {
            Some(key) => seq_from_key(&prefix, &key)?,
            None => SEQ_EMPTY,
        };
        info!(backend = backend.name(), head, "opened store log");
        Ok(Self {
            inner: Arc::new(StoreInner {
                backend,
                prefix,
                codec,
                write: tokio::sync::Mutex::new(()),
                head: Observable::new(head),
                state: AtomicU8::new(OPEN),
            }),
        })
    }

    pub fn prefix(&self) -> &[u8] {
        &self.inner.prefix
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == DELETED
    }

    /// Remove every stored entry and invalidate this handle and its clones.
    ///
    /// Runs under the write lock, so no append can land after the purge.
    /// Returns the number of entries removed.
    pub async fn destroy(&self) -> Result<usize, LogError> {
        let _write = self.inner.write.lock().await;
        self.inner.state.store(DELETED, Ordering::Release);
        self.inner.head.close();
        let removed = delete_prefixed(&self.inner.backend, &self.inner.prefix).await?;
        debug!(removed, "destroyed store log");
        Ok(removed)
    }
}

/// Delete every key under `prefix`.
pub async fn delete_prefixed(backend: &SharedBackend, prefix: &[u8]) -> Result<usize, LogError> {
    let entries = backend.scan_prefix(prefix, usize::MAX).await?;
    let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
    Ok(backend.delete_multiple(&keys).await?)
}

#[async_trait]
impl<T: Send + Sync + 'static> EntrySource<T> for StoreInner<T> {
    async fn read_entry(&self, seq: Seq) -> Result<Entry<T>, LogError> {
        check_bounds(seq, self.head.value())?;
        let key = entry_key(&self.prefix, seq);
        let bytes = self.backend.get(&key).await?.ok_or_else(|| {
            LogError::Corrupted(format!("entry {seq} missing below head"))
        })?;
        Ok(Entry::Value(self.codec.decode(&bytes)?))
    }

    fn head(&self) -> &Observable<Seq> {
        &self.head
    }

    fn check_usable(&self) -> Result<(), LogError> {
        match self.state.load(Ordering::Acquire) {
            OPEN => Ok(()),
            DELETED => Err(LogError::SublogDeleted),
            _ => Err(LogError::Closed),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Log<T> for StoreLog<T> {
    fn seq(&self) -> Observable<Seq> {
        self.inner.head.clone()
    }

    async fn get(&self, seq: Seq) -> Result<T, LogError> {
        self.inner.check_usable()?;
        match self.inner.read_entry(seq).await? {
            Entry::Value(v) => Ok(v),
            Entry::Nulled => Err(LogError::Nulled(seq)),
        }
    }

    async fn append(&self, value: T) -> Result<Seq, LogError> {
        let bytes = self.inner.codec.encode(&value)?;
        let _write = self.inner.write.lock().await;
        self.inner.check_usable()?;
        let seq = self.inner.head.value() + 1;
        self.inner
            .backend
            .put(&entry_key(&self.inner.prefix, seq), &bytes)
            .await?;
        self.inner.head.set(seq)?;
        debug!(seq, "appended to store log");
        Ok(seq)
    }

    fn query(&self, specs: &[QuerySpec]) -> Result<Query<T>, LogError> {
        self.inner.check_usable()?;
        let source: Arc<dyn EntrySource<T>> = self.inner.clone();
        Query::from_specs(source, specs)
    }

    async fn close(&self) -> Result<(), LogError> {
        let _write = self.inner.write.lock().await;
        let _ = self
            .inner
            .state
            .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire);
        self.inner.head.close();
        Ok(())
    }
}
