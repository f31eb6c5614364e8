// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// MultiLog whose sub-logs hold sequence numbers of another log.
//
// Each sub-log is one compressed bitmap stored under the address's
// length-prefixed key. Values must be appended in strictly increasing order;
// the entry at position `n` is then the `n`-th smallest member, so reads are a
// bitmap `select` and the head is the cardinality minus one. Every append
// rewrites the sub-log's bitmap with a single `put`.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use roaring::RoaringTreemap;
use seqlog_core::{
    Addr, Entry, EntrySource, Log, LogError, Observable, Query, QuerySpec, Seq, SEQ_EMPTY,
};
use seqlog_storage::SharedBackend;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::MultiLogError;
use crate::handle::SublogHandle;
use crate::multilog::MultiLog;
use crate::store::sublog_prefix;

const OPEN: u8 = 0;
const CLOSED: u8 = 1;
const DELETED: u8 = 2;

/// Recover the address from a bitmap key, or `None` for any other key.
pub fn addr_from_bitmap_key(key: &[u8]) -> Option<Addr> {
    let len_bytes: [u8; 4] = key.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    (key.len() == 4 + len).then(|| Addr::new(&key[4..]))
}

fn encode_bitmap(bitmap: &RoaringTreemap) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::with_capacity(bitmap.serialized_size());
    bitmap.serialize_into(&mut buf)?;
    Ok(buf)
}

fn decode_bitmap(bytes: &[u8]) -> Result<RoaringTreemap, LogError> {
    RoaringTreemap::deserialize_from(bytes)
        .map_err(|e| LogError::Corrupted(format!("stored bitmap: {e}")))
}

fn head_of(bitmap: &RoaringTreemap) -> Seq {
    match bitmap.len() {
        0 => SEQ_EMPTY,
        n => n as Seq - 1,
    }
}

struct BitmapInner {
    backend: SharedBackend,
    key: Vec<u8>,
    bitmap: RwLock<RoaringTreemap>,
    write: Mutex<()>,
    head: Observable<Seq>,
    state: AtomicU8,
}

impl BitmapInner {
    fn bitmap(&self) -> RwLockReadGuard<'_, RoaringTreemap> {
        self.bitmap.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn bitmap_mut(&self) -> RwLockWriteGuard<'_, RoaringTreemap> {
        self.bitmap.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EntrySource<Seq> for BitmapInner {
    async fn read_entry(&self, seq: Seq) -> Result<Entry<Seq>, LogError> {
        let head = self.head.value();
        if seq < 0 || seq > head {
            return Err(LogError::OutOfBounds { seq, head });
        }
        let member = self.bitmap().select(seq as u64);
        match member {
            Some(value) => Ok(Entry::Value(value as Seq)),
            None => Err(LogError::Corrupted(format!("bitmap has no member at {seq}"))),
        }
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

/// A sub-log of sequence numbers backed by one bitmap.
#[derive(Clone)]
struct BitmapLog {
    inner: Arc<BitmapInner>,
}

impl BitmapLog {
    async fn load(backend: SharedBackend, key: Vec<u8>) -> Result<Self, LogError> {
        let bitmap = match backend.get(&key).await? {
            Some(bytes) => decode_bitmap(&bytes)?,
            None => RoaringTreemap::new(),
        };
        let head = head_of(&bitmap);
        Ok(Self {
            inner: Arc::new(BitmapInner {
                backend,
                key,
                bitmap: RwLock::new(bitmap),
                write: Mutex::new(()),
                head: Observable::new(head),
                state: AtomicU8::new(OPEN),
            }),
        })
    }

    /// Drop the stored bitmap and invalidate every handle on this sub-log.
    async fn destroy(&self) -> Result<bool, LogError> {
        let _write = self.inner.write.lock().await;
        self.inner.state.store(DELETED, Ordering::Release);
        self.inner.head.close();
        Ok(self.inner.backend.delete(&self.inner.key).await?)
    }
}

#[async_trait]
impl Log<Seq> for BitmapLog {
    fn seq(&self) -> Observable<Seq> {
        self.inner.head.clone()
    }

    async fn get(&self, seq: Seq) -> Result<Seq, LogError> {
        self.inner.check_usable()?;
        match self.inner.read_entry(seq).await? {
            Entry::Value(value) => Ok(value),
            Entry::Nulled => Err(LogError::Nulled(seq)),
        }
    }

    async fn append(&self, value: Seq) -> Result<Seq, LogError> {
        if value < 0 {
            return Err(LogError::InvalidValue(format!("negative sequence {value}")));
        }
        let member = value as u64;
        let _write = self.inner.write.lock().await;
        self.inner.check_usable()?;

        let (bytes, seq) = {
            let mut bitmap = self.inner.bitmap_mut();
            if let Some(last) = bitmap.max() {
                if member <= last {
                    return Err(LogError::InvalidValue(format!(
                        "sequence {value} is not above {last}"
                    )));
                }
            }
            bitmap.insert(member);
            match encode_bitmap(&bitmap) {
                Ok(bytes) => (bytes, head_of(&bitmap)),
                Err(e) => {
                    bitmap.remove(member);
                    return Err(e);
                }
            }
        };
        // Readers cannot see the new member until the head moves.
        if let Err(e) = self.inner.backend.put(&self.inner.key, &bytes).await {
            self.inner.bitmap_mut().remove(member);
            return Err(e.into());
        }
        self.inner.head.set(seq)?;
        trace!(seq, value, "appended to bitmap sub-log");
        Ok(seq)
    }

    fn query(&self, specs: &[QuerySpec]) -> Result<Query<Seq>, LogError> {
        self.inner.check_usable()?;
        let source: Arc<dyn EntrySource<Seq>> = self.inner.clone();
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

/// A [`MultiLog`] of sequence numbers, one compressed bitmap per address.
///
/// Suited to indexing another log: each sub-log lists the positions of the
/// entries that belong to its address. Sub-logs accept only strictly
/// increasing, non-negative values.
pub struct RoaringMultiLog {
    backend: SharedBackend,
    logs: Mutex<HashMap<Addr, BitmapLog>>,
    closed: AtomicBool,
}

impl RoaringMultiLog {
    pub fn new(backend: SharedBackend) -> Self {
        info!(backend = backend.name(), "opened bitmap multilog");
        Self {
            backend,
            logs: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), MultiLogError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MultiLogError::Closed);
        }
        Ok(())
    }
}

fn handle_for(log: BitmapLog) -> Arc<dyn Log<Seq>> {
    let shared: Arc<dyn Log<Seq>> = Arc::new(log);
    Arc::new(SublogHandle::new(shared))
}

#[async_trait]
impl MultiLog<Seq> for RoaringMultiLog {
    async fn get(&self, addr: &Addr) -> Result<Arc<dyn Log<Seq>>, MultiLogError> {
        self.check_open()?;
        let mut logs = self.logs.lock().await;
        if let Some(log) = logs.get(addr) {
            return Ok(handle_for(log.clone()));
        }
        let log = BitmapLog::load(Arc::clone(&self.backend), sublog_prefix(addr)).await?;
        debug!(%addr, head = log.current_seq(), "loaded bitmap sub-log");
        logs.insert(addr.clone(), log.clone());
        Ok(handle_for(log))
    }

    /// Addresses with a stored bitmap. A bitmap is only written by an
    /// append, so every listed sub-log is non-empty.
    async fn list(&self) -> Result<Vec<Addr>, MultiLogError> {
        self.check_open()?;
        let addrs: BTreeSet<Addr> = self
            .backend
            .list()
            .await?
            .iter()
            .filter_map(|key| addr_from_bitmap_key(key))
            .collect();
        Ok(addrs.into_iter().collect())
    }

    async fn delete(&self, addr: &Addr) -> Result<(), MultiLogError> {
        self.check_open()?;
        let mut logs = self.logs.lock().await;
        let existed = match logs.remove(addr) {
            Some(log) => log.destroy().await?,
            None => self.backend.delete(&sublog_prefix(addr)).await?,
        };
        debug!(%addr, existed, "deleted bitmap sub-log");
        Ok(())
    }

    async fn flush(&self) -> Result<(), MultiLogError> {
        self.check_open()?;
        self.backend.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MultiLogError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let logs: Vec<BitmapLog> = self.logs.lock().await.drain().map(|(_, l)| l).collect();
        for log in logs {
            if let Err(e) = log.close().await {
                warn!(error = %e, "failed to close bitmap sub-log");
            }
        }
        self.backend.close().await?;
        info!("closed bitmap multilog");
        Ok(())
    }
}
