// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Observable index persisted to a key-value backend in batches.
//
// Writes land in an in-memory batch and update the cached observable under the
// same lock, so observers see values in the order they are persisted.
// A background task flushes the batch on a timer; a write that would push the
// batch past `max_batch` flushes synchronously first. Each flush stores the
// batched values together with the sequence marker in one `put_multiple`, so
// the marker never runs ahead of the data it covers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use seqlog_core::{Addr, Codec, Observable, Seq, SEQ_EMPTY, SEQ_NOT_LOADED};
use seqlog_storage::SharedBackend;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::index::{Index, IndexValue, SeqSetterIndex, Setter};

/// Storage key of the last processed sequence.
pub const CURRENT_SEQ_KEY: &[u8] = b"__current_seq";

struct State<V> {
    batch: BTreeMap<Vec<u8>, Vec<u8>>,
    observables: HashMap<Addr, Observable<IndexValue<V>>>,
    cur_seq: Seq,
    seq_dirty: bool,
}

struct Shared<V> {
    backend: SharedBackend,
    codec: Arc<dyn Codec<V>>,
    max_batch: usize,
    state: Mutex<State<V>>,
    flush_requested: Notify,
    closed: AtomicBool,
}

/// A [`SeqSetterIndex`] over a [`SharedBackend`].
///
/// The backend may be shared with other data as long as the keys do not
/// collide; wrap it in a `PrefixedBackend` otherwise.
pub struct StoreIndex<V> {
    shared: Arc<Shared<V>>,
    stop: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<V: Clone + Send + Sync + 'static> StoreIndex<V> {
    /// Open an index and start its background flush task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(backend: SharedBackend, codec: impl Codec<V> + 'static, config: IndexConfig) -> Self {
        info!(
            backend = backend.name(),
            flush_ms = config.flush_interval.as_millis() as u64,
            max_batch = config.max_batch,
            "opened store index"
        );
        let shared = Arc::new(Shared {
            backend,
            codec: Arc::new(codec),
            max_batch: config.max_batch.max(1),
            state: Mutex::new(State {
                batch: BTreeMap::new(),
                observables: HashMap::new(),
                cur_seq: SEQ_NOT_LOADED,
                seq_dirty: false,
            }),
            flush_requested: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let stop = CancellationToken::new();
        let task = tokio::spawn(flush_loop(
            Arc::clone(&shared),
            config,
            stop.clone(),
        ));
        Self {
            shared,
            stop,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Number of writes waiting for the next flush.
    pub async fn pending(&self) -> usize {
        self.shared.state.lock().await.batch.len()
    }

    /// Wake the background task to flush without waiting for it.
    pub fn request_flush(&self) {
        self.shared.flush_requested.notify_one();
    }

    fn check_open(&self) -> Result<(), IndexError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(IndexError::Closed);
        }
        Ok(())
    }
}

fn check_addr(addr: &Addr) -> Result<(), IndexError> {
    if addr.as_bytes() == CURRENT_SEQ_KEY {
        return Err(IndexError::ReservedAddr);
    }
    Ok(())
}

fn decode_seq(bytes: &[u8]) -> Result<Seq, IndexError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| IndexError::CorruptedSeq(bytes.len()))?;
    Ok(u64::from_be_bytes(raw) as Seq)
}

impl<V: Clone + Send + Sync + 'static> Shared<V> {
    /// Write the batch and the sequence marker. The batch is kept if the
    /// write fails so a later flush can retry it.
    async fn flush_locked(&self, state: &mut State<V>) -> Result<(), IndexError> {
        if state.batch.is_empty() && !state.seq_dirty {
            return Ok(());
        }
        let marker = (state.cur_seq as u64).to_be_bytes();
        let mut entries: Vec<(&[u8], &[u8])> = state
            .batch
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        if state.cur_seq != SEQ_NOT_LOADED {
            entries.push((CURRENT_SEQ_KEY, &marker[..]));
        }
        self.backend.put_multiple(&entries).await?;

        debug!(
            written = state.batch.len(),
            seq = state.cur_seq,
            "flushed index batch"
        );
        state.batch.clear();
        state.seq_dirty = false;
        Ok(())
    }

    async fn flush(&self) -> Result<(), IndexError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }
}

async fn flush_loop<V: Clone + Send + Sync + 'static>(
    shared: Arc<Shared<V>>,
    config: IndexConfig,
    stop: CancellationToken,
) {
    let period = config.flush_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
            _ = shared.flush_requested.notified() => {}
        }
        if let Err(e) = shared.flush().await {
            warn!(error = %e, "background index flush failed");
        }
    }

    if let Err(e) = shared.flush().await {
        warn!(error = %e, "final index flush failed");
    }
    debug!("index flush task stopped");
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> Index<V> for StoreIndex<V> {
    async fn get(&self, addr: &Addr) -> Result<Observable<IndexValue<V>>, IndexError> {
        self.check_open()?;
        check_addr(addr)?;
        let mut state = self.shared.state.lock().await;
        if let Some(obv) = state.observables.get(addr) {
            return Ok(obv.clone());
        }

        let value = match self.shared.backend.get(addr.as_bytes()).await? {
            Some(bytes) => IndexValue::Set(self.shared.codec.decode(&bytes)?),
            None => IndexValue::Unset,
        };
        let obv = Observable::new(value);
        state.observables.insert(addr.clone(), obv.clone());
        Ok(obv)
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> Setter<V> for StoreIndex<V> {
    async fn set(&self, addr: &Addr, value: V) -> Result<(), IndexError> {
        self.check_open()?;
        check_addr(addr)?;
        let bytes = self.shared.codec.encode(&value)?;

        let mut state = self.shared.state.lock().await;
        let key = addr.as_bytes();
        if state.batch.len() >= self.shared.max_batch && !state.batch.contains_key(key) {
            debug!(pending = state.batch.len(), "index batch full, flushing inline");
            self.shared.flush_locked(&mut state).await?;
        }
        state.batch.insert(key.to_vec(), bytes);

        // Notified under the state lock so observers see writes in batch order.
        match state.observables.get(addr) {
            Some(obv) => obv.set(IndexValue::Set(value))?,
            None => {
                state
                    .observables
                    .insert(addr.clone(), Observable::new(IndexValue::Set(value)));
            }
        }
        Ok(())
    }

    async fn delete(&self, addr: &Addr) -> Result<(), IndexError> {
        self.check_open()?;
        check_addr(addr)?;
        let mut state = self.shared.state.lock().await;
        // A pending write must not resurrect the value on the next flush.
        state.batch.remove(addr.as_bytes());
        self.shared.backend.delete(addr.as_bytes()).await?;
        if let Some(obv) = state.observables.get(addr) {
            obv.set(IndexValue::Unset)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> SeqSetterIndex<V> for StoreIndex<V> {
    async fn set_seq(&self, seq: Seq) -> Result<(), IndexError> {
        self.check_open()?;
        let mut state = self.shared.state.lock().await;
        state.cur_seq = seq;
        state.seq_dirty = true;
        Ok(())
    }

    async fn get_seq(&self) -> Result<Seq, IndexError> {
        self.check_open()?;
        let mut state = self.shared.state.lock().await;
        if state.cur_seq == SEQ_NOT_LOADED {
            state.cur_seq = match self.shared.backend.get(CURRENT_SEQ_KEY).await? {
                Some(bytes) => decode_seq(&bytes)?,
                None => SEQ_EMPTY,
            };
            debug!(seq = state.cur_seq, "loaded index sequence marker");
        }
        Ok(state.cur_seq)
    }

    async fn flush(&self) -> Result<(), IndexError> {
        self.check_open()?;
        self.shared.flush().await
    }

    async fn close(&self) -> Result<(), IndexError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "index flush task panicked");
            }
        }

        let mut state = self.shared.state.lock().await;
        // Surfaces an error the background task could only log.
        self.shared.flush_locked(&mut state).await?;
        for (_, obv) in state.observables.drain() {
            obv.close();
        }
        info!("closed store index");
        Ok(())
    }
}

impl<V> Drop for StoreIndex<V> {
    fn drop(&mut self) {
        // The task still does its final flush.
        self.stop.cancel();
    }
}
