// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// MultiLog over a single key-value backend.
//
// Every sub-log is a `StoreLog` whose key prefix is the address with a 4-byte
// big-endian length in front. The length makes the prefixes of two distinct
// addresses disjoint, so "a" and "ab" never see each other's entries.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use seqlog_core::store_log::delete_prefixed;
use seqlog_core::{Addr, Codec, Log, StoreLog};
use seqlog_storage::SharedBackend;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::MultiLogError;
use crate::handle::SublogHandle;
use crate::multilog::MultiLog;

const SEQ_LEN: usize = 8;
const LEN_PREFIX: usize = 4;

/// Key prefix of the sub-log at `addr`.
pub fn sublog_prefix(addr: &Addr) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(LEN_PREFIX + addr.len());
    prefix.extend_from_slice(&(addr.len() as u32).to_be_bytes());
    prefix.extend_from_slice(addr.as_bytes());
    prefix
}

/// Recover the address from a stored entry key.
pub fn addr_from_key(key: &[u8]) -> Result<Addr, MultiLogError> {
    let malformed = || MultiLogError::MalformedKey(format!("{key:02x?}"));
    let len_bytes: [u8; LEN_PREFIX] = key
        .get(..LEN_PREFIX)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(malformed)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if key.len() != LEN_PREFIX + len + SEQ_LEN {
        return Err(malformed());
    }
    Ok(Addr::new(&key[LEN_PREFIX..LEN_PREFIX + len]))
}

fn handle_for<T: Send + Sync + 'static>(log: StoreLog<T>) -> Arc<dyn Log<T>> {
    let shared: Arc<dyn Log<T>> = Arc::new(log);
    Arc::new(SublogHandle::new(shared))
}

/// A [`MultiLog`] storing all sub-logs in one [`SharedBackend`].
///
/// Sub-logs are cached so that every `get` for the same address shares one
/// head observable, and live queries on one handle see appends made through
/// another. Each `get` returns a fresh [`SublogHandle`]; closing it does not
/// close the cached sub-log.
///
/// `list` ignores keys outside the multilog layout, but a foreign key can
/// still happen to parse as an entry key. Give the multilog a backend of its
/// own, or a `PrefixedBackend`, when the store holds other data.
pub struct StoreMultiLog<T> {
    backend: SharedBackend,
    codec: Arc<dyn Codec<T>>,
    logs: Mutex<HashMap<Addr, StoreLog<T>>>,
    closed: AtomicBool,
}

impl<T: Send + Sync + 'static> StoreMultiLog<T> {
    pub fn new(backend: SharedBackend, codec: impl Codec<T> + 'static) -> Self {
        info!(backend = backend.name(), "opened store multilog");
        Self {
            backend,
            codec: Arc::new(codec),
            logs: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn check_open(&self) -> Result<(), MultiLogError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MultiLogError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> MultiLog<T> for StoreMultiLog<T> {
    async fn get(&self, addr: &Addr) -> Result<Arc<dyn Log<T>>, MultiLogError> {
        self.check_open()?;
        let mut logs = self.logs.lock().await;
        if let Some(log) = logs.get(addr) {
            return Ok(handle_for(log.clone()));
        }

        let log = StoreLog::open_shared(
            Arc::clone(&self.backend),
            sublog_prefix(addr),
            Arc::clone(&self.codec),
        )
        .await?;
        debug!(%addr, head = log.current_seq(), "opened sub-log");
        logs.insert(addr.clone(), log.clone());
        Ok(handle_for(log))
    }

    async fn list(&self) -> Result<Vec<Addr>, MultiLogError> {
        self.check_open()?;
        let keys = self.backend.list().await?;
        let mut addrs = BTreeSet::new();
        for key in keys {
            match addr_from_key(&key) {
                Ok(addr) => {
                    addrs.insert(addr);
                }
                Err(e) => trace!(error = %e, "skipping foreign key in multilog list"),
            }
        }
        Ok(addrs.into_iter().collect())
    }

    async fn delete(&self, addr: &Addr) -> Result<(), MultiLogError> {
        self.check_open()?;
        // Held across the purge so a concurrent `get` cannot reopen the
        // prefix half way through.
        let mut logs = self.logs.lock().await;
        let removed = match logs.remove(addr) {
            Some(log) => log.destroy().await?,
            None => delete_prefixed(&self.backend, &sublog_prefix(addr)).await?,
        };
        debug!(%addr, removed, "deleted sub-log");
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
        let logs: Vec<StoreLog<T>> = self.logs.lock().await.drain().map(|(_, l)| l).collect();
        for log in logs {
            if let Err(e) = log.close().await {
                warn!(error = %e, "failed to close sub-log");
            }
        }
        self.backend.close().await?;
        info!("closed store multilog");
        Ok(())
    }
}
