// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Feeding a log stream into a multilog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use seqlog_core::{
    Addr, CancellationToken, Item, Log, LogError, Observable, Query, QuerySpec, Seq, Sink,
};
use tracing::trace;

use crate::error::MultiLogError;
use crate::multilog::MultiLog;

/// User processing function of a [`MultiLogSink`].
///
/// Called once per poured value with the value's sequence in the source log
/// and the wrapped multilog, which it typically appends to.
#[async_trait]
pub trait SinkFunc<T>: Send + Sync {
    async fn apply(&self, seq: Seq, value: T, mlog: &dyn MultiLog<T>)
        -> Result<(), MultiLogError>;
}

/// A multilog that is filled by pouring a source stream into it.
///
/// Sub-logs handed out by `get` are read-only: only the processing function
/// writes to the wrapped multilog.
pub struct MultiLogSink<T, M, F> {
    mlog: M,
    func: F,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, M, F> MultiLogSink<T, M, F>
where
    T: Send + Sync + 'static,
    M: MultiLog<T>,
    F: SinkFunc<T>,
{
    pub fn new(mlog: M, func: F) -> Self {
        Self {
            mlog,
            func,
            _marker: std::marker::PhantomData,
        }
    }

    /// The wrapped multilog, writable.
    pub fn inner(&self) -> &M {
        &self.mlog
    }
}

#[async_trait]
impl<T, M, F> Sink<T> for MultiLogSink<T, M, F>
where
    T: Send + Sync + 'static,
    M: MultiLog<T>,
    F: SinkFunc<T>,
{
    type Error = MultiLogError;

    async fn pour(&self, item: Item<T>, cancel: &CancellationToken) -> Result<(), MultiLogError> {
        if cancel.is_cancelled() {
            return Err(LogError::Cancelled.into());
        }
        match item {
            Item::Wrapped(wrapped) => {
                trace!(seq = wrapped.seq, "multilog sink pour");
                self.func.apply(wrapped.seq, wrapped.value, &self.mlog).await
            }
            // Redacted entries have nothing to route.
            Item::Nulled(seq) => {
                trace!(seq, "multilog sink skipped nulled entry");
                Ok(())
            }
            Item::Value(_) => Err(MultiLogError::MissingSeq),
        }
    }
}

#[async_trait]
impl<T, M, F> MultiLog<T> for MultiLogSink<T, M, F>
where
    T: Send + Sync + 'static,
    M: MultiLog<T>,
    F: SinkFunc<T>,
{
    async fn get(&self, addr: &Addr) -> Result<Arc<dyn Log<T>>, MultiLogError> {
        let log = self.mlog.get(addr).await?;
        let handle: Arc<dyn Log<T>> = Arc::new(ReadOnlyLog::new(log));
        Ok(handle)
    }

    async fn list(&self) -> Result<Vec<Addr>, MultiLogError> {
        self.mlog.list().await
    }

    async fn delete(&self, addr: &Addr) -> Result<(), MultiLogError> {
        self.mlog.delete(addr).await
    }

    async fn flush(&self) -> Result<(), MultiLogError> {
        self.mlog.flush().await
    }

    async fn close(&self) -> Result<(), MultiLogError> {
        self.mlog.close().await
    }
}

/// A log handle whose `append` always fails with [`LogError::ReadOnly`].
///
/// Closing it detaches the reader only; the writer keeps the sub-log.
pub struct ReadOnlyLog<T> {
    inner: Arc<dyn Log<T>>,
    closed: AtomicBool,
}

impl<T> ReadOnlyLog<T> {
    pub fn new(inner: Arc<dyn Log<T>>) -> Self {
        Self {
            inner,
            closed: AtomicBool::new(false),
        }
    }

    fn check_attached(&self) -> Result<(), LogError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LogError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Log<T> for ReadOnlyLog<T> {
    fn seq(&self) -> Observable<Seq> {
        self.inner.seq()
    }

    async fn get(&self, seq: Seq) -> Result<T, LogError> {
        self.check_attached()?;
        self.inner.get(seq).await
    }

    async fn append(&self, _value: T) -> Result<Seq, LogError> {
        Err(LogError::ReadOnly)
    }

    fn query(&self, specs: &[QuerySpec]) -> Result<Query<T>, LogError> {
        self.check_attached()?;
        self.inner.query(specs)
    }

    async fn close(&self) -> Result<(), LogError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
