// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-caller handles onto shared sub-logs.
//
// A multilog caches one log per address and hands every caller its own
// handle. Closing a handle detaches that caller only; the cached log stays
// open for everyone else until the multilog itself is closed or the address
// is deleted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use seqlog_core::{Log, LogError, Observable, Query, QuerySpec, Seq};

/// One caller's view of a sub-log owned by a multilog.
pub struct SublogHandle<T> {
    inner: Arc<dyn Log<T>>,
    closed: AtomicBool,
}

impl<T> SublogHandle<T> {
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
impl<T: Send + Sync + 'static> Log<T> for SublogHandle<T> {
    fn seq(&self) -> Observable<Seq> {
        self.inner.seq()
    }

    async fn get(&self, seq: Seq) -> Result<T, LogError> {
        self.check_attached()?;
        self.inner.get(seq).await
    }

    async fn append(&self, value: T) -> Result<Seq, LogError> {
        self.check_attached()?;
        self.inner.append(value).await
    }

    fn query(&self, specs: &[QuerySpec]) -> Result<Query<T>, LogError> {
        self.check_attached()?;
        self.inner.query(specs)
    }

    /// Detach this handle. The shared sub-log and its head stay open.
    async fn close(&self) -> Result<(), LogError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
