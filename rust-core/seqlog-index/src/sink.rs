// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sink index: a projection of a log stream kept in an index.

use std::marker::PhantomData;

use async_trait::async_trait;
use seqlog_core::{
    Addr, CancellationToken, Item, Log, LogError, Observable, Query, QuerySpec, Seq, Sink,
};
use tracing::trace;

use crate::error::IndexError;
use crate::index::{Index, IndexValue, SeqSetterIndex, Setter};

/// Projection run by a [`SinkIndex`] for every source entry.
///
/// Entries between the last durable sequence marker and a crash are replayed
/// once on restart, so `apply` must give the same end state when run twice
/// on the same entry.
#[async_trait]
pub trait IndexFunc<T, V>: Send + Sync {
    async fn apply(&self, seq: Seq, value: T, setter: &dyn Setter<V>) -> Result<(), IndexError>;
}

/// An index fed by pouring a log stream through a projection function.
///
/// The last processed sequence is tracked in the wrapped index, so a query
/// built from [`SinkIndex::query_specs`] resumes right after it.
pub struct SinkIndex<T, V, I, F> {
    idx: I,
    func: F,
    _marker: PhantomData<fn(T) -> V>,
}

impl<T, V, I, F> SinkIndex<T, V, I, F>
where
    T: Send + 'static,
    V: Send + 'static,
    I: SeqSetterIndex<V>,
    F: IndexFunc<T, V>,
{
    pub fn new(idx: I, func: F) -> Self {
        Self {
            idx,
            func,
            _marker: PhantomData,
        }
    }

    pub fn inner(&self) -> &I {
        &self.idx
    }

    /// Options for a query that resumes after the last processed entry.
    pub async fn query_specs(&self) -> Result<Vec<QuerySpec>, IndexError> {
        let seq = self.idx.get_seq().await?;
        Ok(vec![QuerySpec::Gt(seq), QuerySpec::SeqWrap(true)])
    }

    /// Query `log` from where this index left off, with extra options.
    pub async fn resume_query(
        &self,
        log: &dyn Log<T>,
        extra: &[QuerySpec],
    ) -> Result<Query<T>, IndexError> {
        let mut specs = self.query_specs().await?;
        specs.extend_from_slice(extra);
        Ok(log.query(&specs)?)
    }
}

#[async_trait]
impl<T, V, I, F> Sink<T> for SinkIndex<T, V, I, F>
where
    T: Send + 'static,
    V: Send + 'static,
    I: SeqSetterIndex<V>,
    F: IndexFunc<T, V>,
{
    type Error = IndexError;

    async fn pour(&self, item: Item<T>, cancel: &CancellationToken) -> Result<(), IndexError> {
        if cancel.is_cancelled() {
            return Err(LogError::Cancelled.into());
        }
        match item {
            Item::Wrapped(wrapped) => {
                let seq = wrapped.seq;
                self.func.apply(seq, wrapped.value, &self.idx).await?;
                self.idx.set_seq(seq).await?;
                trace!(seq, "sink index processed entry");
                Ok(())
            }
            Item::Nulled(seq) => {
                trace!(seq, "sink index skipped nulled entry");
                Ok(())
            }
            Item::Value(_) => Err(IndexError::MissingSeq),
        }
    }

    async fn close(&self) -> Result<(), IndexError> {
        self.idx.close().await
    }
}

#[async_trait]
impl<T, V, I, F> Index<V> for SinkIndex<T, V, I, F>
where
    T: Send + 'static,
    V: Send + 'static,
    I: SeqSetterIndex<V>,
    F: IndexFunc<T, V>,
{
    async fn get(&self, addr: &Addr) -> Result<Observable<IndexValue<V>>, IndexError> {
        self.idx.get(addr).await
    }
}
