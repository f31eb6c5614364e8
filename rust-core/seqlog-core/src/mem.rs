// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory log.
//
// Entries live in a `Vec` behind a std `RwLock` that is never held across an
// await. Readers index the vector directly, and reverse iteration is just a
// decreasing index. Live readers wake through the head observable, which is
// published only after the entry is in the vector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::LogError;
use crate::log::{check_bounds, Log};
use crate::observable::Observable;
use crate::query::{Entry, EntrySource, Query, QuerySpec};
use crate::seq::{Seq, SEQ_EMPTY};

struct MemInner<T> {
    entries: RwLock<Vec<T>>,
    write: Mutex<()>,
    head: Observable<Seq>,
    closed: AtomicBool,
}

/// A log held entirely in memory.
///
/// Clones share the same log.
pub struct MemLog<T> {
    inner: Arc<MemInner<T>>,
}

impl<T> Clone for MemLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> MemLog<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemInner {
                entries: RwLock::new(Vec::new()),
                write: Mutex::new(()),
                head: Observable::new(SEQ_EMPTY),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for MemLog<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> EntrySource<T> for MemInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn read_entry(&self, seq: Seq) -> Result<Entry<T>, LogError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let head = entries.len() as Seq - 1;
        check_bounds(seq, head)?;
        // check_bounds guarantees 0 <= seq < len.
        Ok(Entry::Value(entries[seq as usize].clone()))
    }

    fn head(&self) -> &Observable<Seq> {
        &self.head
    }

    fn check_usable(&self) -> Result<(), LogError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LogError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl<T> Log<T> for MemLog<T>
where
    T: Clone + Send + Sync + 'static,
{
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
        let _write = self.inner.write.lock().await;
        self.inner.check_usable()?;
        let seq = {
            let mut entries = self.inner.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.push(value);
            entries.len() as Seq - 1
        };
        self.inner.head.set(seq)?;
        debug!(seq, "appended to memory log");
        Ok(seq)
    }

    fn query(&self, specs: &[QuerySpec]) -> Result<Query<T>, LogError> {
        self.inner.check_usable()?;
        let source: Arc<dyn EntrySource<T>> = self.inner.clone();
        Query::from_specs(source, specs)
    }

    async fn close(&self) -> Result<(), LogError> {
        let _write = self.inner.write.lock().await;
        self.inner.closed.store(true, Ordering::Release);
        self.inner.head.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Item;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn filled(values: &[i64]) -> MemLog<i64> {
        let log = MemLog::new();
        for v in values {
            log.append(*v).await.unwrap();
        }
        log
    }

    async fn values(log: &MemLog<i64>, specs: &[QuerySpec]) -> Vec<i64> {
        let qry = log.query(specs).unwrap();
        qry.collect(&CancellationToken::new())
            .await
            .unwrap()
            .into_iter()
            .filter_map(Item::into_value)
            .collect()
    }

    #[tokio::test]
    async fn test_append_and_get() {
        let log = filled(&[10, 20, 30]).await;
        assert_eq!(log.current_seq(), 2);
        assert_eq!(log.get(1).await.unwrap(), 20);
        assert!(log.get(3).await.unwrap_err().is_out_of_bounds());
        assert!(log.get(-1).await.unwrap_err().is_out_of_bounds());
    }

    #[tokio::test]
    async fn test_bounded_queries() {
        let log = filled(&[1, 2, 3]).await;
        assert_eq!(values(&log, &[QuerySpec::Gt(0)]).await, vec![2, 3]);
        assert_eq!(values(&log, &[QuerySpec::Lte(1)]).await, vec![1, 2]);
        assert_eq!(values(&log, &[QuerySpec::Limit(2)]).await, vec![1, 2]);
        assert_eq!(values(&log, &[QuerySpec::Limit(0)]).await, Vec::<i64>::new());
        assert_eq!(
            values(&log, &[QuerySpec::Gte(1), QuerySpec::Lt(2)]).await,
            vec![2]
        );
    }

    #[tokio::test]
    async fn test_reverse() {
        let log = filled(&[1, 2, 3, 4, 5]).await;
        assert_eq!(
            values(&log, &[QuerySpec::Reverse(true)]).await,
            vec![5, 4, 3, 2, 1]
        );
        assert_eq!(
            values(&log, &[QuerySpec::Reverse(true), QuerySpec::Gt(1), QuerySpec::Lt(4)]).await,
            vec![4, 3]
        );
        assert!(matches!(
            log.query(&[QuerySpec::Reverse(true), QuerySpec::Live(true)]),
            Err(LogError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_seq_wrap() {
        let log = filled(&[7, 8]).await;
        let items = log
            .query(&[QuerySpec::SeqWrap(true), QuerySpec::Gte(1)])
            .unwrap()
            .collect(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].seq(), Some(1));
        assert_eq!(items[0].clone().into_value(), Some(8));
    }

    #[tokio::test]
    async fn test_live_query_wakes_on_append() {
        let log: MemLog<i64> = MemLog::new();
        let token = CancellationToken::new();
        let mut qry = log.query(&[QuerySpec::Live(true)]).unwrap();

        let writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append(7).await.unwrap();
        });

        let item = qry.next(&token).await.unwrap();
        assert_eq!(item, Some(Item::Value(7)));

        // The next call blocks until cancelled.
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert!(qry.next(&token).await.unwrap_err().is_cancelled());
        assert_eq!(log.seq().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_live_query_respects_upper_bound() {
        let log = filled(&[1, 2]).await;
        let mut qry = log.query(&[QuerySpec::Live(true), QuerySpec::Lt(2)]).unwrap();
        let token = CancellationToken::new();
        assert_eq!(qry.next(&token).await.unwrap(), Some(Item::Value(1)));
        assert_eq!(qry.next(&token).await.unwrap(), Some(Item::Value(2)));
        assert_eq!(qry.next(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_ends_live_waiters() {
        let log: MemLog<i64> = MemLog::new();
        let mut qry = log.query(&[QuerySpec::Live(true)]).unwrap();
        let closer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close().await.unwrap();
        });
        let err = qry.next(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, LogError::Closed));
        assert!(matches!(log.append(1).await, Err(LogError::Closed)));
    }
}
