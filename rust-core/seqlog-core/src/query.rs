// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Query options and the cursor that walks a log.
//
// A query is built from a list of `QuerySpec` options which are folded into a
// `QueryPlan` up front. Invalid combinations are rejected there, before the
// cursor touches storage. The cursor itself is backend-agnostic: every log
// exposes its entries through `EntrySource` and the cursor handles bounds,
// limits, direction and the live-tail wait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{LogError, QueryError};
use crate::observable::Observable;
use crate::seq::{Seq, SeqWrapped};

/// One composable query option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySpec {
    /// Start strictly after this sequence.
    Gt(Seq),
    /// Start at this sequence.
    Gte(Seq),
    /// Stop before this sequence.
    Lt(Seq),
    /// Stop after this sequence.
    Lte(Seq),
    /// Yield at most this many items.
    Limit(usize),
    /// Wait for new entries instead of ending when caught up.
    Live(bool),
    /// Iterate from newest to oldest.
    Reverse(bool),
    /// Yield `SeqWrapped` values instead of bare values.
    SeqWrap(bool),
}

/// The normalised form of a list of [`QuerySpec`]s.
///
/// Bounds are stored as a half-open range `[start, end)` over sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryPlan {
    pub start: Option<Seq>,
    pub end: Option<Seq>,
    pub limit: Option<usize>,
    pub live: bool,
    pub reverse: bool,
    pub seq_wrap: bool,
}

impl QueryPlan {
    /// Fold query options into a plan.
    ///
    /// Each bound may be set once; `Reverse` and `Live` are mutually
    /// exclusive. Later `Limit`/`Live`/`Reverse`/`SeqWrap` options override
    /// earlier ones. Negative lower bounds mean "from the beginning".
    pub fn from_specs(specs: &[QuerySpec]) -> Result<Self, QueryError> {
        let mut plan = QueryPlan::default();
        for spec in specs {
            match *spec {
                QuerySpec::Gt(s) => plan.set_start(s.saturating_add(1))?,
                QuerySpec::Gte(s) => plan.set_start(s)?,
                QuerySpec::Lt(s) => plan.set_end(s)?,
                QuerySpec::Lte(s) => plan.set_end(s.saturating_add(1))?,
                QuerySpec::Limit(n) => plan.limit = Some(n),
                QuerySpec::Live(live) => plan.live = live,
                QuerySpec::Reverse(reverse) => plan.reverse = reverse,
                QuerySpec::SeqWrap(wrap) => plan.seq_wrap = wrap,
            }
        }
        if plan.reverse && plan.live {
            return Err(QueryError::ReverseLive);
        }
        Ok(plan)
    }

    fn set_start(&mut self, start: Seq) -> Result<(), QueryError> {
        if self.start.is_some() {
            return Err(QueryError::LowerBoundSet);
        }
        self.start = Some(start.max(0));
        Ok(())
    }

    fn set_end(&mut self, end: Seq) -> Result<(), QueryError> {
        if self.end.is_some() {
            return Err(QueryError::UpperBoundSet);
        }
        self.end = Some(end);
        Ok(())
    }

    fn first(&self) -> Seq {
        self.start.unwrap_or(0)
    }
}

/// An entry as stored in a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<T> {
    Value(T),
    Nulled,
}

/// An item yielded by a query cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item<T> {
    /// A bare value (no `SeqWrap`).
    Value(T),
    /// A value with its sequence (`SeqWrap(true)`).
    Wrapped(SeqWrapped<T>),
    /// The entry at this sequence was nulled.
    Nulled(Seq),
}

impl<T> Item<T> {
    /// The sequence of the item, when it is known.
    pub fn seq(&self) -> Option<Seq> {
        match self {
            Item::Value(_) => None,
            Item::Wrapped(w) => Some(w.seq),
            Item::Nulled(seq) => Some(*seq),
        }
    }

    /// The value carried by the item, if it was not nulled.
    pub fn into_value(self) -> Option<T> {
        match self {
            Item::Value(v) => Some(v),
            Item::Wrapped(w) => Some(w.value),
            Item::Nulled(_) => None,
        }
    }
}

/// Read access to a log's entries, as needed by [`Query`].
#[async_trait]
pub trait EntrySource<T>: Send + Sync {
    /// Read the entry at `seq`, which must be at or below the head.
    async fn read_entry(&self, seq: Seq) -> Result<Entry<T>, LogError>;

    /// The observable head sequence of the log.
    fn head(&self) -> &Observable<Seq>;

    /// Fail if the log was closed or deleted.
    fn check_usable(&self) -> Result<(), LogError>;
}

/// A cursor over a log.
///
/// `next` returns `Ok(None)` at end-of-stream. On a live query it blocks
/// until the next entry is appended or `cancel` fires.
pub struct Query<T> {
    source: Arc<dyn EntrySource<T>>,
    plan: QueryPlan,
    cursor: Option<Seq>,
    remaining: Option<usize>,
}

impl<T: Send + 'static> Query<T> {
    pub fn new(source: Arc<dyn EntrySource<T>>, plan: QueryPlan) -> Self {
        Self {
            source,
            plan,
            cursor: None,
            remaining: plan.limit,
        }
    }

    /// Validate `specs` and build a cursor over `source`.
    pub fn from_specs(
        source: Arc<dyn EntrySource<T>>,
        specs: &[QuerySpec],
    ) -> Result<Self, LogError> {
        let plan = QueryPlan::from_specs(specs)?;
        Ok(Self::new(source, plan))
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Yield the next item, or `Ok(None)` once the stream is exhausted.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<Item<T>>, LogError> {
        self.source.check_usable()?;
        if self.remaining == Some(0) {
            return Ok(None);
        }

        let seq = if self.plan.reverse {
            match self.next_reverse() {
                Some(seq) => seq,
                None => return Ok(None),
            }
        } else {
            match self.next_forward(cancel).await? {
                Some(seq) => seq,
                None => return Ok(None),
            }
        };

        let entry = self.source.read_entry(seq).await?;
        self.cursor = Some(if self.plan.reverse { seq - 1 } else { seq + 1 });
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }

        Ok(Some(match entry {
            Entry::Nulled => Item::Nulled(seq),
            Entry::Value(value) if self.plan.seq_wrap => Item::Wrapped(SeqWrapped::new(seq, value)),
            Entry::Value(value) => Item::Value(value),
        }))
    }

    /// Drain the cursor into a vector. Never returns on a live query that is
    /// not cancelled.
    pub async fn collect(mut self, cancel: &CancellationToken) -> Result<Vec<Item<T>>, LogError> {
        let mut items = Vec::new();
        while let Some(item) = self.next(cancel).await? {
            items.push(item);
        }
        Ok(items)
    }

    async fn next_forward(&mut self, cancel: &CancellationToken) -> Result<Option<Seq>, LogError> {
        let candidate = *self.cursor.get_or_insert(self.plan.first());

        // The upper bound ends the stream even when live.
        if matches!(self.plan.end, Some(end) if candidate >= end) {
            return Ok(None);
        }

        let head = self.source.head().value();
        if candidate <= head {
            return Ok(Some(candidate));
        }
        if !self.plan.live {
            return Ok(None);
        }

        trace!(candidate, head, "live query waiting for append");
        let waited = self
            .source
            .head()
            .wait_until(move |head| *head >= candidate, cancel)
            .await;
        if let Err(err) = waited {
            // A closed head may mean the sub-log was deleted under us.
            self.source.check_usable()?;
            return Err(err.into());
        }
        Ok(Some(candidate))
    }

    fn next_reverse(&mut self) -> Option<Seq> {
        let candidate = *self.cursor.get_or_insert_with(|| {
            let head = self.source.head().value();
            match self.plan.end {
                Some(end) => head.min(end.saturating_sub(1)),
                None => head,
            }
        });
        if candidate < self.plan.first() {
            return None;
        }
        Some(candidate)
    }
}
