// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The Log contract shared by every log implementation.

use async_trait::async_trait;

use crate::error::LogError;
use crate::observable::Observable;
use crate::query::{Query, QuerySpec};
use crate::seq::Seq;

/// An append-only, densely numbered sequence of values.
///
/// Appends are serialised per log: each append is assigned `head + 1`, is
/// fully written, and has been published on the head observable before the
/// next one starts.
#[async_trait]
pub trait Log<T>: Send + Sync {
    /// The head sequence, observable. `-1` for an empty log.
    fn seq(&self) -> Observable<Seq>;

    /// Shorthand for the current head sequence.
    fn current_seq(&self) -> Seq {
        self.seq().value()
    }

    /// Read the value at `seq`.
    ///
    /// Fails with [`LogError::OutOfBounds`] past the head and with
    /// [`LogError::Nulled`] for a nulled entry.
    async fn get(&self, seq: Seq) -> Result<T, LogError>;

    /// Append a value and return its sequence.
    async fn append(&self, value: T) -> Result<Seq, LogError>;

    /// Build a cursor from query options. Invalid combinations fail here.
    fn query(&self, specs: &[QuerySpec]) -> Result<Query<T>, LogError>;

    /// Close the log. Later operations fail with [`LogError::Closed`] and
    /// subscribers of the head observable get the terminal notification.
    async fn close(&self) -> Result<(), LogError>;
}

/// Logs whose entries can be redacted after the fact.
#[async_trait]
pub trait Alterer<T>: Send + Sync {
    /// Tombstone the entry at `seq`. Nulling twice is not an error.
    async fn null(&self, seq: Seq) -> Result<(), LogError>;

    /// Overwrite the entry at `seq` in place.
    async fn replace(&self, seq: Seq, value: T) -> Result<(), LogError>;
}

/// Check that `seq` addresses an existing entry of a log whose head is `head`.
pub(crate) fn check_bounds(seq: Seq, head: Seq) -> Result<(), LogError> {
    if seq < 0 || seq > head {
        return Err(LogError::OutOfBounds { seq, head });
    }
    Ok(())
}
