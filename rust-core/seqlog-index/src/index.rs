// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Index traits and the value type held by index observables.

use async_trait::async_trait;
use seqlog_core::{Addr, Observable, Seq};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// The value at an index address.
///
/// `Unset` means nothing was ever set there, or the value was deleted. It is
/// distinct from every real value, including empty ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexValue<V> {
    Unset,
    Set(V),
}

impl<V> Default for IndexValue<V> {
    fn default() -> Self {
        IndexValue::Unset
    }
}

impl<V> IndexValue<V> {
    pub fn is_set(&self) -> bool {
        matches!(self, IndexValue::Set(_))
    }

    pub fn as_ref(&self) -> IndexValue<&V> {
        match self {
            IndexValue::Unset => IndexValue::Unset,
            IndexValue::Set(v) => IndexValue::Set(v),
        }
    }

    pub fn into_option(self) -> Option<V> {
        match self {
            IndexValue::Unset => None,
            IndexValue::Set(v) => Some(v),
        }
    }
}

impl<V> From<Option<V>> for IndexValue<V> {
    fn from(v: Option<V>) -> Self {
        v.map_or(IndexValue::Unset, IndexValue::Set)
    }
}

/// Read side of an index.
#[async_trait]
pub trait Index<V>: Send + Sync {
    /// Observable of the value at `addr`. An address that was never set
    /// yields an observable holding [`IndexValue::Unset`], not an error.
    ///
    /// Every `get` for the same address shares one observable, so
    /// subscribers see later `set` and `delete` calls.
    async fn get(&self, addr: &Addr) -> Result<Observable<IndexValue<V>>, IndexError>;
}

/// Write side of an index, handed to projection functions.
#[async_trait]
pub trait Setter<V>: Send + Sync {
    async fn set(&self, addr: &Addr, value: V) -> Result<(), IndexError>;

    /// Reset `addr` to [`IndexValue::Unset`].
    async fn delete(&self, addr: &Addr) -> Result<(), IndexError>;
}

/// An index that also records how far into its source log it has got.
#[async_trait]
pub trait SeqSetterIndex<V>: Index<V> + Setter<V> {
    /// Record `seq` as the last processed source sequence.
    async fn set_seq(&self, seq: Seq) -> Result<(), IndexError>;

    /// The last processed source sequence, `-1` if none.
    async fn get_seq(&self) -> Result<Seq, IndexError>;

    /// Make every accepted write durable.
    async fn flush(&self) -> Result<(), IndexError>;

    /// Flush and release the index. Observables get the terminal
    /// notification.
    async fn close(&self) -> Result<(), IndexError>;
}
