// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory index.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use seqlog_core::{Addr, Observable, Seq, SEQ_EMPTY};

use crate::error::IndexError;
use crate::index::{Index, IndexValue, SeqSetterIndex, Setter};

struct MapState<V> {
    values: HashMap<Addr, Observable<IndexValue<V>>>,
    seq: Seq,
    closed: bool,
}

/// A [`SeqSetterIndex`] that lives only in memory.
///
/// Writes are visible at once and `flush` does nothing.
pub struct MapIndex<V> {
    state: Mutex<MapState<V>>,
}

impl<V: Clone + Send + Sync + 'static> MapIndex<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MapState {
                values: HashMap::new(),
                seq: SEQ_EMPTY,
                closed: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MapState<V>>, IndexError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state)
    }

    fn update(&self, addr: &Addr, value: IndexValue<V>) -> Result<(), IndexError> {
        let mut state = self.lock()?;
        // Subscribers are synchronous and cannot re-enter the index, so
        // dispatching under the lock keeps notifications in write order.
        match state.values.get(addr) {
            Some(obv) => obv.set(value)?,
            None => {
                state.values.insert(addr.clone(), Observable::new(value));
            }
        }
        Ok(())
    }
}

impl<V: Clone + Send + Sync + 'static> Default for MapIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> Index<V> for MapIndex<V> {
    async fn get(&self, addr: &Addr) -> Result<Observable<IndexValue<V>>, IndexError> {
        let mut state = self.lock()?;
        let obv = state
            .values
            .entry(addr.clone())
            .or_insert_with(|| Observable::new(IndexValue::Unset));
        Ok(obv.clone())
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> Setter<V> for MapIndex<V> {
    async fn set(&self, addr: &Addr, value: V) -> Result<(), IndexError> {
        self.update(addr, IndexValue::Set(value))
    }

    async fn delete(&self, addr: &Addr) -> Result<(), IndexError> {
        self.update(addr, IndexValue::Unset)
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> SeqSetterIndex<V> for MapIndex<V> {
    async fn set_seq(&self, seq: Seq) -> Result<(), IndexError> {
        self.lock()?.seq = seq;
        Ok(())
    }

    async fn get_seq(&self) -> Result<Seq, IndexError> {
        Ok(self.lock()?.seq)
    }

    async fn flush(&self) -> Result<(), IndexError> {
        self.lock().map(|_| ())
    }

    async fn close(&self) -> Result<(), IndexError> {
        let observables: Vec<_> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state.values.drain().map(|(_, obv)| obv).collect()
        };
        for obv in observables {
            obv.close();
        }
        Ok(())
    }
}
