// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// seqlog index: observable key/value state derived from log streams.
//
// An index maps addresses to values and hands out one `Observable` per
// address. `SinkIndex` keeps an index up to date from a log by running a
// projection over every entry and recording the last processed sequence, so
// that processing resumes where it stopped.
//
// - [`index`] -- `Index`, `Setter`, `SeqSetterIndex` and `IndexValue`.
// - [`map`] -- `MapIndex`, in memory.
// - [`store`] -- `StoreIndex`, batched persistence to a storage backend.
// - [`sink`] -- `SinkIndex` and the `IndexFunc` projection trait.
// - [`config`] -- `IndexConfig` and its environment overrides.

pub mod config;
pub mod error;
pub mod index;
pub mod map;
pub mod sink;
pub mod store;

pub use config::IndexConfig;
pub use error::IndexError;
pub use index::{Index, IndexValue, SeqSetterIndex, Setter};
pub use map::MapIndex;
pub use sink::{IndexFunc, SinkIndex};
pub use store::{StoreIndex, CURRENT_SEQ_KEY};
