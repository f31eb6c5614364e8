// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// seqlog multilog: many independent logs addressed by byte-string keys.
//
// - [`multilog`] -- The `MultiLog` trait and `has`.
// - [`store`] -- `StoreMultiLog`, all sub-logs in one storage backend.
// - [`bitmap`] -- `RoaringMultiLog`, sub-logs of sequence numbers kept as
//   compressed bitmaps.
// - [`handle`] -- `SublogHandle`, the per-caller view handed out by `get`.
// - [`sink`] -- `MultiLogSink`, filled from a stream by a processing function.

pub mod bitmap;
pub mod error;
pub mod handle;
pub mod multilog;
pub mod sink;
pub mod store;

pub use bitmap::RoaringMultiLog;
pub use error::MultiLogError;
pub use handle::SublogHandle;
pub use multilog::{has, MultiLog};
pub use sink::{MultiLogSink, ReadOnlyLog, SinkFunc};
pub use store::StoreMultiLog;
