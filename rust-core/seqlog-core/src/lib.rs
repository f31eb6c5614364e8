// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// seqlog core: append-only logs with bounded and live queries.
//
// A `Log` stores a dense sequence of values numbered from 0 and exposes its
// head sequence as an `Observable`. Queries are built from composable
// `QuerySpec` options and walked with a `Query` cursor; live queries block on
// the head observable until new entries arrive or their cancellation token
// fires.
//
// # Modules
//
// - [`seq`] -- `Seq`, `SeqWrapped` and `Addr`.
// - [`error`] -- Error enums for logs, queries, codecs and framing.
// - [`observable`] -- Value cell with ordered subscribers and `wait_until`.
// - [`query`] -- Query options, plans, items and the cursor.
// - [`codec`] -- JSON, CBOR and binary-marshal codecs.
// - [`framing`] -- Fixed-size frame layouts for flat-file logs.
// - [`log`] -- The `Log` and `Alterer` traits.
// - [`sink`] -- The `Sink` trait and `pump`.
// - [`mem`] -- `MemLog`, held in memory.
// - [`offset`] -- `OffsetLog`, a flat file of fixed frames.
// - [`store_log`] -- `StoreLog`, over any storage backend.

pub mod codec;
pub mod error;
pub mod framing;
pub mod log;
pub mod mem;
pub mod observable;
pub mod offset;
pub mod query;
pub mod seq;
pub mod sink;
pub mod store_log;

pub use codec::{BinaryCodec, BinaryMarshal, CborCodec, Codec, JsonCodec};
pub use error::{CodecError, FrameError, LogError, LogResult, ObservableError, QueryError};
pub use framing::{Frame, Framing, LengthPrefixed, Mirrored, DEFAULT_FRAME_SIZE};
pub use log::{Alterer, Log};
pub use mem::MemLog;
pub use observable::{Notification, Observable, Subscription};
pub use offset::OffsetLog;
pub use query::{Entry, EntrySource, Item, Query, QueryPlan, QuerySpec};
pub use seq::{Addr, Seq, SeqWrapped, SEQ_EMPTY, SEQ_NOT_LOADED};
pub use sink::{pump, Sink};
pub use store_log::StoreLog;

// Re-exported so downstream crates name one cancellation type.
pub use tokio_util::sync::CancellationToken;
