// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for seqlog logs and queries.
//
// End-of-stream is not an error: a finished query returns `Ok(None)`. The
// variants of `LogError` keep "out of bounds", "cancelled", "nulled" and
// "sub-log deleted" apart so callers can react to each without string
// matching.

use seqlog_storage::StorageError;
use thiserror::Error;

use crate::seq::Seq;

/// Failures turning values into bytes and back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Failures packing payloads into fixed-size frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit in one frame.
    #[error("payload of {len} bytes exceeds frame capacity {max}")]
    TooLarge { len: usize, max: usize },

    /// Buffer handed to the decoder is not exactly one frame.
    #[error("frame buffer is {len} bytes, expected {expected}")]
    WrongSize { len: usize, expected: usize },

    /// Length prefix points past the end of the frame.
    #[error("frame length {len} exceeds capacity {max}")]
    BadLength { len: usize, max: usize },

    /// Leading and trailing length of a mirrored frame disagree.
    #[error("mirrored frame lengths disagree: head {head}, tail {tail}")]
    MirrorMismatch { head: u32, tail: u32 },

    /// Frame size too small for the framing overhead, or too large for u32.
    #[error("invalid frame size {0}")]
    InvalidSize(usize),
}

/// Failures reported by an observable cell.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObservableError {
    /// The observable was closed; no more values will arrive.
    #[error("observable closed")]
    Closed,

    /// A wait on the observable was cancelled by its token.
    #[error("wait cancelled")]
    Cancelled,

    /// A subscriber callback rejected a notification.
    #[error("subscriber failed: {0}")]
    Subscriber(String),
}

/// Invalid combinations of query options, rejected before any I/O.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    #[error("lower bound already set")]
    LowerBoundSet,

    #[error("upper bound already set")]
    UpperBoundSet,

    #[error("reverse and live cannot be combined")]
    ReverseLive,
}

/// Errors returned by logs and query cursors.
#[derive(Debug, Error)]
pub enum LogError {
    /// Read past the current head of the log.
    #[error("seq {seq} out of bounds (head {head})")]
    OutOfBounds { seq: Seq, head: Seq },

    /// A blocking wait was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The entry at this sequence was nulled.
    #[error("entry {0} was nulled")]
    Nulled(Seq),

    /// The sub-log behind this handle was deleted.
    #[error("sub-log deleted")]
    SublogDeleted,

    /// The log was closed.
    #[error("log closed")]
    Closed,

    /// The log handle does not accept writes.
    #[error("log is read-only")]
    ReadOnly,

    /// The log cannot store this value, e.g. a bitmap sub-log given a
    /// sequence that is negative or not above its last one.
    #[error("value rejected: {0}")]
    InvalidValue(String),

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data does not match the expected layout.
    #[error("corrupted log: {0}")]
    Corrupted(String),
}

impl LogError {
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, LogError::OutOfBounds { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LogError::Cancelled)
    }

    pub fn is_nulled(&self) -> bool {
        matches!(self, LogError::Nulled(_))
    }

    pub fn is_sublog_deleted(&self) -> bool {
        matches!(self, LogError::SublogDeleted)
    }
}

impl From<ObservableError> for LogError {
    fn from(err: ObservableError) -> Self {
        match err {
            ObservableError::Closed => LogError::Closed,
            ObservableError::Cancelled => LogError::Cancelled,
            ObservableError::Subscriber(msg) => LogError::Corrupted(msg),
        }
    }
}

pub type LogResult<T> = Result<T, LogError>;
