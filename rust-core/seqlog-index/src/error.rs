// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Index error types.

use seqlog_core::{CodecError, LogError, ObservableError};
use seqlog_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("observable error: {0}")]
    Observable(#[from] ObservableError),

    /// Error from the log feeding a sink index.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// The stored sequence marker is not 8 bytes.
    #[error("corrupted sequence marker: {0} bytes")]
    CorruptedSeq(usize),

    /// The address collides with the reserved sequence marker key.
    #[error("address is reserved for the sequence marker")]
    ReservedAddr,

    /// A sink index was poured an item without its sequence.
    #[error("sink index needs seq-wrapped items")]
    MissingSeq,

    #[error("index closed")]
    Closed,
}

impl IndexError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexError::Log(e) if e.is_cancelled())
    }
}
