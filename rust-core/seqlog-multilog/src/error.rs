// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multilog error types.

use seqlog_core::LogError;
use seqlog_storage::StorageError;
use thiserror::Error;

/// Errors from a multilog or a multilog sink.
#[derive(Debug, Error)]
pub enum MultiLogError {
    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored key does not follow the multilog key layout.
    #[error("malformed multilog key: {0}")]
    MalformedKey(String),

    /// The multilog was closed.
    #[error("multilog closed")]
    Closed,

    /// A sink was poured an item without its sequence.
    #[error("sink needs seq-wrapped items")]
    MissingSeq,
}

impl MultiLogError {
    pub fn is_sublog_deleted(&self) -> bool {
        matches!(self, MultiLogError::Log(e) if e.is_sublog_deleted())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MultiLogError::Log(e) if e.is_cancelled())
    }
}
