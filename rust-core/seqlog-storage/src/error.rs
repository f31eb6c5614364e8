// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the seqlog persistence layer.
//
// A single enum covers everything a backend can report: I/O failures,
// corruption, an engine that failed to open, and use after close. Missing
// keys are not errors; `get` returns `None`.

use thiserror::Error;

/// Failure reported by a [`StorageBackend`](crate::backend::StorageBackend).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure below the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine rejected an operation or returned unreadable data.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not available (e.g., failed to open, task join
    /// failure).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend was closed and no longer accepts operations.
    #[error("backend closed: {0}")]
    Closed(&'static str),
}
