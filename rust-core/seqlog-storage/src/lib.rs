// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// seqlog Storage Backend Abstraction
//
// This crate provides the byte-key/byte-value persistence contract that every
// seqlog log, multilog and index writes through. The `StorageBackend` trait is
// the only thing the upper layers see, so the engine is picked when the store
// is constructed.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` trait and prefix-range helpers.
// - [`error`] -- The `StorageError` enum covering all backend failure modes.
// - [`memory`] -- An in-memory `BTreeMap` backend for tests and ephemeral logs.
// - [`file_backend`] -- One file per key in a sharded directory tree.
// - [`prefixed`] -- Namespace isolation over a shared backend.
// - `redb_backend` -- Embedded ACID B-tree store (feature `redb-backend`).
// - `sqlite_backend` -- Single-table SQLite store (feature `sqlite-backend`).
//
// # Example
//
// ```rust
// use std::sync::Arc;
// use seqlog_storage::{InMemoryBackend, PrefixedBackend, SharedBackend, StorageBackend};
//
// # tokio_test::block_on(async {
// let shared: SharedBackend = Arc::new(InMemoryBackend::new());
// let events = PrefixedBackend::new(shared.clone(), "events/");
// events.put(b"0", b"hello").await.unwrap();
// assert_eq!(shared.list().await.unwrap(), vec![b"events/0".to_vec()]);
// # });
// ```

pub mod backend;
pub mod error;
pub mod file_backend;
pub mod memory;
pub mod prefixed;

// Optional persistent backends, feature-gated.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;
#[cfg(feature = "sqlite-backend")]
pub mod sqlite_backend;

pub use backend::{prefix_upper_bound, SharedBackend, StorageBackend};
pub use error::StorageError;
pub use file_backend::FileBackend;
pub use memory::InMemoryBackend;
pub use prefixed::PrefixedBackend;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "sqlite-backend")]
pub use sqlite_backend::SqliteBackend;
