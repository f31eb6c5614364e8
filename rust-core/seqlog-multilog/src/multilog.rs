// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The MultiLog contract.

use std::sync::Arc;

use async_trait::async_trait;
use seqlog_core::{Addr, Log, SEQ_EMPTY};

use crate::error::MultiLogError;

/// A keyed collection of independent sub-logs.
///
/// Sub-logs are created on first `get` and live until `delete`. Deleting a
/// sub-log invalidates every handle previously returned for it; a later
/// `get` returns a fresh, empty log.
#[async_trait]
pub trait MultiLog<T>: Send + Sync {
    /// The sub-log at `addr`, created empty if it does not exist yet.
    async fn get(&self, addr: &Addr) -> Result<Arc<dyn Log<T>>, MultiLogError>;

    /// Every address with at least one stored entry, in byte order.
    async fn list(&self) -> Result<Vec<Addr>, MultiLogError>;

    /// Remove all entries of the sub-log at `addr`.
    async fn delete(&self, addr: &Addr) -> Result<(), MultiLogError>;

    /// Force buffered writes to durable storage.
    async fn flush(&self) -> Result<(), MultiLogError>;

    async fn close(&self) -> Result<(), MultiLogError>;
}

/// True iff the sub-log at `addr` holds at least one entry.
pub async fn has<T, M>(mlog: &M, addr: &Addr) -> Result<bool, MultiLogError>
where
    M: MultiLog<T> + ?Sized,
{
    let log = mlog.get(addr).await?;
    Ok(log.current_seq() != SEQ_EMPTY)
}
