// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sinks consume query items; `pump` connects a query to a sink.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::LogError;
use crate::query::{Item, Query};

/// A consumer of query items.
#[async_trait]
pub trait Sink<T: Send + 'static>: Send + Sync {
    type Error: std::error::Error + From<LogError> + Send + Sync + 'static;

    /// Consume one item.
    async fn pour(&self, item: Item<T>, cancel: &CancellationToken) -> Result<(), Self::Error>;

    /// Release the sink. The default does nothing.
    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Feed every item of `query` into `sink` until end-of-stream.
///
/// Stops at the first error from either side, or with
/// [`LogError::Cancelled`] when `cancel` fires during a live wait. Returns
/// the number of items poured.
pub async fn pump<T, S>(
    query: &mut Query<T>,
    sink: &S,
    cancel: &CancellationToken,
) -> Result<usize, S::Error>
where
    T: Send + 'static,
    S: Sink<T> + ?Sized,
{
    let mut poured = 0;
    while let Some(item) = query.next(cancel).await? {
        sink.pour(item, cancel).await?;
        poured += 1;
    }
    debug!(poured, "pump reached end of stream");
    Ok(poured)
}
