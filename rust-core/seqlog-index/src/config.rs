// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Index configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable overriding [`IndexConfig::flush_interval`], in milliseconds.
pub const FLUSH_MS_ENV: &str = "SEQLOG_INDEX_FLUSH_MS";

/// Environment variable overriding [`IndexConfig::max_batch`].
pub const BATCH_LIMIT_ENV: &str = "SEQLOG_INDEX_BATCH_LIMIT";

/// Batching parameters of a [`crate::StoreIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Period of the background flush.
    pub flush_interval: Duration,
    /// Pending writes allowed before a write flushes synchronously.
    pub max_batch: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(17),
            max_batch: 75_000,
        }
    }
}

impl IndexConfig {
    /// Defaults overridden by `SEQLOG_INDEX_FLUSH_MS` and
    /// `SEQLOG_INDEX_BATCH_LIMIT`. Unparsable or zero values are ignored
    /// with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_positive(FLUSH_MS_ENV, lookup(FLUSH_MS_ENV)) {
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(limit) = parse_positive(BATCH_LIMIT_ENV, lookup(BATCH_LIMIT_ENV)) {
            config.max_batch = limit as usize;
        }
        config
    }
}

fn parse_positive(key: &str, raw: Option<String>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(key, value = %raw, "ignoring invalid index setting");
            None
        }
    }
}
