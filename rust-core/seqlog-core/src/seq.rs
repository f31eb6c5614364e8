// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequence numbers, seq-wrapped values and addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of an entry within a log.
pub type Seq = i64;

/// The sequence of an empty log, or "before the first entry".
pub const SEQ_EMPTY: Seq = -1;

/// Sentinel for a sequence that has not been loaded from storage yet.
pub const SEQ_NOT_LOADED: Seq = -2;

/// A value packaged together with the sequence it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqWrapped<T> {
    pub seq: Seq,
    pub value: T,
}

impl<T> SeqWrapped<T> {
    pub fn new(seq: Seq, value: T) -> Self {
        Self { seq, value }
    }

    /// Drop the sequence and return the bare value.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// An opaque byte-string key naming a sub-log or an index entry.
///
/// Addresses carry no structure beyond byte equality and ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Addr(Vec<u8>);

impl Addr {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Addr {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Addr {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&[u8]> for Addr {
    fn from(b: &[u8]) -> Self {
        Self(b.to_vec())
    }
}

impl From<Vec<u8>> for Addr {
    fn from(b: Vec<u8>) -> Self {
        Self(b)
    }
}

impl AsRef<[u8]> for Addr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Addr {
    /// Printable UTF-8 addresses are shown as text, anything else as hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if !s.chars().any(char::is_control) => f.write_str(s),
            _ => {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}
