// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value codecs.
//
// A codec turns a typed value into bytes and back. Logs and indexes are
// generic over the value type and hold a codec for it, so there is no
// runtime type inspection: types with a native binary form use
// `BinaryCodec`, everything serde can handle uses `JsonCodec` or
// `CborCodec`.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Converts values of `T` to and from bytes.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

impl<T, C: Codec<T> + ?Sized> Codec<T> for Arc<C> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        (**self).encode(value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        (**self).decode(bytes)
    }
}

/// JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// CBOR via `ciborium`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for CborCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Types with their own compact byte representation.
pub trait BinaryMarshal: Sized {
    fn marshal_binary(&self) -> Vec<u8>;
    fn unmarshal_binary(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl BinaryMarshal for i64 {
    /// Eight bytes, big-endian.
    fn marshal_binary(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn unmarshal_binary(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CodecError::Decode(format!("expected 8 bytes, got {}", bytes.len())))?;
        Ok(i64::from_be_bytes(raw))
    }
}

impl BinaryMarshal for u64 {
    fn marshal_binary(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn unmarshal_binary(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CodecError::Decode(format!("expected 8 bytes, got {}", bytes.len())))?;
        Ok(u64::from_be_bytes(raw))
    }
}

impl BinaryMarshal for Vec<u8> {
    fn marshal_binary(&self) -> Vec<u8> {
        self.clone()
    }

    fn unmarshal_binary(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl BinaryMarshal for String {
    fn marshal_binary(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn unmarshal_binary(bytes: &[u8]) -> Result<Self, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Codec for [`BinaryMarshal`] types.
pub struct BinaryCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BinaryCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BinaryCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BinaryCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BinaryCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BinaryCodec")
    }
}

impl<T: BinaryMarshal> Codec<T> for BinaryCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(value.marshal_binary())
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        T::unmarshal_binary(bytes)
    }
}
