// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixed-size frames for flat-file logs.
//
// Every record occupies exactly `frame_size` bytes so the byte offset of a
// sequence is `seq * frame_size`. Layouts:
//
//   LengthPrefixed: [len: u32 BE][payload][zero padding]
//   Mirrored:       [len: u32 BE][payload][len: u32 BE][zero padding]
//
// The mirrored variant lets a reader validate a frame from either end. A
// length of `u32::MAX` marks a nulled frame in both layouts.

use std::fmt::Debug;

use crate::error::FrameError;

/// Default frame size for flat-file logs.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Length prefix reserved for nulled frames.
pub const NULLED_MARKER: u32 = u32::MAX;

const LEN_BYTES: usize = 4;

/// A decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Data(&'a [u8]),
    Nulled,
}

/// Packs payloads into fixed-size frames.
pub trait Framing: Send + Sync + Debug {
    /// Bytes per frame.
    fn frame_size(&self) -> usize;

    /// Largest payload that fits in one frame.
    fn max_payload(&self) -> usize;

    fn encode_frame(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError>;

    fn decode_frame<'a>(&self, frame: &'a [u8]) -> Result<Frame<'a>, FrameError>;

    /// A frame marking its slot as nulled.
    fn null_frame(&self) -> Vec<u8> {
        let mut frame = vec![0u8; self.frame_size()];
        frame[..LEN_BYTES].copy_from_slice(&NULLED_MARKER.to_be_bytes());
        frame
    }
}

fn validate_size(frame_size: usize, overhead: usize) -> Result<(), FrameError> {
    if frame_size <= overhead || u32::try_from(frame_size).is_err() {
        return Err(FrameError::InvalidSize(frame_size));
    }
    Ok(())
}

fn check_len(frame: &[u8], expected: usize) -> Result<(), FrameError> {
    if frame.len() != expected {
        return Err(FrameError::WrongSize {
            len: frame.len(),
            expected,
        });
    }
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; LEN_BYTES];
    raw.copy_from_slice(&bytes[at..at + LEN_BYTES]);
    u32::from_be_bytes(raw)
}

fn payload_len(payload: &[u8], max: usize) -> Result<u32, FrameError> {
    if payload.len() > max {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max,
        });
    }
    // max < frame_size <= u32::MAX, and NULLED_MARKER is out of reach.
    u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max,
    })
}

/// `[len][payload][padding]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefixed {
    frame_size: usize,
}

impl LengthPrefixed {
    pub fn new(frame_size: usize) -> Result<Self, FrameError> {
        validate_size(frame_size, LEN_BYTES)?;
        Ok(Self { frame_size })
    }
}

impl Default for LengthPrefixed {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

impl Framing for LengthPrefixed {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn max_payload(&self) -> usize {
        self.frame_size - LEN_BYTES
    }

    fn encode_frame(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        let len = payload_len(payload, self.max_payload())?;
        let mut frame = vec![0u8; self.frame_size];
        frame[..LEN_BYTES].copy_from_slice(&len.to_be_bytes());
        frame[LEN_BYTES..LEN_BYTES + payload.len()].copy_from_slice(payload);
        Ok(frame)
    }

    fn decode_frame<'a>(&self, frame: &'a [u8]) -> Result<Frame<'a>, FrameError> {
        check_len(frame, self.frame_size)?;
        let len = read_u32(frame, 0);
        if len == NULLED_MARKER {
            return Ok(Frame::Nulled);
        }
        let len = len as usize;
        if len > self.max_payload() {
            return Err(FrameError::BadLength {
                len,
                max: self.max_payload(),
            });
        }
        Ok(Frame::Data(&frame[LEN_BYTES..LEN_BYTES + len]))
    }
}

/// `[len][payload][len][padding]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mirrored {
    frame_size: usize,
}

impl Mirrored {
    pub fn new(frame_size: usize) -> Result<Self, FrameError> {
        validate_size(frame_size, 2 * LEN_BYTES)?;
        Ok(Self { frame_size })
    }
}

impl Default for Mirrored {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

impl Framing for Mirrored {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn max_payload(&self) -> usize {
        self.frame_size - 2 * LEN_BYTES
    }

    fn encode_frame(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        let len = payload_len(payload, self.max_payload())?;
        let end = LEN_BYTES + payload.len();
        let mut frame = vec![0u8; self.frame_size];
        frame[..LEN_BYTES].copy_from_slice(&len.to_be_bytes());
        frame[LEN_BYTES..end].copy_from_slice(payload);
        frame[end..end + LEN_BYTES].copy_from_slice(&len.to_be_bytes());
        Ok(frame)
    }

    fn decode_frame<'a>(&self, frame: &'a [u8]) -> Result<Frame<'a>, FrameError> {
        check_len(frame, self.frame_size)?;
        let head = read_u32(frame, 0);
        if head == NULLED_MARKER {
            return Ok(Frame::Nulled);
        }
        let len = head as usize;
        if len > self.max_payload() {
            return Err(FrameError::BadLength {
                len,
                max: self.max_payload(),
            });
        }
        let tail = read_u32(frame, LEN_BYTES + len);
        if tail != head {
            return Err(FrameError::MirrorMismatch { head, tail });
        }
        Ok(Frame::Data(&frame[LEN_BYTES..LEN_BYTES + len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefixed_layout() {
        let framing = LengthPrefixed::new(16).unwrap();
        let frame = framing.encode_frame(b"abc").unwrap();
        assert_eq!(frame.len(), 16);
        assert_eq!(&frame[..7], &[0, 0, 0, 3, b'a', b'b', b'c']);
        assert_eq!(framing.decode_frame(&frame).unwrap(), Frame::Data(b"abc"));
    }

    #[test]
    fn test_mirrored_layout() {
        let framing = Mirrored::new(16).unwrap();
        let frame = framing.encode_frame(b"hi").unwrap();
        assert_eq!(&frame[..10], &[0, 0, 0, 2, b'h', b'i', 0, 0, 0, 2]);
        assert_eq!(framing.decode_frame(&frame).unwrap(), Frame::Data(b"hi"));
    }

    #[test]
    fn test_payload_limits() {
        let framing = Mirrored::new(16).unwrap();
        assert_eq!(framing.max_payload(), 8);
        assert!(framing.encode_frame(&[7u8; 8]).is_ok());
        assert_eq!(
            framing.encode_frame(&[7u8; 9]),
            Err(FrameError::TooLarge { len: 9, max: 8 })
        );
        assert_eq!(Mirrored::new(8), Err(FrameError::InvalidSize(8)));
    }

    #[test]
    fn test_null_frames() {
        for framing in [
            Box::new(LengthPrefixed::new(32).unwrap()) as Box<dyn Framing>,
            Box::new(Mirrored::new(32).unwrap()),
        ] {
            let frame = framing.null_frame();
            assert_eq!(frame.len(), 32);
            assert_eq!(framing.decode_frame(&frame).unwrap(), Frame::Nulled);
        }
    }

    #[test]
    fn test_corrupt_frames_rejected() {
        let framing = Mirrored::new(16).unwrap();
        let mut frame = framing.encode_frame(b"hi").unwrap();
        frame[9] = 9;
        assert_eq!(
            framing.decode_frame(&frame),
            Err(FrameError::MirrorMismatch { head: 2, tail: 9 })
        );

        let mut frame = vec![0u8; 16];
        frame[3] = 200;
        assert!(matches!(
            framing.decode_frame(&frame),
            Err(FrameError::BadLength { len: 200, .. })
        ));
        assert!(matches!(
            framing.decode_frame(&[0u8; 4]),
            Err(FrameError::WrongSize { len: 4, expected: 16 })
        ));
    }

    #[test]
    fn test_empty_payload() {
        let framing = LengthPrefixed::default();
        let frame = framing.encode_frame(b"").unwrap();
        assert_eq!(frame.len(), DEFAULT_FRAME_SIZE);
        assert_eq!(framing.decode_frame(&frame).unwrap(), Frame::Data(b""));
    }
}
