// ============================================
// File: crates/streamvpn-core/src/protocol/framing.rs
// ============================================
//! # Length-Prefixed Framing
//!
//! ## Creation Reason
//! TCP is a byte stream; sizing reads by "bytes currently available"
//! merges or splits units under load. Every unit and handshake message
//! is therefore wrapped in an explicit frame.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ length (u16, BE) │ payload (length bytes)       │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Zero-length frames are invalid (they would be indistinguishable
//!   from a keep-reading state in some readers)
//! - `FrameDecoder::decode` never consumes a partial frame, which is what
//!   makes the async reader in `streamvpn-transport` cancel-safe
//!
//! ## Last Modified
//! v0.1.0 - Initial framing

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Size of the length prefix in bytes.
pub const FRAME_PREFIX_LEN: usize = 2;

/// Largest payload the prefix can express.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

// ============================================
// Encoding
// ============================================

/// Appends `payload` to `dst` as one frame.
///
/// # Errors
/// - `FrameEmpty` if `payload` is empty
/// - `FrameTooLarge` if `payload` exceeds [`MAX_FRAME_SIZE`]
///
/// # Example
/// ```
/// use bytes::BytesMut;
/// use streamvpn_core::protocol::encode_frame;
///
/// let mut buf = BytesMut::new();
/// encode_frame(b"tun0", &mut buf).unwrap();
/// assert_eq!(&buf[..], b"\x00\x04tun0");
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(CoreError::FrameEmpty);
    }
    let len = u16::try_from(payload.len()).map_err(|_| CoreError::FrameTooLarge {
        max: MAX_FRAME_SIZE,
        actual: payload.len(),
    })?;

    dst.reserve(FRAME_PREFIX_LEN + payload.len());
    dst.put_u16(len);
    dst.put_slice(payload);
    Ok(())
}

// ============================================
// FrameDecoder
// ============================================

/// Incremental frame decoder over a growable buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Creates a decoder that rejects frames larger than `max_frame_size`.
    ///
    /// Values above [`MAX_FRAME_SIZE`] are clamped.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE),
        }
    }

    /// Returns the configured maximum payload size.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Extracts one complete frame from the front of `src`.
    ///
    /// # Returns
    /// - `Ok(Some(payload))` - a complete frame was removed from `src`
    /// - `Ok(None)` - more bytes are needed; `src` is untouched
    ///
    /// # Errors
    /// `FrameEmpty` or `FrameTooLarge` when the prefix is invalid. The
    /// stream is unusable afterwards.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < FRAME_PREFIX_LEN {
            return Ok(None);
        }

        let len = usize::from(u16::from_be_bytes([src[0], src[1]]));
        if len == 0 {
            return Err(CoreError::FrameEmpty);
        }
        if len > self.max_frame_size {
            return Err(CoreError::FrameTooLarge {
                max: self.max_frame_size,
                actual: len,
            });
        }

        if src.len() < FRAME_PREFIX_LEN + len {
            src.reserve(FRAME_PREFIX_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_PREFIX_LEN);
        Ok(Some(src.split_to(len).freeze()))
    }

    /// Called when the stream reached EOF.
    ///
    /// # Returns
    /// `Ok(None)` if the stream ended on a frame boundary.
    ///
    /// # Errors
    /// `TruncatedFrame` if buffered bytes remain.
    pub fn decode_eof(&self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let expected = if src.len() >= FRAME_PREFIX_LEN {
            FRAME_PREFIX_LEN + usize::from(u16::from_be_bytes([src[0], src[1]]))
        } else {
            FRAME_PREFIX_LEN
        };
        Err(CoreError::TruncatedFrame {
            expected,
            actual: src.len(),
        })
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payloads: &[&[u8]]) -> BytesMut {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn test_coalesced_frames_split_cleanly() {
        let decoder = FrameDecoder::default();
        let mut buf = framed(&[b"identity", &[0x45; 20], b"x"]);

        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"identity");
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap().len(), 20);
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"x");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits() {
        let decoder = FrameDecoder::default();
        let full = framed(&[b"abcdef"]);

        let mut buf = BytesMut::from(&full[..1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 1);

        buf.extend_from_slice(&full[1..5]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&full[5..]);
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"abcdef");
    }

    #[test]
    fn test_empty_frame_rejected() {
        let decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&[0u8, 0u8][..]);
        assert!(matches!(decoder.decode(&mut buf), Err(CoreError::FrameEmpty)));

        let mut out = BytesMut::new();
        assert!(matches!(encode_frame(b"", &mut out), Err(CoreError::FrameEmpty)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let decoder = FrameDecoder::new(1500);
        let mut buf = BytesMut::from(&[0x05u8, 0xdd][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(CoreError::FrameTooLarge { max: 1500, actual: 1501 })
        ));

        let mut out = BytesMut::new();
        let huge = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            encode_frame(&huge, &mut out),
            Err(CoreError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_eof_handling() {
        let decoder = FrameDecoder::default();

        let mut clean = BytesMut::new();
        assert!(decoder.decode_eof(&mut clean).unwrap().is_none());

        let full = framed(&[b"abcdef"]);
        let mut truncated = BytesMut::from(&full[..4]);
        assert!(matches!(
            decoder.decode_eof(&mut truncated),
            Err(CoreError::TruncatedFrame { expected: 8, actual: 4 })
        ));
    }
}
