// ============================================
// File: crates/streamvpn-transport/src/framed.rs
// ============================================
//! # Framed Tunnel I/O
//!
//! ## Creation Reason
//! Glues the core crate's `FrameDecoder` / `encode_frame` onto tokio
//! byte streams so the handshake, the server worker and the client loop
//! all see whole units instead of TCP segments.
//!
//! ## Main Functionality
//! - `FramedReader`: pulls complete frames out of an `AsyncRead`
//! - `FramedWriter`: writes one frame per call to an `AsyncWrite`
//! - `framed_split`: splits a duplex stream into the two halves
//!
//! ## ⚠️ Important Note for Next Developer
//! - `FramedReader::next_frame` is cancel-safe: all progress lives in
//!   the internal `BytesMut`, so dropping the future inside `select!`
//!   loses no bytes
//! - `FramedWriter::send` is NOT cancel-safe; a partially written frame
//!   corrupts the stream. Never race it against other branches.
//!
//! ## Last Modified
//! v0.1.0 - Initial framed reader/writer

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use streamvpn_core::protocol::{encode_frame, FrameDecoder, FRAME_PREFIX_LEN};

use crate::error::{Result, TransportError};

/// Initial read buffer capacity.
const INITIAL_CAPACITY: usize = 4096;

// ============================================
// FramedReader
// ============================================

/// Reads length-prefixed frames from a byte stream.
pub struct FramedReader<R> {
    inner: R,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    /// Wraps `inner`, rejecting frames larger than `max_frame_size`.
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
            decoder: FrameDecoder::new(max_frame_size),
        }
    }

    /// Returns the next complete frame payload.
    ///
    /// # Returns
    /// - `Ok(Some(payload))` - one whole frame
    /// - `Ok(None)` - the peer closed the stream on a frame boundary
    ///
    /// # Errors
    /// - `Framing(TruncatedFrame)` if the peer closed mid-frame
    /// - `Framing(FrameEmpty | FrameTooLarge)` on a bad prefix
    /// - `ReceiveFailed` on socket errors
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf)? {
                return Ok(Some(frame));
            }

            let read = self
                .inner
                .read_buf(&mut self.buf)
                .await
                .map_err(|e| TransportError::ReceiveFailed {
                    reason: e.to_string(),
                })?;

            if read == 0 {
                return Ok(self.decoder.decode_eof(&mut self.buf)?);
            }
        }
    }

    /// Returns the number of buffered bytes not yet returned as frames.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl<R> std::fmt::Debug for FramedReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedReader")
            .field("buffered", &self.buf.len())
            .field("max_frame_size", &self.decoder.max_frame_size())
            .finish_non_exhaustive()
    }
}

// ============================================
// FramedWriter
// ============================================

/// Writes length-prefixed frames to a byte stream.
pub struct FramedWriter<W> {
    inner: W,
    scratch: BytesMut,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Writes `payload` as one frame and flushes.
    ///
    /// # Errors
    /// - `Framing(FrameEmpty | FrameTooLarge)` for unframeable payloads
    /// - `SendFailed` on socket errors
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.scratch.reserve(FRAME_PREFIX_LEN + payload.len());
        encode_frame(payload, &mut self.scratch)?;

        self.inner
            .write_all(&self.scratch)
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })?;
        self.inner
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })
    }

    /// Shuts down the write half, signalling EOF to the peer.
    ///
    /// # Errors
    /// Returns `SendFailed` if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })
    }
}

impl<W> std::fmt::Debug for FramedWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedWriter").finish_non_exhaustive()
    }
}

/// Splits a duplex stream into a framed reader and writer.
pub fn framed_split<S>(
    stream: S,
    max_frame_size: usize,
) -> (FramedReader<ReadHalf<S>>, FramedWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (
        FramedReader::new(read, max_frame_size),
        FramedWriter::new(write),
    )
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use streamvpn_core::error::CoreError;
    use streamvpn_core::protocol::MAX_FRAME_SIZE;

    #[tokio::test]
    async fn test_frames_survive_split_writes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(client, MAX_FRAME_SIZE);

        tokio::spawn(async move {
            // Two frames delivered one byte at a time.
            for byte in b"\x00\x03abc\x00\x02de" {
                server.write_all(&[*byte]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        assert_eq!(reader.next_frame().await.unwrap().unwrap(), &b"abc"[..]);
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), &b"de"[..]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merged_frames_are_separated() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(client, MAX_FRAME_SIZE);

        server.write_all(b"\x00\x01x\x00\x01y").await.unwrap();
        drop(server);

        assert_eq!(reader.next_frame().await.unwrap().unwrap(), &b"x"[..]);
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), &b"y"[..]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_truncated() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(client, MAX_FRAME_SIZE);

        server.write_all(b"\x00\x05ab").await.unwrap();
        drop(server);

        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Framing(CoreError::TruncatedFrame { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(client, 16);

        server.write_all(b"\x00\x20").await.unwrap();

        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Framing(CoreError::FrameTooLarge { max: 16, actual: 32 })
        ));
    }

    #[tokio::test]
    async fn test_next_frame_is_cancel_safe() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(client, MAX_FRAME_SIZE);

        server.write_all(b"\x00\x04ab").await.unwrap();

        // Half a frame is buffered; the read must not complete.
        let timed_out = tokio::time::timeout(Duration::from_millis(20), reader.next_frame()).await;
        assert!(timed_out.is_err());
        assert_eq!(reader.buffered(), 4);

        server.write_all(b"cd").await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), &b"abcd"[..]);
    }

    #[tokio::test]
    async fn test_writer_and_split() {
        let (left, right) = tokio::io::duplex(256);
        let (_left_reader, mut left_writer) = framed_split(left, MAX_FRAME_SIZE);
        let (mut right_reader, _right_writer) = framed_split(right, MAX_FRAME_SIZE);

        left_writer.send(b"tun-unit").await.unwrap();
        assert_eq!(
            right_reader.next_frame().await.unwrap().unwrap(),
            &b"tun-unit"[..]
        );

        assert!(matches!(
            left_writer.send(b"").await,
            Err(TransportError::Framing(CoreError::FrameEmpty))
        ));
    }
}
