// ============================================
// File: crates/streamvpn-core/src/protocol/codec.rs
// ============================================
//! # Protocol Codec
//!
//! ## Creation Reason
//! Provides binary serialization for the unit header and the handshake
//! messages. Framing lives in [`super::framing`]; this module only turns
//! payloads into typed values and back.
//!
//! ## Parsing Strategy
//! 1. Check minimum length
//! 2. Read fields with `bytes::Buf` (big-endian)
//! 3. Validate message-specific constraints
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CoreError, Result};
use crate::protocol::handshake::{ChallengeResponse, Identity, RESPONSE_LEN};
use crate::protocol::header::{TunnelHeader, HEADER_LEN};

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding protocol messages.
///
/// # Type Parameters
/// * `T` - The message type to encode/decode
pub trait Codec<T> {
    /// Encodes a message into a byte buffer.
    fn encode(&self, msg: &T, buf: &mut BytesMut);

    /// Decodes a message from bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes do not form a valid message.
    fn decode(&self, buf: &mut Bytes) -> Result<T>;
}

// ============================================
// ProtocolCodec
// ============================================

/// Codec implementation for all protocol messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolCodec;

impl ProtocolCodec {
    /// Creates a new protocol codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encodes a header into a standalone 20-byte unit.
    #[must_use]
    pub fn encode_header(header: &TunnelHeader) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        Self.encode(header, &mut buf);
        buf.freeze()
    }

    /// Decodes the header at the front of a unit, ignoring any payload.
    ///
    /// # Errors
    /// Returns `MessageTooShort` if fewer than 20 bytes are present.
    pub fn decode_header(unit: &[u8]) -> Result<TunnelHeader> {
        let mut buf = Bytes::copy_from_slice(unit);
        Self.decode(&mut buf)
    }
}

// ============================================
// TunnelHeader Codec
// ============================================

impl Codec<TunnelHeader> for ProtocolCodec {
    fn encode(&self, msg: &TunnelHeader, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN);
        buf.put_u8(msg.version_ihl);
        buf.put_u8(msg.tos);
        buf.put_u16(msg.total_length);
        buf.put_u16(msg.id);
        buf.put_u16(msg.fragment_offset);
        buf.put_u8(msg.ttl);
        buf.put_u8(msg.protocol);
        buf.put_u16(msg.checksum);
        buf.put_slice(&msg.source);
        buf.put_slice(&msg.destination);
    }

    fn decode(&self, buf: &mut Bytes) -> Result<TunnelHeader> {
        if buf.len() < HEADER_LEN {
            return Err(CoreError::too_short(HEADER_LEN, buf.len()));
        }

        let version_ihl = buf.get_u8();
        let tos = buf.get_u8();
        let total_length = buf.get_u16();
        let id = buf.get_u16();
        let fragment_offset = buf.get_u16();
        let ttl = buf.get_u8();
        let protocol = buf.get_u8();
        let checksum = buf.get_u16();

        let mut source = [0u8; 4];
        buf.copy_to_slice(&mut source);

        let mut destination = [0u8; 4];
        buf.copy_to_slice(&mut destination);

        Ok(TunnelHeader {
            version_ihl,
            tos,
            total_length,
            id,
            fragment_offset,
            ttl,
            protocol,
            checksum,
            source,
            destination,
        })
    }
}

// ============================================
// Handshake Codecs
// ============================================

impl Codec<Identity> for ProtocolCodec {
    fn encode(&self, msg: &Identity, buf: &mut BytesMut) {
        buf.put_slice(msg.as_str().as_bytes());
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Identity> {
        let raw = buf.split_to(buf.len());
        let text = std::str::from_utf8(&raw)
            .map_err(|_| CoreError::malformed("identity is not valid UTF-8"))?;
        Identity::new(text)
    }
}

impl Codec<ChallengeResponse> for ProtocolCodec {
    fn encode(&self, msg: &ChallengeResponse, buf: &mut BytesMut) {
        buf.put_slice(msg.as_bytes());
    }

    fn decode(&self, buf: &mut Bytes) -> Result<ChallengeResponse> {
        if buf.len() != RESPONSE_LEN {
            return Err(CoreError::malformed(format!(
                "response must be {RESPONSE_LEN} bytes, got {}",
                buf.len()
            )));
        }
        let mut digest = [0u8; RESPONSE_LEN];
        buf.copy_to_slice(&mut digest);
        Ok(ChallengeResponse::from_bytes(digest))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_header_wire_layout() {
        let unit = ProtocolCodec::encode_header(&TunnelHeader::static_request(Ipv4Addr::new(
            10, 0, 7, 9,
        )));

        assert_eq!(unit.len(), HEADER_LEN);
        assert_eq!(unit[0], 0x45);
        assert_eq!(&unit[2..4], &[0x00, 0x14]);
        assert_eq!(unit[8], 64);
        assert_eq!(&unit[12..16], &[10, 0, 7, 9]);
        assert_eq!(&unit[16..20], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_header_ignores_payload() {
        let mut unit = ProtocolCodec::encode_header(&TunnelHeader::keepalive()).to_vec();
        unit.extend_from_slice(b"trailing payload");

        let header = ProtocolCodec::decode_header(&unit).unwrap();
        assert_eq!(header, TunnelHeader::keepalive());
    }

    #[test]
    fn test_decode_header_too_short() {
        let result = ProtocolCodec::decode_header(&[0x45; 12]);
        assert!(matches!(
            result,
            Err(CoreError::MessageTooShort { expected: 20, actual: 12 })
        ));
    }

    #[test]
    fn test_identity_decode() {
        let codec = ProtocolCodec::new();

        let mut buf = Bytes::from_static(b"tun0");
        let identity: Identity = codec.decode(&mut buf).unwrap();
        assert_eq!(identity.as_str(), "tun0");

        let mut buf = Bytes::from_static(&[0xff, 0xfe]);
        let result: Result<Identity> = codec.decode(&mut buf);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_length_checked() {
        let codec = ProtocolCodec::new();

        let mut buf = Bytes::from(vec![7u8; RESPONSE_LEN]);
        let response: ChallengeResponse = codec.decode(&mut buf).unwrap();
        assert_eq!(response.as_bytes(), &[7u8; RESPONSE_LEN]);

        let mut buf = Bytes::from(vec![7u8; 16]);
        let result: Result<ChallengeResponse> = codec.decode(&mut buf);
        assert!(matches!(result, Err(CoreError::MalformedMessage { .. })));
    }
}
