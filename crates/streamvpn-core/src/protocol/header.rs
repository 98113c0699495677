// ============================================
// File: crates/streamvpn-core/src/protocol/header.rs
// ============================================
//! # Tunnel Unit Header
//!
//! ## Creation Reason
//! Every unit on the tunnel starts with a header laid out exactly like
//! the first 20 bytes of an IPv4 header. Data units carry a real IPv4
//! packet; control units reuse the address fields as sentinels.
//!
//! ## Wire Format (20 bytes, big-endian)
//! ```text
//! ┌────────┬────────┬─────────────────┐
//! │ver/ihl │  tos   │  total_length   │  0..4
//! ├────────┴────────┼─────────────────┤
//! │       id        │ fragment_offset │  4..8
//! ├────────┬────────┼─────────────────┤
//! │  ttl   │protocol│    checksum     │  8..12
//! ├────────┴────────┴─────────────────┤
//! │          source (4 bytes)         │  12..16
//! ├───────────────────────────────────┤
//! │       destination (4 bytes)       │  16..20
//! └───────────────────────────────────┘
//! ```
//!
//! ## Control Sentinels (unit exactly 20 bytes)
//! | source          | destination     | meaning                  |
//! |-----------------|-----------------|--------------------------|
//! | 0.0.0.0         | 0.0.0.0         | dynamic address request  |
//! | a.b.c.d         | 0.0.0.0         | static request for a.b.c.d |
//! | 255.255.255.255 | 255.255.255.255 | keepalive                |
//!
//! ## ⚠️ Important Note for Next Developer
//! - `classify` inspects the bytes as received; do not renormalize
//!   addresses before checking sentinels
//! - A unit longer than 20 bytes is always data, even with sentinel
//!   addresses
//!
//! ## Last Modified
//! v0.1.0 - Initial header definitions

use std::net::Ipv4Addr;

// ============================================
// Constants
// ============================================

/// Size of the unit header in bytes.
pub const HEADER_LEN: usize = 20;

/// Version/IHL byte written into control units (IPv4, 5 words).
pub const CONTROL_VERSION_IHL: u8 = 0x45;

/// TTL written into control units.
pub const CONTROL_TTL: u8 = 64;

/// Address field value meaning "unspecified".
pub const UNSPECIFIED: [u8; 4] = [0x00; 4];

/// Address field value used by keepalive units.
pub const KEEPALIVE_SENTINEL: [u8; 4] = [0xff; 4];

const SOURCE_RANGE: std::ops::Range<usize> = 12..16;
const DESTINATION_RANGE: std::ops::Range<usize> = 16..20;

// ============================================
// TunnelHeader
// ============================================

/// The 20-byte header at the front of every tunnel unit.
///
/// `source` and `destination` hold the raw wire bytes so equality with
/// sentinels is a byte comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelHeader {
    /// Version (high nibble) and header length in 32-bit words (low nibble).
    pub version_ihl: u8,
    /// Type of service.
    pub tos: u8,
    /// Total unit length.
    pub total_length: u16,
    /// Identification.
    pub id: u16,
    /// Flags and fragment offset.
    pub fragment_offset: u16,
    /// Time to live.
    pub ttl: u8,
    /// Upper-layer protocol number.
    pub protocol: u8,
    /// Header checksum (not computed for control units).
    pub checksum: u16,
    /// Source address, wire byte order.
    pub source: [u8; 4],
    /// Destination address, wire byte order.
    pub destination: [u8; 4],
}

impl TunnelHeader {
    fn control(source: [u8; 4], destination: [u8; 4]) -> Self {
        Self {
            version_ihl: CONTROL_VERSION_IHL,
            tos: 0,
            total_length: HEADER_LEN as u16,
            id: 0,
            fragment_offset: 0,
            ttl: CONTROL_TTL,
            protocol: 0,
            checksum: 0,
            source,
            destination,
        }
    }

    /// Builds a dynamic address request (source = destination = 0).
    #[must_use]
    pub fn address_request() -> Self {
        Self::control(UNSPECIFIED, UNSPECIFIED)
    }

    /// Builds a static address request for `addr`.
    #[must_use]
    pub fn static_request(addr: Ipv4Addr) -> Self {
        Self::control(addr.octets(), UNSPECIFIED)
    }

    /// Builds a keepalive unit (source = destination = all ones).
    #[must_use]
    pub fn keepalive() -> Self {
        Self::control(KEEPALIVE_SENTINEL, KEEPALIVE_SENTINEL)
    }

    /// Turns a received address request into its reply: the leased
    /// address goes into the destination field and the source is cleared.
    ///
    /// All other fields are echoed as received.
    #[must_use]
    pub fn into_address_reply(mut self, leased: Ipv4Addr) -> Self {
        self.source = UNSPECIFIED;
        self.destination = leased.octets();
        self
    }

    /// Returns the IP version nibble.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version_ihl >> 4
    }

    /// Returns the source field as an address.
    #[must_use]
    pub const fn source_addr(&self) -> Ipv4Addr {
        let [a, b, c, d] = self.source;
        Ipv4Addr::new(a, b, c, d)
    }

    /// Returns the destination field as an address.
    #[must_use]
    pub const fn destination_addr(&self) -> Ipv4Addr {
        let [a, b, c, d] = self.destination;
        Ipv4Addr::new(a, b, c, d)
    }
}

// ============================================
// UnitKind
// ============================================

/// Result of classifying one received unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Shorter than a header: handshake bytes or a runt unit.
    Handshake,
    /// Dynamic address request.
    AddressRequest,
    /// Static address request for the carried address.
    StaticRequest(Ipv4Addr),
    /// Keepalive probe or reply.
    Keepalive,
    /// Tunneled traffic to relay.
    Data {
        /// Destination field of the header.
        destination: Ipv4Addr,
    },
}

impl UnitKind {
    /// Returns `true` for the address negotiation and keepalive kinds.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Self::AddressRequest | Self::StaticRequest(_) | Self::Keepalive
        )
    }
}

fn field(unit: &[u8], range: std::ops::Range<usize>) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&unit[range]);
    out
}

/// Classifies a unit as received from the wire.
///
/// # Rules
/// - shorter than [`HEADER_LEN`] → `Handshake`
/// - exactly [`HEADER_LEN`] with sentinel addresses → control kind
/// - everything else → `Data`
///
/// Only length and the address fields are inspected. Peers that leave the
/// version byte zeroed in control units are still understood.
///
/// # Example
/// ```
/// use streamvpn_core::protocol::{classify, ProtocolCodec, TunnelHeader, UnitKind};
///
/// let unit = ProtocolCodec::encode_header(&TunnelHeader::keepalive());
/// assert_eq!(classify(&unit), UnitKind::Keepalive);
/// ```
#[must_use]
pub fn classify(unit: &[u8]) -> UnitKind {
    if unit.len() < HEADER_LEN {
        return UnitKind::Handshake;
    }

    let source = field(unit, SOURCE_RANGE);
    let destination = field(unit, DESTINATION_RANGE);

    if unit.len() == HEADER_LEN {
        match (source, destination) {
            (UNSPECIFIED, UNSPECIFIED) => return UnitKind::AddressRequest,
            (KEEPALIVE_SENTINEL, KEEPALIVE_SENTINEL) => return UnitKind::Keepalive,
            (requested, UNSPECIFIED) => {
                return UnitKind::StaticRequest(Ipv4Addr::from(requested));
            }
            _ => {}
        }
    }

    UnitKind::Data {
        destination: Ipv4Addr::from(destination),
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::ProtocolCodec;

    fn ipv4_packet(source: [u8; 4], destination: [u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; HEADER_LEN];
        packet[0] = 0x45;
        packet[8] = 64;
        packet[9] = 17;
        packet[12..16].copy_from_slice(&source);
        packet[16..20].copy_from_slice(&destination);
        packet.extend_from_slice(payload);
        let total = packet.len() as u16;
        packet[2..4].copy_from_slice(&total.to_be_bytes());
        packet
    }

    #[test]
    fn test_classify_control_units() {
        let dynamic = ProtocolCodec::encode_header(&TunnelHeader::address_request());
        assert_eq!(classify(&dynamic), UnitKind::AddressRequest);

        let requested = Ipv4Addr::new(10, 0, 4, 20);
        let fixed = ProtocolCodec::encode_header(&TunnelHeader::static_request(requested));
        assert_eq!(classify(&fixed), UnitKind::StaticRequest(requested));

        let keepalive = ProtocolCodec::encode_header(&TunnelHeader::keepalive());
        assert_eq!(classify(&keepalive), UnitKind::Keepalive);
        assert!(classify(&keepalive).is_control());
    }

    #[test]
    fn test_classify_data() {
        let packet = ipv4_packet([10, 0, 0, 2], [10, 0, 0, 3], b"hello");
        assert_eq!(
            classify(&packet),
            UnitKind::Data {
                destination: Ipv4Addr::new(10, 0, 0, 3)
            }
        );
        assert!(!classify(&packet).is_control());
    }

    #[test]
    fn test_sentinels_only_match_exact_length() {
        // A real packet that happens to carry zero addresses is data.
        let packet = ipv4_packet([0; 4], [0; 4], b"x");
        assert!(matches!(classify(&packet), UnitKind::Data { .. }));

        let packet = ipv4_packet([0xff; 4], [0xff; 4], b"x");
        assert!(matches!(classify(&packet), UnitKind::Data { .. }));
    }

    #[test]
    fn test_classify_twenty_byte_data() {
        let packet = ipv4_packet([10, 0, 0, 2], [10, 0, 0, 3], b"");
        assert_eq!(packet.len(), HEADER_LEN);
        assert!(matches!(classify(&packet), UnitKind::Data { .. }));
    }

    #[test]
    fn test_classify_handshake_bytes() {
        assert_eq!(classify(b"tun0"), UnitKind::Handshake);
        assert_eq!(classify(&[0x45; HEADER_LEN - 1]), UnitKind::Handshake);
        assert_eq!(classify(&[]), UnitKind::Handshake);
    }

    /// Control units with a zeroed version byte and only byte 1 set.
    fn bare_control(source: [u8; 4], destination: [u8; 4]) -> Vec<u8> {
        let mut unit = vec![0u8; HEADER_LEN];
        unit[1] = 20;
        unit[12..16].copy_from_slice(&source);
        unit[16..20].copy_from_slice(&destination);
        unit
    }

    #[test]
    fn test_classify_ignores_version_byte() {
        assert_eq!(classify(&bare_control([0; 4], [0; 4])), UnitKind::AddressRequest);
        assert_eq!(
            classify(&bare_control([0xff; 4], [0xff; 4])),
            UnitKind::Keepalive
        );
        assert_eq!(
            classify(&bare_control([10, 0, 0, 9], [0; 4])),
            UnitKind::StaticRequest(Ipv4Addr::new(10, 0, 0, 9))
        );
    }

    #[test]
    fn test_non_ipv4_unit_routes_by_destination() {
        let mut packet = ipv4_packet([10, 0, 0, 2], [10, 0, 0, 3], b"payload");
        packet[0] = 0x60;
        assert_eq!(
            classify(&packet),
            UnitKind::Data {
                destination: Ipv4Addr::new(10, 0, 0, 3)
            }
        );
    }

    #[test]
    fn test_address_reply() {
        let leased = Ipv4Addr::new(10, 0, 0, 2);
        let reply = TunnelHeader::address_request().into_address_reply(leased);
        assert_eq!(reply.destination_addr(), leased);
        assert_eq!(reply.source, UNSPECIFIED);
        assert_eq!(reply.version(), 4);

        let reply = TunnelHeader::static_request(leased).into_address_reply(leased);
        assert_eq!(reply.destination_addr(), leased);
        assert_eq!(reply.source_addr(), Ipv4Addr::UNSPECIFIED);
    }
}
