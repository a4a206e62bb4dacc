use std::{fmt, net::IpAddr};

use crate::{config::IpVersion, error::Result};

pub mod icmpv4;
pub mod icmpv6;

/// Serialize an echo request for `version`.
///
/// ICMPv4 requests carry a checksum; ICMPv6 requests leave it zeroed for the
/// kernel to fill in, since it covers a pseudo-header with our source address.
pub fn encode(
    version: IpVersion,
    ident: PingIdentifier,
    seq: PingSequence,
    payload: &[u8],
) -> Result<Vec<u8>> {
    match version {
        IpVersion::V4 => icmpv4::make_icmpv4_echo_packet(ident, seq, payload),
        IpVersion::V6 => icmpv6::make_icmpv6_echo_packet(ident, seq, payload),
    }
}

/// Parse a datagram read from a raw socket of `version`.
///
/// Raw ICMPv4 sockets hand back the IPv4 header in front of the message, raw
/// ICMPv6 sockets do not, so the ICMPv6 source is taken from `peer`.
pub fn decode(version: IpVersion, buf: &[u8], peer: IpAddr) -> Result<IcmpPacket> {
    match version {
        IpVersion::V4 => icmpv4::Icmpv4Packet::decode(buf).map(IcmpPacket::V4),
        IpVersion::V6 => {
            let source = match peer {
                IpAddr::V6(addr) => addr,
                IpAddr::V4(addr) => addr.to_ipv6_mapped(),
            };
            icmpv6::Icmpv6Packet::decode(buf, source).map(IcmpPacket::V6)
        }
    }
}

/// Represents a received ICMP message.
#[derive(Debug)]
pub enum IcmpPacket {
    /// An ICMPv4 packet abstraction.
    V4(icmpv4::Icmpv4Packet),
    /// An ICMPv6 packet abstraction.
    V6(icmpv6::Icmpv6Packet),
}

impl IcmpPacket {
    pub fn get_identifier(&self) -> PingIdentifier {
        match self {
            IcmpPacket::V4(packet) => packet.get_identifier(),
            IcmpPacket::V6(packet) => packet.get_identifier(),
        }
    }

    pub fn get_sequence(&self) -> PingSequence {
        match self {
            IcmpPacket::V4(packet) => packet.get_sequence(),
            IcmpPacket::V6(packet) => packet.get_sequence(),
        }
    }

    /// Length of the ICMP message, header included.
    pub fn get_size(&self) -> usize {
        match self {
            IcmpPacket::V4(packet) => packet.get_size(),
            IcmpPacket::V6(packet) => packet.get_size(),
        }
    }

    pub fn get_source(&self) -> IpAddr {
        match self {
            IcmpPacket::V4(packet) => IpAddr::V4(packet.get_source()),
            IcmpPacket::V6(packet) => IpAddr::V6(packet.get_source()),
        }
    }

    /// Raw type and code octets.
    pub fn get_type_code(&self) -> (u8, u8) {
        match self {
            IcmpPacket::V4(packet) => (packet.get_icmp_type().0, packet.get_icmp_code().0),
            IcmpPacket::V6(packet) => (packet.get_icmp_type().0, packet.get_icmp_code().0),
        }
    }

    /// True only for the echo reply type of the packet's own family.
    pub fn is_echo_reply(&self) -> bool {
        match self {
            IcmpPacket::V4(packet) => packet.is_echo_reply(),
            IcmpPacket::V6(packet) => packet.is_echo_reply(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PingIdentifier(pub u16);

impl PingIdentifier {
    /// The low 16 bits of the current process id.
    pub fn from_process() -> Self {
        Self(std::process::id() as u16)
    }

    pub fn into_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PingIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u16> for PingIdentifier {
    fn from(ident: u16) -> Self {
        Self(ident)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PingSequence(pub u16);

impl PingSequence {
    /// Sequence numbers start from 1.
    pub const START: PingSequence = PingSequence(1);

    /// The following sequence number. Wraps back to 1, never to 0.
    pub fn next(self) -> Self {
        match self.0.checked_add(1) {
            Some(seq) => Self(seq),
            None => Self::START,
        }
    }

    pub fn into_u16(self) -> u16 {
        self.0
    }
}

impl Default for PingSequence {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for PingSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u16> for PingSequence {
    fn from(seq_cnt: u16) -> Self {
        Self(seq_cnt)
    }
}
