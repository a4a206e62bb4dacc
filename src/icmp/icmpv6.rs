use std::net::Ipv6Addr;

use pnet_packet::icmpv6::{self, Icmpv6Code, Icmpv6Type, Icmpv6Types};
use pnet_packet::Packet;

use super::{PingIdentifier, PingSequence};
use crate::error::{MalformedPacketError, PingError, Result};

const ECHO_HEADER_SIZE: usize = 8;
// unused(4) + ipv6 header(40)
const QUOTED_ECHO_OFFSET: usize = 44;

pub fn make_icmpv6_echo_packet(
    ident: PingIdentifier,
    seq_cnt: PingSequence,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; ECHO_HEADER_SIZE + payload.len()];
    let mut packet =
        icmpv6::MutableIcmpv6Packet::new(&mut buf[..]).ok_or(PingError::IncorrectBufferSize)?;
    packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
    packet.set_icmpv6_code(Icmpv6Code::new(0));

    // identifier and sequence open the echo body
    let mut body = Vec::with_capacity(4 + payload.len());
    body.extend_from_slice(&ident.into_u16().to_be_bytes());
    body.extend_from_slice(&seq_cnt.into_u16().to_be_bytes());
    body.extend_from_slice(payload);
    packet.set_payload(&body);

    // Per https://tools.ietf.org/html/rfc3542#section-3.1 the checksum is
    // omitted, the kernel will insert it.

    Ok(buf)
}

#[derive(Debug)]
pub struct Icmpv6Packet {
    source: Ipv6Addr,
    icmp_type: Icmpv6Type,
    icmp_code: Icmpv6Code,
    size: usize,
    identifier: PingIdentifier,
    sequence: PingSequence,
}

impl Icmpv6Packet {
    /// Decode an ICMPv6 message. The kernel has already verified its checksum.
    pub fn decode(buf: &[u8], source: Ipv6Addr) -> Result<Self> {
        let icmpv6_packet = icmpv6::Icmpv6Packet::new(buf)
            .ok_or_else(|| PingError::from(MalformedPacketError::NotIcmpv6Packet))?;
        let icmp_type = icmpv6_packet.get_icmpv6_type();
        let (identifier, sequence) = match icmp_type {
            Icmpv6Types::EchoReply | Icmpv6Types::EchoRequest => {
                echo_fields(buf).ok_or(MalformedPacketError::TruncatedEcho(buf.len()))?
            }
            _ => icmpv6_packet
                .payload()
                .get(QUOTED_ECHO_OFFSET..)
                .and_then(echo_fields)
                .unwrap_or((0, 0)),
        };

        Ok(Icmpv6Packet {
            source,
            icmp_type,
            icmp_code: icmpv6_packet.get_icmpv6_code(),
            size: buf.len(),
            identifier: identifier.into(),
            sequence: sequence.into(),
        })
    }

    pub fn get_source(&self) -> Ipv6Addr {
        self.source
    }

    pub fn get_icmp_type(&self) -> Icmpv6Type {
        self.icmp_type
    }

    pub fn get_icmp_code(&self) -> Icmpv6Code {
        self.icmp_code
    }

    pub fn get_size(&self) -> usize {
        self.size
    }

    pub fn get_identifier(&self) -> PingIdentifier {
        self.identifier
    }

    pub fn get_sequence(&self) -> PingSequence {
        self.sequence
    }

    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type == Icmpv6Types::EchoReply
    }
}

fn echo_fields(message: &[u8]) -> Option<(u16, u16)> {
    let header = message.get(..ECHO_HEADER_SIZE)?;
    Some((
        u16::from_be_bytes([header[4], header[5]]),
        u16::from_be_bytes([header[6], header[7]]),
    ))
}
