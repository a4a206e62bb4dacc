use std::net::Ipv4Addr;

use pnet_packet::icmp::{self, IcmpCode, IcmpType, IcmpTypes};
use pnet_packet::ipv4;
use pnet_packet::Packet;

use super::{PingIdentifier, PingSequence};
use crate::error::{MalformedPacketError, Result, PingError};

const ECHO_HEADER_SIZE: usize = 8;

pub fn make_icmpv4_echo_packet(
    ident: PingIdentifier,
    seq_cnt: PingSequence,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let mut buf = vec![0; ECHO_HEADER_SIZE + payload.len()]; // 8 bytes of header, then payload
    let mut packet = icmp::echo_request::MutableEchoRequestPacket::new(&mut buf[..])
        .ok_or(PingError::IncorrectBufferSize)?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(ident.into_u16());
    packet.set_sequence_number(seq_cnt.into_u16());
    packet.set_payload(payload);

    // Calculate and set the checksum
    let icmp_packet =
        icmp::IcmpPacket::new(packet.packet()).ok_or(PingError::IncorrectBufferSize)?;
    let checksum = icmp::checksum(&icmp_packet);
    packet.set_checksum(checksum);

    Ok(buf)
}

#[derive(Debug)]
pub struct Icmpv4Packet {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    ttl: u8,
    icmp_type: IcmpType,
    icmp_code: IcmpCode,
    size: usize,
    identifier: PingIdentifier,
    sequence: PingSequence,
}

impl Icmpv4Packet {
    /// Decode an IPv4 datagram carrying an ICMP message.
    ///
    /// Echo requests and replies yield their own identifier and sequence. For
    /// error messages (destination unreachable, time exceeded, ...) they are
    /// recovered from the quoted echo request when one is present, and are
    /// zero otherwise.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let ipv4_packet = ipv4::Ipv4Packet::new(buf)
            .ok_or_else(|| PingError::from(MalformedPacketError::NotIpv4Packet))?;
        let header_len = usize::from(ipv4_packet.get_header_length()) * 4;
        let message = buf
            .get(header_len..)
            .ok_or_else(|| PingError::from(MalformedPacketError::NotIpv4Packet))?;
        let icmp_packet = icmp::IcmpPacket::new(message)
            .ok_or_else(|| PingError::from(MalformedPacketError::NotIcmpv4Packet))?;

        let expected = icmp::checksum(&icmp_packet);
        let actual = icmp_packet.get_checksum();
        if expected != actual {
            return Err(MalformedPacketError::BadChecksum { expected, actual }.into());
        }

        let icmp_type = icmp_packet.get_icmp_type();
        let (identifier, sequence) = match icmp_type {
            IcmpTypes::EchoReply | IcmpTypes::EchoRequest => {
                let echo = icmp::echo_reply::EchoReplyPacket::new(message)
                    .ok_or_else(|| PingError::from(MalformedPacketError::TruncatedEcho(message.len())))?;
                (echo.get_identifier(), echo.get_sequence_number())
            }
            _ => quoted_echo(icmp_packet.payload()).unwrap_or((0, 0)),
        };

        Ok(Icmpv4Packet {
            source: ipv4_packet.get_source(),
            destination: ipv4_packet.get_destination(),
            ttl: ipv4_packet.get_ttl(),
            icmp_type,
            icmp_code: icmp_packet.get_icmp_code(),
            size: message.len(),
            identifier: identifier.into(),
            sequence: sequence.into(),
        })
    }

    pub fn get_source(&self) -> Ipv4Addr {
        self.source
    }

    pub fn get_destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn get_ttl(&self) -> u8 {
        self.ttl
    }

    pub fn get_icmp_type(&self) -> IcmpType {
        self.icmp_type
    }

    pub fn get_icmp_code(&self) -> IcmpCode {
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
        self.icmp_type == IcmpTypes::EchoReply
    }
}

// unused(4) + original ip header + first 8 bytes of the original icmp message
fn quoted_echo(payload: &[u8]) -> Option<(u16, u16)> {
    let original = ipv4::Ipv4Packet::new(payload.get(4..)?)?;
    let header_len = usize::from(original.get_header_length()) * 4;
    let echo = icmp::echo_request::EchoRequestPacket::new(payload.get(4 + header_len..)?)?;
    Some((echo.get_identifier(), echo.get_sequence_number()))
}
