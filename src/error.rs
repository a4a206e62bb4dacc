use std::io;

use thiserror::Error;

use crate::config::IpVersion;

pub type Result<T> = std::result::Result<T, PingError>;

/// An error resulting from resolving, configuring, or exchanging ICMP echo packets.
#[derive(Error, Debug)]
pub enum PingError {
    #[error("could not resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("host {host} has no {version} address")]
    FamilyUnsupported { host: String, version: IpVersion },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not open raw ICMP socket: {0}")]
    ChannelOpen(#[source] io::Error),
    #[error("send error: {0}")]
    Send(#[source] io::Error),
    #[error("Request timed out.")]
    Timeout,
    #[error("receive error: {0}")]
    Receive(#[source] io::Error),
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] MalformedPacketError),
    #[error("buffer size was too small")]
    IncorrectBufferSize,
}

impl PingError {
    /// Whether the session keeps running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PingError::Timeout | PingError::MalformedPacket(_))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MalformedPacketError {
    #[error("expected an Ipv4Packet")]
    NotIpv4Packet,
    #[error("expected an Icmpv4Packet")]
    NotIcmpv4Packet,
    #[error("expected an Icmpv6Packet")]
    NotIcmpv6Packet,
    #[error("echo message shorter than its header ({0} bytes)")]
    TruncatedEcho(usize),
    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    BadChecksum { expected: u16, actual: u16 },
}
