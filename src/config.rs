use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use crate::{error::PingError, icmp::PingIdentifier};

/// Filler carried in every echo request. Only its length matters.
pub const DEFAULT_PAYLOAD: &[u8] = b"pingo pingo pingo pingo!";

/// Which address family, socket and ICMP flavour a session uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IpVersion {
    #[default]
    V4,
    V6,
}

impl IpVersion {
    /// IANA protocol number of the ICMP flavour for this family.
    pub fn protocol_number(self) -> u8 {
        match self {
            IpVersion::V4 => 1,
            IpVersion::V6 => 58,
        }
    }

    pub fn matches(self, addr: &IpAddr) -> bool {
        matches!(
            (self, addr),
            (IpVersion::V4, IpAddr::V4(_)) | (IpVersion::V6, IpAddr::V6(_))
        )
    }

    pub(crate) fn unspecified(self) -> SocketAddr {
        match self {
            IpVersion::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpVersion::V6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("IPv4"),
            IpVersion::V6 => f.write_str("IPv6"),
        }
    }
}

impl FromStr for IpVersion {
    type Err = PingError;

    /// Only the literal tokens `4` and `6` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4" => Ok(IpVersion::V4),
            "6" => Ok(IpVersion::V6),
            other => Err(PingError::Config(format!(
                "please provide '4' or '6' for IP version, got {:?}",
                other
            ))),
        }
    }
}

/// Config is the packaging of the socket options and pacing of one ping session.
#[derive(Debug, Clone)]
pub struct Config {
    pub kind: IpVersion,
    pub timeout: Duration,
    pub interval: Duration,
    pub payload: Vec<u8>,
    pub ident: PingIdentifier,
    pub bind: Option<SocketAddr>,
    pub interface: Option<String>,
    pub ttl: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Local address the raw socket binds to: the configured one, or the
    /// wildcard address of `kind`.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind.unwrap_or_else(|| self.kind.unspecified())
    }
}

#[derive(Debug)]
pub struct ConfigBuilder {
    kind: IpVersion,
    timeout: Duration,
    interval: Duration,
    payload: Vec<u8>,
    ident: PingIdentifier,
    bind: Option<SocketAddr>,
    interface: Option<String>,
    ttl: Option<u32>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            kind: IpVersion::default(),
            timeout: Duration::from_millis(100),
            interval: Duration::from_secs(1),
            payload: DEFAULT_PAYLOAD.to_vec(),
            ident: PingIdentifier::from_process(),
            bind: None,
            interface: None,
            ttl: None,
        }
    }
}

impl ConfigBuilder {
    /// Identify which ICMP the socket handles. (default: IpVersion::V4)
    pub fn kind(mut self, kind: IpVersion) -> Self {
        self.kind = kind;
        self
    }

    /// How long to wait for a reply after each request. (default: 100ms)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pause between the end of one exchange and the next request. (default: 1s)
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Identifier written into every request. Defaults to the low 16 bits of
    /// the process id.
    pub fn ident(mut self, ident: PingIdentifier) -> Self {
        self.ident = ident;
        self
    }

    /// Binds the socket to the specified address instead of the wildcard.
    pub fn bind(mut self, bind: SocketAddr) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Sets the value for the `SO_BINDTODEVICE` option on this socket.
    ///
    /// Only honoured on Linux, Android and Fuchsia.
    pub fn interface(mut self, interface: &str) -> Self {
        self.interface = Some(interface.to_string());
        self
    }

    /// Set the value of the `IP_TTL` (or `IPV6_UNICAST_HOPS`) option for this socket.
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn build(self) -> Config {
        Config {
            kind: self.kind,
            timeout: self.timeout,
            interval: self.interval,
            payload: self.payload,
            ident: self.ident,
            bind: self.bind,
            interface: self.interface,
            ttl: self.ttl,
        }
    }
}
