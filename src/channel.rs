use std::{io, net::SocketAddr, sync::Arc};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::{net::UdpSocket, time::Instant};
use tracing::debug;

use crate::{
    config::{Config, IpVersion},
    error::{PingError, Result},
};

/// Large enough for any IP datagram.
pub const RECV_BUFFER_SIZE: usize = 65_536;

/// Datagram primitives a [`Channel`] is built on.
///
/// [`AsyncSocket`] is the raw-socket implementation; anything else that can
/// move ICMP datagrams (a scripted peer in tests, say) can stand in for it.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send_to(&self, buf: &[u8], target: &SocketAddr) -> io::Result<usize>;
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[derive(Clone, Debug)]
pub struct AsyncSocket {
    inner: Arc<UdpSocket>,
}

impl AsyncSocket {
    pub fn new(config: &Config) -> io::Result<Self> {
        let domain = match config.kind {
            IpVersion::V4 => Domain::IPV4,
            IpVersion::V6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::RAW, Some(icmp_protocol(config.kind)))?;
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::from(config.bind_addr()))?;
        #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
        if let Some(interface) = &config.interface {
            socket.bind_device(Some(interface.as_bytes()))?;
        }
        if let Some(ttl) = config.ttl {
            match config.kind {
                IpVersion::V4 => socket.set_ttl(ttl)?,
                IpVersion::V6 => socket.set_unicast_hops_v6(ttl)?,
            }
        }
        let socket = UdpSocket::from_std(std::net::UdpSocket::from(socket))?;
        Ok(Self {
            inner: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Transport for AsyncSocket {
    async fn send_to(&self, buf: &[u8], target: &SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}

/// An open ICMP endpoint of one address family.
///
/// The underlying socket is released when the channel is dropped, on every
/// exit path of the session that owns it.
#[derive(Debug)]
pub struct Channel<T = AsyncSocket> {
    kind: IpVersion,
    transport: T,
}

impl Channel<AsyncSocket> {
    /// Open a raw ICMP socket for `config.kind`, bound to the family wildcard
    /// unless `config.bind` says otherwise.
    pub fn open(config: &Config) -> Result<Self> {
        let socket = AsyncSocket::new(config).map_err(PingError::ChannelOpen)?;
        debug!(kind = %config.kind, local = ?socket.local_addr().ok(), "opened raw icmp socket");
        Ok(Channel {
            kind: config.kind,
            transport: socket,
        })
    }
}

impl<T: Transport> Channel<T> {
    pub fn with_transport(kind: IpVersion, transport: T) -> Self {
        Channel { kind, transport }
    }

    pub fn kind(&self) -> IpVersion {
        self.kind
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn send(&self, packet: &[u8], target: &SocketAddr) -> Result<()> {
        self.transport
            .send_to(packet, target)
            .await
            .map(|_| ())
            .map_err(PingError::Send)
    }

    /// Receive one datagram, giving up at `deadline`.
    ///
    /// Running out of time, or a socket-level timeout, is [`PingError::Timeout`];
    /// any other failure is [`PingError::Receive`].
    pub async fn recv_with_deadline(
        &self,
        buf: &mut [u8],
        deadline: Instant,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout_at(deadline, self.transport.recv_from(buf)).await {
            Ok(Ok(received)) => Ok(received),
            Ok(Err(err)) if is_timeout(&err) => Err(PingError::Timeout),
            Ok(Err(err)) => Err(PingError::Receive(err)),
            Err(_elapsed) => Err(PingError::Timeout),
        }
    }

    /// Release the socket.
    pub fn close(self) {
        debug!(kind = %self.kind, "closing icmp channel");
    }
}

#[inline]
fn icmp_protocol(kind: IpVersion) -> Protocol {
    Protocol::from(i32::from(kind.protocol_number()))
}

#[inline]
fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
