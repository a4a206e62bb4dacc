//! A continuous ICMP echo client.
//!
//! [`ping`] resolves a host, opens a raw ICMP socket of the requested family
//! and runs a [`Session`] that sends one echo request per interval until
//! shutdown or a fatal error.

mod channel;
mod config;
mod error;
mod icmp;
mod ping;
mod report;
mod resolve;

use tokio::sync::broadcast;

pub use channel::{AsyncSocket, Channel, Transport, RECV_BUFFER_SIZE};
pub use config::{Config, ConfigBuilder, IpVersion, DEFAULT_PAYLOAD};
pub use error::{MalformedPacketError, PingError, Result};
pub use icmp::icmpv4::Icmpv4Packet;
pub use icmp::icmpv6::Icmpv6Packet;
pub use icmp::{decode, encode, IcmpPacket, PingIdentifier, PingSequence};
pub use ping::{round_to_millis, EchoReply, Outcome, Session};
pub use report::{Level, MemoryReporter, Report, Reporter, TracingReporter};
pub use resolve::{resolve, select_address};

/// Ping `host` until `shutdown` fires.
///
/// The host is resolved once and the channel opened once; neither is retried.
/// Any error that ends the session is handed to `reporter.fatal` before being
/// returned, and the socket is closed on every path out.
pub async fn ping<R: Reporter>(
    host: &str,
    config: &Config,
    mut reporter: R,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    reporter.info("Pinging...");
    let result = run(host, config, &mut reporter, shutdown).await;
    if let Err(err) = &result {
        reporter.fatal(err);
    }
    result
}

async fn run<R: Reporter>(
    host: &str,
    config: &Config,
    reporter: &mut R,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let target = resolve(host, config.kind).await?;
    let channel = Channel::open(config)?;
    let mut session = Session::new(target, channel, config, reporter);
    session.run(shutdown).await?;
    session.close();
    Ok(())
}
