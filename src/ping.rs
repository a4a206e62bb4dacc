use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use tokio::{
    sync::broadcast,
    time::{sleep, Instant},
};
use tracing::{debug, trace, warn};

use crate::{
    channel::{Channel, Transport, RECV_BUFFER_SIZE},
    config::Config,
    error::{PingError, Result},
    icmp::{self, IcmpPacket, PingIdentifier, PingSequence},
    report::Reporter,
};

/// A reply received within the deadline.
#[derive(Debug)]
pub struct EchoReply {
    /// Size of the ICMP message.
    pub bytes: usize,
    pub peer: IpAddr,
    pub packet: IcmpPacket,
    pub rtt: Duration,
}

/// How one send/receive exchange ended, short of a fatal error.
#[derive(Debug)]
pub enum Outcome {
    Reply(EchoReply),
    /// A well-formed ICMP message that is not an echo reply.
    Ignored(IcmpPacket),
    Malformed(PingError),
    TimedOut,
}

impl Outcome {
    /// The outcome standing in for an error the session survives.
    fn recovered(err: PingError) -> Self {
        match err {
            PingError::Timeout => Outcome::TimedOut,
            err => Outcome::Malformed(err),
        }
    }
}

/// A Session drives the echo exchange with one host over one channel.
pub struct Session<T, R> {
    target: IpAddr,
    channel: Channel<T>,
    reporter: R,
    ident: PingIdentifier,
    payload: Vec<u8>,
    timeout: Duration,
    interval: Duration,
    sequence: PingSequence,
    buf: Vec<u8>,
}

impl<T: Transport, R: Reporter> Session<T, R> {
    pub fn new(target: IpAddr, channel: Channel<T>, config: &Config, reporter: R) -> Self {
        Session {
            target,
            channel,
            reporter,
            ident: config.ident,
            payload: config.payload.clone(),
            timeout: config.timeout,
            interval: config.interval,
            sequence: PingSequence::START,
            buf: vec![0; RECV_BUFFER_SIZE],
        }
    }

    /// The sequence number the next request will carry.
    pub fn sequence(&self) -> PingSequence {
        self.sequence
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// Ping until `shutdown` fires or a fatal error occurs.
    ///
    /// Each iteration sends one request, waits at most `timeout` for a reply,
    /// reports the result and then sleeps `interval`. The sequence number
    /// advances after every iteration, whatever its outcome. Shutdown is
    /// observed during that sleep; a closed or lagged receiver counts as a
    /// shutdown request too.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        loop {
            match self.ping_once().await? {
                Outcome::Reply(reply) => {
                    let line = format!(
                        "Reply from {}: bytes={} time={}ms",
                        reply.peer,
                        reply.bytes,
                        round_to_millis(reply.rtt).as_millis()
                    );
                    self.reporter.info(&line);
                }
                Outcome::Ignored(packet) => {
                    let (icmp_type, icmp_code) = packet.get_type_code();
                    let line = format!(
                        "Ignoring non-echo ICMP message from {}: type={} code={}",
                        packet.get_source(),
                        icmp_type,
                        icmp_code
                    );
                    self.reporter.diagnostic(&line);
                }
                Outcome::Malformed(err) => {
                    warn!(seq = %self.sequence, "{}", err);
                    self.reporter.diagnostic(&format!("Discarding reply: {}", err));
                }
                Outcome::TimedOut => self.reporter.info(&PingError::Timeout.to_string()),
            }

            self.sequence = self.sequence.next();

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!(host = %self.target, "shutdown requested");
                    return Ok(());
                }
                _ = sleep(self.interval) => {}
            }
        }
    }

    /// One request/reply exchange with the current sequence number.
    ///
    /// Recoverable conditions come back as an [`Outcome`]; everything else is
    /// an error that ends the session. The sequence number is left untouched.
    ///
    /// Exactly one datagram is read. On IPv4 loopback that is often our own
    /// request, so the matching reply surfaces on the next iteration.
    pub async fn ping_once(&mut self) -> Result<Outcome> {
        let kind = self.channel.kind();
        let packet = icmp::encode(kind, self.ident, self.sequence, &self.payload)?;
        let target = SocketAddr::new(self.target, 0);

        self.channel.send(&packet, &target).await?;
        let send_time = Instant::now();
        let deadline = send_time + self.timeout;

        let (size, peer) = match self.channel.recv_with_deadline(&mut self.buf, deadline).await {
            Ok(received) => received,
            Err(err) if err.is_recoverable() => return Ok(Outcome::recovered(err)),
            Err(err) => return Err(err),
        };
        let rtt = send_time.elapsed();
        let datagram = &self.buf[..size];

        let packet = match icmp::decode(kind, datagram, peer.ip()) {
            Ok(packet) => packet,
            Err(err) if err.is_recoverable() => {
                trace!(bytes = %hex::encode(datagram), %peer, "malformed datagram");
                return Ok(Outcome::recovered(err));
            }
            Err(err) => return Err(err),
        };

        if packet.is_echo_reply() {
            Ok(Outcome::Reply(EchoReply {
                bytes: packet.get_size(),
                peer: peer.ip(),
                packet,
                rtt,
            }))
        } else {
            trace!(bytes = %hex::encode(datagram), %peer, "non-echo icmp message");
            Ok(Outcome::Ignored(packet))
        }
    }

    /// Release the channel and hand the reporter back.
    pub fn close(self) -> R {
        self.channel.close();
        self.reporter
    }
}

/// Round to the nearest millisecond, halves away from zero.
pub fn round_to_millis(dur: Duration) -> Duration {
    let millis = (dur.as_nanos() + 500_000) / 1_000_000;
    Duration::from_millis(millis as u64)
}
