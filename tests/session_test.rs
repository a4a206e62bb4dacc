use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use parking_lot::Mutex;
use std::time::Duration;

use pnet_packet::icmp::{self, IcmpPacket, IcmpTypes};
use pnet_packet::icmpv6::Icmpv6Types;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::MutableIpv4Packet;
use pnet_packet::Packet;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use pingo::{
    Channel, Config, IpVersion, Level, MemoryReporter, Outcome, PingError, PingIdentifier,
    PingSequence, Session, Transport,
};

const IDENT: PingIdentifier = PingIdentifier(0x4242);
const PEER_V4: &str = "192.0.2.7:0";
const PEER_V6: &str = "[2001:db8::7]:0";

enum Step {
    /// Answer the last request with an echo reply after `delay`.
    Echo(Duration),
    /// Answer with a destination unreachable quoting the last request.
    Unreachable,
    /// Deliver bytes that are not an ICMP message.
    Garbage,
    /// Never answer.
    Silence,
    Fail(io::ErrorKind),
}

struct ScriptedTransport {
    kind: IpVersion,
    peer: SocketAddr,
    steps: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    fail_send: bool,
    done: broadcast::Sender<()>,
}

impl ScriptedTransport {
    fn new(kind: IpVersion, steps: Vec<Step>, done: broadcast::Sender<()>) -> Self {
        let peer = match kind {
            IpVersion::V4 => PEER_V4,
            IpVersion::V6 => PEER_V6,
        };
        ScriptedTransport {
            kind,
            peer: peer.parse().unwrap(),
            steps: Mutex::new(steps.into()),
            sent: Mutex::new(Vec::new()),
            fail_send: false,
            done,
        }
    }

    fn sent_sequences(&self) -> Vec<u16> {
        self.sent
            .lock()
            .iter()
            .map(|(packet, _)| u16::from_be_bytes([packet[6], packet[7]]))
            .collect()
    }

    fn last_request(&self) -> Vec<u8> {
        self.sent.lock().last().unwrap().0.clone()
    }

    fn deliver(&self, message: Vec<u8>) -> Vec<u8> {
        match self.kind {
            IpVersion::V4 => wrap_in_ipv4(&message),
            IpVersion::V6 => message,
        }
    }
}

impl Transport for ScriptedTransport {
    async fn send_to(&self, buf: &[u8], target: &SocketAddr) -> io::Result<usize> {
        if self.fail_send {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "simulated send failure"));
        }
        self.sent.lock().push((buf.to_vec(), *target));
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let step = {
            let mut steps = self.steps.lock();
            let step = steps.pop_front().expect("script exhausted");
            if steps.is_empty() {
                let _ = self.done.send(());
            }
            step
        };
        let datagram = match step {
            Step::Echo(delay) => {
                sleep(delay).await;
                self.deliver(echo_reply(self.kind, self.last_request()))
            }
            Step::Unreachable => self.deliver(unreachable(self.kind, &self.last_request())),
            Step::Garbage => vec![0xde, 0xad],
            Step::Silence => std::future::pending().await,
            Step::Fail(kind) => return Err(io::Error::new(kind, "simulated receive failure")),
        };
        buf[..datagram.len()].copy_from_slice(&datagram);
        Ok((datagram.len(), self.peer))
    }
}

fn set_icmpv4_checksum(message: &mut [u8]) {
    message[2] = 0;
    message[3] = 0;
    let checksum = icmp::checksum(&IcmpPacket::new(message).unwrap());
    message[2..4].copy_from_slice(&checksum.to_be_bytes());
}

fn echo_reply(kind: IpVersion, mut request: Vec<u8>) -> Vec<u8> {
    match kind {
        IpVersion::V4 => {
            request[0] = IcmpTypes::EchoReply.0;
            set_icmpv4_checksum(&mut request);
        }
        IpVersion::V6 => request[0] = Icmpv6Types::EchoReply.0,
    }
    request
}

fn unreachable(kind: IpVersion, request: &[u8]) -> Vec<u8> {
    match kind {
        IpVersion::V4 => {
            let mut message = vec![IcmpTypes::DestinationUnreachable.0, 1, 0, 0, 0, 0, 0, 0];
            message.extend_from_slice(&wrap_in_ipv4(&request[..8]));
            set_icmpv4_checksum(&mut message);
            message
        }
        IpVersion::V6 => {
            let mut message = vec![Icmpv6Types::DestinationUnreachable.0, 4, 0, 0, 0, 0, 0, 0];
            message.extend_from_slice(&[0u8; 40]);
            message.extend_from_slice(&request[..8]);
            message
        }
    }
}

fn wrap_in_ipv4(message: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + message.len()];
    let mut ip = MutableIpv4Packet::new(&mut buf[..]).unwrap();
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length((20 + message.len()) as u16);
    ip.set_ttl(64);
    ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    ip.set_source(Ipv4Addr::new(192, 0, 2, 7));
    ip.set_destination(Ipv4Addr::new(192, 0, 2, 1));
    ip.set_payload(message);
    assert_eq!(ip.payload().len(), message.len());
    buf
}

struct Harness {
    session: Session<ScriptedTransport, MemoryReporter>,
    reporter: MemoryReporter,
    shutdown: broadcast::Receiver<()>,
}

impl Harness {
    fn new(kind: IpVersion, steps: Vec<Step>) -> Self {
        Self::with_transport(kind, steps, false)
    }

    fn with_transport(kind: IpVersion, steps: Vec<Step>, fail_send: bool) -> Self {
        let (done, shutdown) = broadcast::channel(1);
        let mut transport = ScriptedTransport::new(kind, steps, done);
        transport.fail_send = fail_send;
        let config = Config::builder().kind(kind).ident(IDENT).build();
        let target: IpAddr = transport.peer.ip();
        let reporter = MemoryReporter::new();
        let session = Session::new(
            target,
            Channel::with_transport(kind, transport),
            &config,
            reporter.clone(),
        );
        Harness {
            session,
            reporter,
            shutdown,
        }
    }

    async fn run(&mut self) -> Result<(), PingError> {
        let shutdown = self.shutdown.resubscribe();
        self.session.run(shutdown).await
    }

    fn transport(&self) -> &ScriptedTransport {
        self.session.channel().transport()
    }
}

#[tokio::test(start_paused = true)]
async fn reply_within_deadline_is_reported() {
    let mut harness = Harness::new(IpVersion::V4, vec![Step::Echo(Duration::from_millis(30))]);

    harness.run().await.unwrap();

    assert_eq!(
        harness.reporter.lines(Level::Info),
        vec!["Reply from 192.0.2.7: bytes=32 time=30ms".to_string()]
    );
    assert_eq!(harness.session.sequence(), PingSequence(2));

    let sent = harness.transport().sent.lock().clone();
    assert_eq!(sent.len(), 1);
    let (request, target) = &sent[0];
    assert_eq!(*target, PEER_V4.parse::<SocketAddr>().unwrap());
    assert_eq!(request[0], IcmpTypes::EchoRequest.0);
    assert_eq!(u16::from_be_bytes([request[4], request[5]]), IDENT.0);
    assert_eq!(u16::from_be_bytes([request[6], request[7]]), 1);
    assert_eq!(&request[8..], pingo::DEFAULT_PAYLOAD);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_reported_and_session_continues() {
    let mut harness = Harness::new(
        IpVersion::V4,
        vec![Step::Silence, Step::Echo(Duration::from_millis(10))],
    );
    let start = Instant::now();

    harness.run().await.unwrap();

    assert_eq!(
        harness.reporter.lines(Level::Info),
        vec![
            "Request timed out.".to_string(),
            "Reply from 192.0.2.7: bytes=32 time=10ms".to_string(),
        ]
    );
    assert_eq!(harness.transport().sent_sequences(), vec![1, 2]);
    assert_eq!(harness.session.sequence(), PingSequence(3));
    // 100ms deadline, 1s pacing, 10ms round trip
    assert_eq!(start.elapsed(), Duration::from_millis(1110));
}

#[tokio::test(start_paused = true)]
async fn sequence_advances_after_every_outcome() {
    let mut harness = Harness::new(
        IpVersion::V4,
        vec![
            Step::Echo(Duration::from_millis(1)),
            Step::Silence,
            Step::Unreachable,
            Step::Garbage,
            Step::Echo(Duration::from_millis(1)),
        ],
    );

    harness.run().await.unwrap();

    assert_eq!(harness.transport().sent_sequences(), vec![1, 2, 3, 4, 5]);
    assert_eq!(harness.session.sequence(), PingSequence(6));
    assert_eq!(harness.reporter.lines(Level::Info).len(), 3);
    assert_eq!(harness.reporter.lines(Level::Diagnostic).len(), 2);
    assert!(harness.reporter.lines(Level::Fatal).is_empty());
}

#[tokio::test(start_paused = true)]
async fn instant_reply_reports_zero_milliseconds() {
    let mut harness = Harness::new(IpVersion::V4, vec![Step::Echo(Duration::ZERO)]);

    harness.run().await.unwrap();

    assert_eq!(
        harness.reporter.lines(Level::Info),
        vec!["Reply from 192.0.2.7: bytes=32 time=0ms".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn closed_shutdown_channel_stops_after_one_exchange() {
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    drop(shutdown_tx);
    // two steps queued, so the script never signals shutdown itself
    let mut harness = Harness::new(IpVersion::V4, vec![Step::Silence, Step::Silence]);

    let result = harness.session.run(shutdown_rx).await;

    assert!(result.is_ok());
    assert_eq!(harness.transport().sent_sequences(), vec![1]);
    assert_eq!(harness.session.sequence(), PingSequence(2));
    assert_eq!(
        harness.reporter.lines(Level::Info),
        vec!["Request timed out.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn non_echo_message_is_ignored() {
    let mut harness = Harness::new(IpVersion::V4, vec![Step::Unreachable]);

    harness.run().await.unwrap();

    assert!(harness.reporter.lines(Level::Info).is_empty());
    let diagnostics = harness.reporter.lines(Level::Diagnostic);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0],
        "Ignoring non-echo ICMP message from 192.0.2.7: type=3 code=1"
    );
    assert_eq!(harness.session.sequence(), PingSequence(2));
}

#[tokio::test(start_paused = true)]
async fn malformed_reply_is_discarded() {
    let mut harness = Harness::new(IpVersion::V4, vec![Step::Garbage]);

    harness.run().await.unwrap();

    assert!(harness.reporter.lines(Level::Info).is_empty());
    let diagnostics = harness.reporter.lines(Level::Diagnostic);
    assert_eq!(
        diagnostics,
        vec!["Discarding reply: malformed packet: expected an Ipv4Packet".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn receive_error_ends_the_session() {
    let mut harness = Harness::new(
        IpVersion::V4,
        vec![Step::Fail(io::ErrorKind::ConnectionReset), Step::Silence],
    );

    let err = harness.run().await.unwrap_err();

    assert!(matches!(err, PingError::Receive(_)));
    assert_eq!(harness.transport().sent_sequences(), vec![1]);
    assert_eq!(harness.session.sequence(), PingSequence(1));
}

#[tokio::test(start_paused = true)]
async fn socket_timeout_is_not_fatal() {
    let mut harness = Harness::new(IpVersion::V4, vec![Step::Fail(io::ErrorKind::TimedOut)]);

    harness.run().await.unwrap();

    assert_eq!(
        harness.reporter.lines(Level::Info),
        vec!["Request timed out.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn send_error_ends_the_session() {
    let mut harness = Harness::with_transport(IpVersion::V4, vec![Step::Silence], true);

    let err = harness.run().await.unwrap_err();

    assert!(matches!(err, PingError::Send(_)));
    assert!(harness.reporter.reports().is_empty());
    assert_eq!(harness.transport().steps.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ipv6_reply_is_reported() {
    let mut harness = Harness::new(IpVersion::V6, vec![Step::Echo(Duration::from_millis(5))]);

    harness.run().await.unwrap();

    assert_eq!(
        harness.reporter.lines(Level::Info),
        vec!["Reply from 2001:db8::7: bytes=32 time=5ms".to_string()]
    );
    let sent = harness.transport().sent.lock().clone();
    assert_eq!(sent[0].0[0], Icmpv6Types::EchoRequest.0);
}

#[tokio::test(start_paused = true)]
async fn ipv6_unreachable_is_ignored() {
    let mut harness = Harness::new(IpVersion::V6, vec![Step::Unreachable]);

    harness.run().await.unwrap();

    assert!(harness.reporter.lines(Level::Info).is_empty());
    assert_eq!(harness.reporter.lines(Level::Diagnostic).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ping_once_leaves_sequence_alone() {
    let mut harness = Harness::new(IpVersion::V4, vec![Step::Echo(Duration::from_millis(20))]);

    let outcome = harness.session.ping_once().await.unwrap();

    match outcome {
        Outcome::Reply(reply) => {
            assert_eq!(reply.bytes, 32);
            assert_eq!(reply.peer, "192.0.2.7".parse::<IpAddr>().unwrap());
            assert_eq!(reply.rtt, Duration::from_millis(20));
            assert_eq!(reply.packet.get_identifier(), IDENT);
            assert_eq!(reply.packet.get_sequence(), PingSequence(1));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(harness.session.sequence(), PingSequence(1));
}
