//! One node's connection lifecycle: connect, handshake, `getaddr` (§4.3).
//!
//! The terminal label (reachable/unreachable) is assigned by the frontier,
//! not here (§4.3: "Terminal labels … are assigned by the frontier, not by
//! the node; the node only reports booleans").

use std::collections::HashSet;
use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant as TokioInstant};

use crawler_chain::{now_unix, Address, Node};

use crate::config::{NetworkSettings, TimeoutSettings, TimeoutsByTransport};
use crate::constants::{CMD_ADDR, CMD_ADDRV2, CMD_GETADDR, CMD_PING, CMD_PONG, CMD_SENDADDRV2, CMD_VERSION, PROTOCOL_VERSION, USER_AGENT};
use crate::protocol::{envelope, AddrV2Entry, Message, VersionMessage};
use crate::transport::{self, i2p::SharedSamSession, BoxedStream, TransportClass};

fn our_version_message() -> Message {
    Message::Version(VersionMessage {
        version: PROTOCOL_VERSION,
        services: 0,
        timestamp: now_unix(),
        receiver_services: 0,
        receiver_ip: Ipv6Addr::from([0, 0, 0, 0, 0, 0xffff, 0, 0]),
        receiver_port: 0,
        sender_services: Some(0),
        sender_ip: Some(Ipv6Addr::from([0, 0, 0, 0, 0, 0xffff, 0, 0])),
        sender_port: Some(0),
        nonce: rand::thread_rng().gen(),
        user_agent: USER_AGENT.to_owned(),
        latest_block: 0,
        relay: Some(false),
    })
}

/// An open connection to one peer, driving its part of the state machine
/// (`Connecting`/`Handshaking`/`Exchanging` live across these three calls;
/// `Idle`/`Done` are the caller's responsibility before/after).
pub struct Session {
    stream: BoxedStream,
    timeouts: TimeoutSettings,
}

impl Session {
    /// §4.3 `connect`. Dials via the address's transport class, applying
    /// that class's `connect` timeout, and records elapsed time on the node.
    /// The chosen class's `message`/`getaddr` timeouts are kept for the rest
    /// of this session's lifetime, so later calls don't need to rediscover
    /// which transport class the node dialed through.
    pub async fn connect(
        node: &mut Node,
        timeouts: &TimeoutsByTransport,
        network: &NetworkSettings,
        i2p_session: &SharedSamSession,
    ) -> Option<Session> {
        let class = TransportClass::of(node.address.network_type())?;
        let class_timeouts = match class {
            TransportClass::Ip => timeouts.ip,
            TransportClass::Tor => timeouts.tor,
            TransportClass::I2p => timeouts.i2p,
        };

        let start = Instant::now();
        match transport::dial(&node.address, timeouts, network, i2p_session).await {
            Ok(stream) => {
                node.stats.time_connect_ms = Some(start.elapsed().as_millis() as i64);
                Some(Session { stream, timeouts: class_timeouts })
            }
            Err(e) => {
                tracing::debug!(node = %node, error = %e, "connect failed");
                None
            }
        }
    }

    /// §4.3 `handshake`. Sends our `version`, waits up to the transport
    /// class's message timeout for the peer's, then replies with
    /// `sendaddrv2` and `verack`.
    pub async fn handshake(&mut self, node: &mut Node) -> bool {
        node.stats.handshake_attempts += 1;
        let handshake_start = Instant::now();
        node.stats.handshake_timestamp = Some(now_unix());

        if let Err(e) = self.send(&our_version_message()).await {
            tracing::debug!(node = %node, error = %e, "failed to send version message");
            return false;
        }

        let version = match timeout(self.timeouts.message, self.receive_one(CMD_VERSION)).await {
            Ok(Ok(Message::Version(v))) => v,
            Ok(Ok(_)) | Err(_) => {
                tracing::debug!(
                    node = %node,
                    attempt = node.stats.handshake_attempts,
                    "handshake: no version reply within timeout"
                );
                return false;
            }
            Ok(Err(e)) => {
                tracing::debug!(node = %node, error = %e, "handshake: failed to parse version reply");
                return false;
            }
        };

        node.stats.handshake_duration_ms = Some(handshake_start.elapsed().as_millis() as i64);
        node.stats.version = Some(version.version);
        node.stats.services = Some(version.services);
        node.stats.version_reply_timestamp_remote = Some(version.timestamp);
        node.stats.user_agent = Some(version.user_agent);
        node.stats.latest_block = Some(version.latest_block);
        node.stats.relay = version.relay;

        if let Err(e) = self.send(&Message::SendAddrV2).await {
            tracing::debug!(node = %node, error = %e, "failed to send sendaddrv2");
        }
        if let Err(e) = self.send(&Message::Verack).await {
            tracing::debug!(node = %node, error = %e, "failed to send verack");
            return false;
        }

        true
    }

    /// §4.3 `get_peer_addrs`. Accumulates `addr`/`addrv2` entries until the
    /// total `getaddr` budget is exhausted or a single receive exceeds
    /// `message_timeout` (a silence gap).
    pub async fn get_peer_addrs(
        &mut self,
        node: &mut Node,
        getaddr_timeout: Duration,
        message_timeout: Duration,
    ) -> HashSet<Address> {
        node.stats.requested_addrs = true;
        if let Err(e) = self.send(&Message::GetAddr).await {
            tracing::debug!(node = %node, error = %e, "failed to send getaddr");
        }

        let deadline = TokioInstant::now() + getaddr_timeout;
        let mut addresses = HashSet::new();

        loop {
            let remaining = deadline.saturating_duration_since(TokioInstant::now());
            if remaining.is_zero() {
                break;
            }
            let per_receive = remaining.min(message_timeout);

            match timeout(per_receive, self.receive_any(&[CMD_ADDR, CMD_ADDRV2])).await {
                Ok(Ok(Message::Addr(entries))) => {
                    for entry in entries {
                        addresses.insert(Address::new(entry.host, entry.port, entry.timestamp as i64));
                    }
                }
                Ok(Ok(Message::AddrV2(entries))) => {
                    for entry in entries {
                        addresses.insert(Address::new(entry.host, entry.port, entry.timestamp as i64));
                    }
                }
                Ok(Ok(_)) => unreachable!("receive_any only returns the commands it was asked for"),
                Ok(Err(e)) => {
                    tracing::debug!(node = %node, error = %e, "error while waiting for addr message");
                    break;
                }
                Err(_) => {
                    tracing::debug!(node = %node, "timeout waiting for addr message");
                    break;
                }
            }
        }

        for addr in &addresses {
            node.stats.advertised_addrs.increment(addr.network_type());
        }
        addresses
    }

    pub async fn disconnect(mut self) {
        let _ = self.stream.shutdown().await;
    }

    async fn send(&mut self, message: &Message) -> std::io::Result<()> {
        envelope::write(&mut self.stream, message.command(), &message.serialize_payload()).await
    }

    /// Reads envelopes until `expected` arrives, transparently answering
    /// `ping` with `pong` and skipping any other unexpected command (§4.3
    /// `receive`).
    async fn receive_any(&mut self, expected: &[&str]) -> Result<Message, SessionReceiveError> {
        loop {
            let env = envelope::read(&mut self.stream).await?;
            if !env.magic_ok || !env.checksum_ok {
                tracing::warn!(command = %env.command, magic_ok = env.magic_ok, checksum_ok = env.checksum_ok, "envelope integrity check failed");
            }
            if env.command == CMD_PING {
                if let Ok(Message::Ping(nonce)) = Message::parse(CMD_PING, &env.payload) {
                    let _ = self.send(&Message::Pong(nonce)).await;
                }
                continue;
            }
            if expected.contains(&env.command.as_str()) {
                return Ok(Message::parse(&env.command, &env.payload)?);
            }
            // Unexpected, non-ping command: keep reading until an expected
            // command arrives or the caller's deadline fires.
        }
    }

    async fn receive_one(&mut self, expected: &'static str) -> Result<Message, SessionReceiveError> {
        self.receive_any(&[expected]).await
    }
}

#[derive(Debug, thiserror::Error)]
enum SessionReceiveError {
    #[error(transparent)]
    Envelope(#[from] envelope::EnvelopeError),
    #[error(transparent)]
    Protocol(#[from] crate::protocol::ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn version_message_uses_our_identity() {
        let msg = our_version_message();
        match msg {
            Message::Version(v) => {
                assert_eq!(v.version, PROTOCOL_VERSION);
                assert_eq!(v.user_agent, USER_AGENT);
            }
            _ => panic!("expected a version message"),
        }
    }

    fn fast_timeouts() -> TimeoutsByTransport {
        TimeoutsByTransport {
            ip: TimeoutSettings::from_secs_f64(1.0, 1.0, 1.0),
            tor: TimeoutSettings::from_secs_f64(1.0, 1.0, 1.0),
            i2p: TimeoutSettings::from_secs_f64(1.0, 1.0, 1.0),
        }
    }

    async fn connect_to_stub(listener: &TcpListener) -> (Session, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let mut node = Node::new(Address::now("127.0.0.1", addr.port()), 0);
        let timeouts = fast_timeouts();
        let network = NetworkSettings::default();
        let i2p_session = SharedSamSession::default();

        let (session, (peer_stream, _)) =
            tokio::join!(Session::connect(&mut node, &timeouts, &network, &i2p_session), async {
                listener.accept().await.unwrap()
            });
        (session.expect("stub listener should accept the dial"), peer_stream)
    }

    /// §8 scenario 1: "Minimal handshake". A stub peer sends its `version`
    /// then `verack`; the node must record the remote's stats verbatim.
    #[tokio::test]
    async fn minimal_handshake_records_remote_stats() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut session, mut peer) = connect_to_stub(&listener).await;
        let mut node = Node::new(Address::now("127.0.0.1", 1), 0);

        let peer_task = tokio::spawn(async move {
            // Drain our `version`.
            let env = envelope::read(&mut peer).await.unwrap();
            assert_eq!(env.command, CMD_VERSION);

            let version = Message::Version(VersionMessage {
                version: 70015,
                services: 0,
                timestamp: now_unix(),
                receiver_services: 0,
                receiver_ip: Ipv6Addr::UNSPECIFIED,
                receiver_port: 0,
                sender_services: Some(0),
                sender_ip: Some(Ipv6Addr::UNSPECIFIED),
                sender_port: Some(0),
                nonce: 42,
                user_agent: "/TestPeer:1.0/".to_owned(),
                latest_block: 800_000,
                relay: Some(true),
            });
            envelope::write(&mut peer, version.command(), &version.serialize_payload()).await.unwrap();

            // Our sendaddrv2 then verack should follow.
            let env = envelope::read(&mut peer).await.unwrap();
            assert_eq!(env.command, CMD_SENDADDRV2);
            let env = envelope::read(&mut peer).await.unwrap();
            assert_eq!(env.command, "verack");
        });

        let ok = session.handshake(&mut node).await;
        peer_task.await.unwrap();

        assert!(ok);
        assert_eq!(node.stats.version, Some(70015));
        assert_eq!(node.stats.user_agent.as_deref(), Some("/TestPeer:1.0/"));
        assert_eq!(node.stats.latest_block, Some(800_000));
    }

    /// §8 scenario 2: "Handshake retry exhaustion". A stub peer accepts the
    /// connection then sends nothing; `handshake` must time out and report
    /// failure so the caller can re-enqueue up to the attempts budget.
    #[tokio::test]
    async fn handshake_times_out_when_peer_is_silent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut session, _peer) = connect_to_stub(&listener).await;
        let mut node = Node::new(Address::now("127.0.0.1", 1), 0);

        let ok = session.handshake(&mut node).await;

        assert!(!ok);
        assert_eq!(node.stats.handshake_attempts, 1);
    }

    /// §8 scenario 3: "Addr exchange", combined with scenario 4: "Ping
    /// interception". The stub peer answers `getaddr` with a `ping`
    /// followed by two `addrv2` entries; the node must echo `pong` and
    /// still collect both addresses.
    #[tokio::test]
    async fn get_peer_addrs_answers_pings_and_collects_addrv2() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut session, mut peer) = connect_to_stub(&listener).await;
        let mut node = Node::new(Address::now("127.0.0.1", 1), 0);

        let now = now_unix();
        let peer_task = tokio::spawn(async move {
            let env = envelope::read(&mut peer).await.unwrap();
            assert_eq!(env.command, CMD_GETADDR);

            let ping = Message::Ping(0xDEAD_BEEF);
            envelope::write(&mut peer, ping.command(), &ping.serialize_payload()).await.unwrap();

            let env = envelope::read(&mut peer).await.unwrap();
            assert_eq!(env.command, CMD_PONG);
            match Message::parse(CMD_PONG, &env.payload).unwrap() {
                Message::Pong(nonce) => assert_eq!(nonce, 0xDEAD_BEEF),
                _ => unreachable!(),
            }

            let addrv2 = Message::AddrV2(vec![
                AddrV2Entry {
                    timestamp: (now - 60) as u32,
                    services: 0,
                    net_id: 1,
                    host: "203.0.113.1".to_owned(),
                    port: 8333,
                },
                AddrV2Entry {
                    timestamp: (now - 120) as u32,
                    services: 0,
                    net_id: 4,
                    host: "a".repeat(56) + ".onion",
                    port: 8333,
                },
            ]);
            envelope::write(&mut peer, addrv2.command(), &addrv2.serialize_payload()).await.unwrap();

            // Keep the socket open until `get_peer_addrs`'s getaddr budget
            // elapses, so the call exits via its own timeout rather than EOF.
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let addrs = session.get_peer_addrs(&mut node, Duration::from_millis(150), Duration::from_millis(100)).await;
        peer_task.await.unwrap();

        assert_eq!(addrs.len(), 2);
        assert!(addrs.contains(&Address::new("203.0.113.1", 8333, now - 60)));
        assert_eq!(node.stats.advertised_addrs.total(), 2);
    }
}
