// SPDX-License-Identifier: MPL-2.0

//! Scripted in-memory broker for driving `TokioAsyncMqttClient` in tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowmqtt::mqtt_client::transport::{BoxedTransport, Connector, TransportError};
use flowmqtt::mqtt_serde::control_packet::MqttPacket;
use flowmqtt::mqtt_serde::mqttv3::{MqttConnAck, MqttConnect};
use flowmqtt::mqtt_serde::parser::stream::MqttParser;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(30);

/// Hands the server half of a fresh duplex pipe to the [`Broker`] for every
/// connection attempt.
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
    failures: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<BoxedTransport, TransportError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::ConnectionFailed("refused by test".to_string()));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.peers
            .send(server)
            .map_err(|_| TransportError::ConnectionFailed("broker dropped".to_string()))?;
        Ok(Box::new(client))
    }
}

pub struct Broker {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
    failures: Arc<AtomicUsize>,
}

pub fn memory_broker() -> (MemoryConnector, Broker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let failures = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnector {
            peers: tx,
            failures: failures.clone(),
        },
        Broker {
            incoming: rx,
            failures,
        },
    )
}

impl Broker {
    /// Next connection attempt from the client.
    pub async fn accept(&mut self) -> Peer {
        let stream = tokio::time::timeout(WAIT, self.incoming.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped");
        Peer {
            stream,
            parser: MqttParser::default(),
        }
    }

    /// Fail the next `n` connection attempts at the transport level.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

/// Server side of one client connection.
pub struct Peer {
    stream: DuplexStream,
    parser: MqttParser,
}

impl Peer {
    /// Next packet from the client, `None` on EOF.
    pub async fn try_recv(&mut self) -> Option<MqttPacket> {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(packet) = self.parser.next_packet().expect("client sent malformed bytes") {
                return Some(packet);
            }
            let n = tokio::time::timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for a packet")
                .expect("read failed");
            if n == 0 {
                return None;
            }
            self.parser.feed(&buf[..n]);
        }
    }

    pub async fn recv(&mut self) -> MqttPacket {
        self.try_recv().await.expect("client closed the connection")
    }

    pub async fn send(&mut self, packet: MqttPacket) {
        let bytes = packet.to_bytes().expect("encode");
        self.stream.write_all(&bytes).await.expect("write");
    }

    /// Reads CONNECT and answers with `return_code`.
    pub async fn handshake(&mut self, session_present: bool, return_code: u8) -> MqttConnect {
        let connect = match self.recv().await {
            MqttPacket::Connect(c) => c,
            other => panic!("Expected CONNECT, got {:?}", other),
        };
        self.send(MqttPacket::ConnAck(MqttConnAck::new(session_present, return_code)))
            .await;
        connect
    }
}

/// Runs `client.connect()` against the next accepted peer.
pub async fn connect_client(
    client: &flowmqtt::mqtt_client::TokioAsyncMqttClient,
    broker: &mut Broker,
    session_present: bool,
) -> Peer {
    let (result, peer) = tokio::join!(client.connect(), async {
        let mut peer = broker.accept().await;
        peer.handshake(session_present, 0).await;
        peer
    });
    let result = result.expect("connect failed");
    assert_eq!(result.session_present, session_present);
    peer
}
