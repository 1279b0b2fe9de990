// SPDX-License-Identifier: MPL-2.0

//! Timeout Integration Tests
//!
//! Tests to verify timer-driven behavior in TokioAsyncMqttClient:
//! - CONNACK not received within the connect timeout
//! - Keep-alive PINGREQ and the dead-connection timeout
//! - A live connection answered with PINGRESP stays up
//! - A transport dial that never completes is bounded and cancellable

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{connect_client, memory_broker, MemoryConnector};
use flowmqtt::mqtt_client::transport::{BoxedTransport, Connector, TransportError};
use flowmqtt::mqtt_client::{
    ClientEvent, MqttClientError, MqttClientOptions, ReconnectPolicy, TokioAsyncClientConfig,
    TokioAsyncMqttClient,
};
use flowmqtt::mqtt_serde::control_packet::MqttPacket;
use flowmqtt::mqtt_serde::mqttv3::MqttPingResp;
use tokio::time::Instant;
use tokio_stream::StreamExt;

#[tokio::test(start_paused = true)]
async fn test_connect_times_out_without_connack() {
    let (connector, mut broker) = memory_broker();
    let opts = MqttClientOptions::builder()
        .client_id("to-connect")
        .connect_timeout_ms(250)
        .build();
    let client = TokioAsyncMqttClient::new(
        opts,
        connector,
        TokioAsyncClientConfig::default(),
        Box::new(flowmqtt::mqtt_client::NoopEventHandler),
    )
    .unwrap();

    let started = Instant::now();
    let (result, _peer) = tokio::join!(client.connect(), async {
        let mut peer = broker.accept().await;
        assert!(matches!(peer.recv().await, MqttPacket::Connect(_)));
        // never answer
        peer
    });
    assert!(matches!(
        result,
        Err(MqttClientError::ConnectTimeout { timeout_ms: 250 })
    ));
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_timeout_closes_connection() {
    let (connector, mut broker) = memory_broker();
    let opts = MqttClientOptions::builder()
        .client_id("to-keepalive")
        .keep_alive(2)
        .reconnect(ReconnectPolicy::disabled())
        .build();
    let (client, mut events) =
        TokioAsyncMqttClient::with_event_stream(opts, connector, TokioAsyncClientConfig::default())
            .unwrap();
    let mut peer = connect_client(&client, &mut broker, false).await;
    let connected_at = Instant::now();

    assert!(matches!(peer.recv().await, MqttPacket::PingReq(_)));
    let ping_at = Instant::now();
    assert!(ping_at - connected_at >= Duration::from_secs(2));

    assert!(matches!(events.next().await, Some(ClientEvent::Connected(_))));
    match events.next().await {
        Some(ClientEvent::Error(MqttClientError::KeepAliveTimeout { keep_alive_secs })) => {
            assert_eq!(keep_alive_secs, 2);
        }
        other => panic!("Expected keep-alive timeout, got {:?}", other),
    }
    assert!(Instant::now() - ping_at >= Duration::from_secs(3));
    assert!(matches!(
        events.next().await,
        Some(ClientEvent::Closed { expected: false })
    ));

    // only one PINGREQ before the client gave up
    assert!(peer.try_recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_pingresp_keeps_connection_alive() {
    let (connector, mut broker) = memory_broker();
    let opts = MqttClientOptions::builder()
        .client_id("to-alive")
        .keep_alive(1)
        .build();
    let client = TokioAsyncMqttClient::new(
        opts,
        connector,
        TokioAsyncClientConfig::default(),
        Box::new(flowmqtt::mqtt_client::NoopEventHandler),
    )
    .unwrap();
    let mut peer = connect_client(&client, &mut broker, false).await;

    for _ in 0..5 {
        assert!(matches!(peer.recv().await, MqttPacket::PingReq(_)));
        peer.send(MqttPacket::PingResp(MqttPingResp::new())).await;
    }

    let result = client.publish("still/here", "yes", 0, false).await;
    assert!(result.is_ok());
    assert!(matches!(peer.recv().await, MqttPacket::Publish(_)));
}

/// Dials like a blackholed broker: the connect never completes.
struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(&self) -> Result<BoxedTransport, TransportError> {
        std::future::pending().await
    }
}

/// First dial goes to the in-memory broker, every later one hangs.
struct HangAfterFirst {
    inner: MemoryConnector,
    dials: AtomicUsize,
}

#[async_trait]
impl Connector for HangAfterFirst {
    async fn connect(&self) -> Result<BoxedTransport, TransportError> {
        if self.dials.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.connect().await
        } else {
            std::future::pending().await
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_hung_dial_times_out() {
    let opts = MqttClientOptions::builder()
        .client_id("to-dial")
        .connect_timeout_ms(1000)
        .reconnect(ReconnectPolicy::disabled())
        .build();
    let client = TokioAsyncMqttClient::new(
        opts,
        HangingConnector,
        TokioAsyncClientConfig::default(),
        Box::new(flowmqtt::mqtt_client::NoopEventHandler),
    )
    .unwrap();

    let started = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(120), client.connect())
        .await
        .expect("connect was not bounded by the connect timeout");
    assert!(matches!(
        result,
        Err(MqttClientError::ConnectTimeout { timeout_ms: 1000 })
    ));
    assert!(started.elapsed() >= Duration::from_millis(1000));

    // the worker is idle again
    assert!(matches!(
        client.publish("a", "b", 0, false).await,
        Err(MqttClientError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_hung_dial() {
    let opts = MqttClientOptions::builder()
        .client_id("to-cancel")
        .connect_timeout_ms(60_000)
        .build();
    let client = TokioAsyncMqttClient::new(
        opts,
        HangingConnector,
        TokioAsyncClientConfig::default(),
        Box::new(flowmqtt::mqtt_client::NoopEventHandler),
    )
    .unwrap();

    let connecting = client.clone();
    let pending = tokio::spawn(async move { connecting.connect().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // a second connect while dialing is refused without blocking
    assert!(matches!(
        client.connect().await,
        Err(MqttClientError::AlreadyConnected)
    ));

    tokio::time::timeout(Duration::from_secs(1), client.disconnect())
        .await
        .expect("disconnect blocked behind the dial")
        .unwrap();
    assert!(matches!(
        pending.await.unwrap(),
        Err(MqttClientError::OperationCancelled { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_hung_dial() {
    let client = TokioAsyncMqttClient::new(
        MqttClientOptions::builder().client_id("to-stop").build(),
        HangingConnector,
        TokioAsyncClientConfig::default(),
        Box::new(flowmqtt::mqtt_client::NoopEventHandler),
    )
    .unwrap();

    let connecting = client.clone();
    let pending = tokio::spawn(async move { connecting.connect().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    tokio::time::timeout(Duration::from_secs(1), client.shutdown())
        .await
        .expect("shutdown blocked behind the dial")
        .unwrap();
    assert!(pending.await.unwrap().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_hung_reconnect_dial_is_retried_and_cancellable() {
    let (connector, mut broker) = memory_broker();
    let connector = HangAfterFirst {
        inner: connector,
        dials: AtomicUsize::new(0),
    };
    let opts = MqttClientOptions::builder()
        .client_id("to-redial")
        .connect_timeout_ms(500)
        .reconnect(ReconnectPolicy::constant(Duration::from_millis(100)))
        .build();
    let (client, mut events) =
        TokioAsyncMqttClient::with_event_stream(opts, connector, TokioAsyncClientConfig::default())
            .unwrap();
    let peer = connect_client(&client, &mut broker, false).await;
    drop(peer);

    let lost_at = Instant::now();
    loop {
        match events.next().await {
            Some(ClientEvent::ReconnectScheduled { attempt: 2, .. }) => break,
            Some(_) => {}
            None => panic!("event stream ended"),
        }
    }
    // 100 ms backoff plus the 500 ms dial timeout
    assert!(lost_at.elapsed() >= Duration::from_millis(600));

    // second attempt is dialing now
    tokio::time::sleep(Duration::from_millis(150)).await;
    tokio::time::timeout(Duration::from_secs(1), client.disconnect())
        .await
        .expect("disconnect blocked behind the reconnect dial")
        .unwrap();
    assert!(matches!(
        events.next().await,
        Some(ClientEvent::Closed { expected: true })
    ));
}
