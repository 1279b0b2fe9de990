// SPDX-License-Identifier: MPL-2.0

//! Publishes fake sensor readings and prints everything under `sensors/#`.
//!
//! ```text
//! MQTT_BROKER=localhost:1883 RUST_LOG=flowmqtt=debug cargo run --example sensor_client
//! ```

use std::time::Duration;

use flowmqtt::mqtt_client::{
    ClientEvent, MqttClientOptions, ReconnectPolicy, TcpConnector, TokioAsyncClientConfig,
    TokioAsyncMqttClient,
};
use flowmqtt::mqtt_serde::mqttv3::Will;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const READINGS: u32 = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let broker = std::env::var("MQTT_BROKER").unwrap_or_else(|_| "localhost:1883".to_string());
    let client_id = format!("sensor-{}", std::process::id());
    let status_topic = format!("status/{}", client_id);
    let request_topic = format!("cmd/{}/request", client_id);
    let response_topic = format!("cmd/{}/response", client_id);

    let options = MqttClientOptions::builder()
        .client_id(client_id.clone())
        .keep_alive(15)
        .will(Will::new(status_topic.clone(), "offline", 1, true))
        .reconnect(ReconnectPolicy::default())
        .build();

    let (client, mut events) = TokioAsyncMqttClient::with_event_stream(
        options,
        TcpConnector::new(broker.clone()),
        TokioAsyncClientConfig::default(),
    )?;

    let result = client.connect().await?;
    info!(%broker, session_present = result.session_present, "connected");

    client.publish(status_topic.as_str(), "online", 1, true).await?;
    let granted = client.subscribe_one("sensors/#", 1).await?;
    info!(granted = ?granted.return_codes, "subscribed");
    client.subscribe_one(request_topic.as_str(), 1).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let mut sent = 0;
    while sent < READINGS {
        tokio::select! {
            _ = ticker.tick() => {
                let reading = json!({
                    "sensor": client_id,
                    "seq": sent,
                    "temperature": 20.0 + (sent % 7) as f64 * 0.5,
                });
                let topic = format!("sensors/{}/temperature", client_id);
                match client.publish(topic, reading.to_string(), 1, false).await {
                    Ok(r) => info!(packet_id = ?r.packet_id, seq = sent, "reading published"),
                    Err(e) => warn!(error = %e, "publish failed"),
                }
                sent += 1;
            }
            Some(event) = events.next() => match event {
                ClientEvent::Message(m) if m.topic == request_topic => {
                    let reply = json!({
                        "request": m.payload_str(),
                        "readings_sent": sent,
                    });
                    if let Err(e) = client.publish(response_topic.as_str(), reply.to_string(), 1, false).await {
                        warn!(error = %e, "response failed");
                    }
                }
                ClientEvent::Message(m) => {
                    info!(topic = %m.topic, payload = m.payload_str().unwrap_or("<binary>"), "message");
                }
                ClientEvent::ReconnectScheduled { attempt, delay } => {
                    warn!(attempt, ?delay, "connection lost, retrying");
                }
                ClientEvent::Error(e) => error!(error = %e, "client error"),
                ClientEvent::Connected(_) | ClientEvent::Closed { .. } => {}
            },
        }
    }

    client.publish(status_topic.as_str(), "offline", 1, true).await?;
    client.disconnect().await?;
    client.shutdown().await?;
    Ok(())
}
