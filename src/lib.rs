// SPDX-License-Identifier: MPL-2.0

//! # flowmqtt
//!
//! A minimal MQTT 3.1.1 client engine.
//!
//! The crate is layered leaf to root:
//!
//! - [`mqtt_serde`]: the wire codec, one struct per control packet plus a
//!   resumable stream parser.
//! - [`mqtt_topic`]: topic name / topic filter validation and wildcard matching.
//! - [`mqtt_session`]: per-client session state, subscriptions and the QoS 1/2
//!   in-flight stores.
//! - [`mqtt_client`]: the Sans-I/O [`MqttEngine`](mqtt_client::MqttEngine) and
//!   the Tokio driver [`TokioAsyncMqttClient`](mqtt_client::TokioAsyncMqttClient).
//!
//! ```no_run
//! use flowmqtt::mqtt_client::{MqttClientOptions, TcpConnector, TokioAsyncMqttClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = MqttClientOptions::builder()
//!     .client_id("sensor-1")
//!     .keep_alive(30)
//!     .build();
//! let client = TokioAsyncMqttClient::new(
//!     options,
//!     TcpConnector::new("localhost:1883"),
//!     Default::default(),
//!     Box::new(flowmqtt::mqtt_client::NoopEventHandler),
//! )?;
//! client.connect().await?;
//! client.publish("sensors/temp", b"21.5".to_vec(), 1, false).await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::new_without_default)]

pub mod mqtt_client;
pub mod mqtt_serde;
pub mod mqtt_session;
pub mod mqtt_topic;
