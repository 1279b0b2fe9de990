// SPDX-License-Identifier: MPL-2.0

//! Client side of the protocol: the Sans-I/O engine and its Tokio driver.

pub mod commands;
pub mod engine;
pub mod error;
pub mod opts;
pub mod reconnect;
pub mod results;
mod timer;
pub mod tokio_async_client;
pub mod transport;

pub use commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
pub use engine::{ConnectionState, MqttEngine, MqttEvent};
pub use error::{ErrorKind, MqttClientError, MqttClientResult};
pub use opts::MqttClientOptions;
pub use reconnect::{BackoffStrategy, Jitter, ReconnectPolicy};
pub use results::{
    ConnectionResult, InboundMessage, PublishResult, SubscribeResult, UnsubscribeResult,
};
pub use tokio_async_client::{
    ChannelEventHandler, ClientEvent, MqttEventHandler, NoopEventHandler, TokioAsyncClientConfig,
    TokioAsyncMqttClient,
};
pub use transport::{BoxedTransport, Connector, TcpConnector, TcpTransport, Transport, TransportError};
