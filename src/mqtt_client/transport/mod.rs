// SPDX-License-Identifier: MPL-2.0

//! Transport abstraction layer for MQTT connections
//!
//! The client only needs an ordered, reliable byte stream. Anything that
//! implements [`Transport`] can carry MQTT, and a [`Connector`] opens a
//! fresh one for every connection attempt.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

use super::error::MqttClientError;

pub mod tcp;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport not supported: {0}")]
    NotSupported(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// A connected byte stream.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Send + Sync + Unpin {
    /// Connect to the specified address (format depends on transport type)
    async fn connect(addr: &str) -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Gracefully close the connection
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the peer address as a string
    fn peer_addr(&self) -> Result<String, TransportError>;

    /// Set TCP_NODELAY option (no-op for non-TCP transports)
    fn set_nodelay(&self, _nodelay: bool) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Boxed transport for dynamic dispatch
pub type BoxedTransport = Box<dyn Transport>;

/// Opens a new transport for each connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<BoxedTransport, TransportError>;
}

/// In-memory pipe, used to run the client against a scripted peer.
#[async_trait]
impl Transport for DuplexStream {
    async fn connect(addr: &str) -> Result<Self, TransportError> {
        Err(TransportError::NotSupported(format!(
            "in-memory stream cannot dial {}",
            addr
        )))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }

    fn peer_addr(&self) -> Result<String, TransportError> {
        Ok("memory".to_string())
    }
}

impl From<TransportError> for MqttClientError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Io(e) => MqttClientError::from_io_error(e, "transport"),
            other => MqttClientError::NetworkError {
                kind: io::ErrorKind::Other,
                message: other.to_string(),
            },
        }
    }
}

// Re-export transport types
pub use tcp::{TcpConnector, TcpTransport};
