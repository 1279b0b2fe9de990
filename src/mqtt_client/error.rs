// SPDX-License-Identifier: MPL-2.0

//! Error types for MQTT client operations
//!
//! Every failure the engine or the Tokio driver can report is a
//! [`MqttClientError`]. [`MqttClientError::kind`] folds the variants into the
//! coarse [`ErrorKind`] taxonomy used by the `error` event, and the
//! predicates (`is_recoverable`, `should_reconnect`, `is_fatal`) drive the
//! engine's teardown and reconnect decisions.

use crate::mqtt_serde::parser::ParseError;
use crate::mqtt_topic::TopicError;
use std::fmt;
use std::io;

/// Coarse error classes reported with the `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Caller supplied a field the protocol cannot carry. Fatal to that operation only.
    Encoding,
    /// Peer sent bytes that do not decode. The connection is torn down.
    MalformedPacket,
    /// Broker refused the connection or never answered CONNECT.
    Connect,
    /// I/O failure or lost connection. Triggers the reconnect path.
    Transport,
    /// Peer broke the protocol state machine. Treated like a malformed packet.
    ProtocolViolation,
    /// Broker rejected one or more filters of a SUBSCRIBE.
    Subscription,
    /// Operation not allowed in the current connection state.
    State,
    /// Resource limits, closed channels, configuration and internal errors.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Encoding => "EncodingError",
            ErrorKind::MalformedPacket => "MalformedPacketError",
            ErrorKind::Connect => "ConnectError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::ProtocolViolation => "ProtocolViolation",
            ErrorKind::Subscription => "SubscriptionError",
            ErrorKind::State => "StateError",
            ErrorKind::Runtime => "RuntimeError",
        };
        f.write_str(name)
    }
}

/// Comprehensive error type for MQTT client operations
#[derive(Debug, Clone, serde::Serialize)]
pub enum MqttClientError {
    // ==================== Caller Errors ====================
    /// A packet could not be encoded (topic too long, QoS out of range, ...)
    Encoding { message: String },

    /// Packet identifier is already held by an unacknowledged message
    PacketIdInUse { packet_id: u16 },

    // ==================== Connection Errors ====================
    /// Broker answered CONNECT with a non-zero return code
    ConnectionRefused { return_code: u8, description: String },

    /// No CONNACK within the connect timeout
    ConnectTimeout { timeout_ms: u64 },

    /// Connection lost unexpectedly
    ConnectionLost { reason: String },

    /// No PINGRESP within 1.5 times the keep-alive interval
    KeepAliveTimeout { keep_alive_secs: u16 },

    /// Network I/O error occurred
    NetworkError {
        #[serde(skip)]
        kind: io::ErrorKind,
        message: String,
    },

    /// Reconnect policy gave up
    ReconnectExhausted { attempts: u32 },

    // ==================== Protocol Errors ====================
    /// MQTT protocol violation detected
    ProtocolViolation { message: String },

    /// Failed to parse MQTT packet
    MalformedPacket {
        parse_error: String,
        raw_data: Vec<u8>, // First 100 bytes for debugging
    },

    /// SUBACK carried 0x80 for one or more filters
    SubscribeFailed {
        packet_id: u16,
        topics: Vec<String>,
    },

    // ==================== State Errors ====================
    /// Not connected to broker
    NotConnected,

    /// Already connected to broker
    AlreadyConnected,

    /// Packet ID space exhausted (all 65535 IDs in use)
    PacketIdExhausted,

    /// Operation was cancelled before completion
    OperationCancelled { operation: String },

    // ==================== Resource Errors ====================
    /// Buffer is full, cannot accept more data
    BufferFull {
        buffer_type: String,
        capacity: usize,
    },

    /// Internal channel closed unexpectedly
    ChannelClosed { channel: String },

    /// Invalid client configuration
    InvalidConfiguration { field: String, reason: String },

    /// Internal client error (should not happen)
    InternalError { message: String },
}

const RAW_DATA_LIMIT: usize = 100;

impl MqttClientError {
    /// Taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::PacketIdInUse { .. } | Self::ProtocolViolation { .. } => {
                ErrorKind::ProtocolViolation
            }
            Self::ConnectionRefused { .. } | Self::ConnectTimeout { .. } => ErrorKind::Connect,
            Self::ConnectionLost { .. }
            | Self::KeepAliveTimeout { .. }
            | Self::NetworkError { .. }
            | Self::ReconnectExhausted { .. } => ErrorKind::Transport,
            Self::MalformedPacket { .. } => ErrorKind::MalformedPacket,
            Self::SubscribeFailed { .. } => ErrorKind::Subscription,
            Self::NotConnected
            | Self::AlreadyConnected
            | Self::PacketIdExhausted
            | Self::OperationCancelled { .. } => ErrorKind::State,
            Self::BufferFull { .. }
            | Self::ChannelClosed { .. }
            | Self::InvalidConfiguration { .. }
            | Self::InternalError { .. } => ErrorKind::Runtime,
        }
    }

    /// Returns true if the error is recoverable (retry/reconnect possible)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost { .. }
                | Self::KeepAliveTimeout { .. }
                | Self::NetworkError { .. }
                | Self::ConnectTimeout { .. }
                | Self::NotConnected
                | Self::BufferFull { .. }
                | Self::PacketIdExhausted
        )
    }

    /// Returns true if the error means the connection is gone and the
    /// reconnect policy should run.
    pub fn should_reconnect(&self) -> bool {
        match self {
            Self::ConnectionLost { .. }
            | Self::KeepAliveTimeout { .. }
            | Self::MalformedPacket { .. }
            | Self::ProtocolViolation { .. } => true,
            Self::NetworkError { kind, .. } => !matches!(
                kind,
                io::ErrorKind::InvalidInput | io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }

    /// Returns true if the error is fatal (client should stop)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. }
                | Self::InternalError { .. }
                | Self::ReconnectExhausted { .. }
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Encoding { message } => format!("Cannot encode packet: {}", message),
            Self::PacketIdInUse { packet_id } => {
                format!("Packet identifier {} is still in flight", packet_id)
            }
            Self::ConnectionRefused {
                return_code,
                description,
            } => format!(
                "Connection refused by broker: {} (code: 0x{:02X})",
                description, return_code
            ),
            Self::ConnectTimeout { timeout_ms } => {
                format!("No CONNACK received within {} ms", timeout_ms)
            }
            Self::ConnectionLost { reason } => format!("Connection to broker lost: {}", reason),
            Self::KeepAliveTimeout { keep_alive_secs } => format!(
                "No PINGRESP within 1.5x keep-alive ({} s), connection considered lost",
                keep_alive_secs
            ),
            Self::NetworkError { kind, message } => {
                format!("Network error ({:?}): {}", kind, message)
            }
            Self::ReconnectExhausted { attempts } => {
                format!("Gave up reconnecting after {} attempts", attempts)
            }
            Self::ProtocolViolation { message } => format!("MQTT protocol violation: {}", message),
            Self::MalformedPacket {
                parse_error,
                raw_data,
            } => {
                let data_preview = if raw_data.len() > 20 {
                    format!("{}... ({} bytes)", hex::encode(&raw_data[..20]), raw_data.len())
                } else {
                    hex::encode(raw_data)
                };
                format!(
                    "Failed to parse MQTT packet: {} (data: {})",
                    parse_error, data_preview
                )
            }
            Self::SubscribeFailed { packet_id, topics } => format!(
                "Broker rejected subscription {:?} (packet ID: {})",
                topics, packet_id
            ),
            Self::NotConnected => "Not connected to broker. Call connect() first.".to_string(),
            Self::AlreadyConnected => "Already connected to broker.".to_string(),
            Self::PacketIdExhausted => {
                "All packet identifiers are in use. Wait for pending operations to complete."
                    .to_string()
            }
            Self::OperationCancelled { operation } => {
                format!("Operation '{}' was cancelled", operation)
            }
            Self::BufferFull {
                buffer_type,
                capacity,
            } => format!(
                "{} buffer full (capacity: {}). Try again later.",
                buffer_type, capacity
            ),
            Self::ChannelClosed { channel } => {
                format!("Internal channel '{}' closed unexpectedly", channel)
            }
            Self::InvalidConfiguration { field, reason } => {
                format!("Invalid configuration for '{}': {}", field, reason)
            }
            Self::InternalError { message } => format!("Internal error: {}", message),
        }
    }

    /// Convert from io::Error with context
    pub fn from_io_error(error: io::Error, context: &str) -> Self {
        Self::NetworkError {
            kind: error.kind(),
            message: format!("{}: {}", context, error),
        }
    }

    /// A decode failure on inbound bytes; keeps a bounded copy for diagnostics.
    pub fn malformed(error: ParseError, raw_data: &[u8]) -> Self {
        Self::MalformedPacket {
            parse_error: error.to_string(),
            raw_data: raw_data[..raw_data.len().min(RAW_DATA_LIMIT)].to_vec(),
        }
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }
}

impl fmt::Display for MqttClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for MqttClientError {}

impl From<io::Error> for MqttClientError {
    fn from(error: io::Error) -> Self {
        Self::NetworkError {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

// Encoding path: outbound packets are the only place a ParseError is
// converted implicitly. Inbound failures go through `malformed`.
impl From<ParseError> for MqttClientError {
    fn from(error: ParseError) -> Self {
        Self::Encoding {
            message: error.to_string(),
        }
    }
}

impl From<TopicError> for MqttClientError {
    fn from(error: TopicError) -> Self {
        Self::Encoding {
            message: error.to_string(),
        }
    }
}

impl From<MqttClientError> for io::Error {
    fn from(error: MqttClientError) -> Self {
        let kind = match &error {
            MqttClientError::NetworkError { kind, .. } => *kind,
            MqttClientError::ConnectTimeout { .. } => io::ErrorKind::TimedOut,
            MqttClientError::ConnectionLost { .. } | MqttClientError::KeepAliveTimeout { .. } => {
                io::ErrorKind::ConnectionAborted
            }
            MqttClientError::ConnectionRefused { .. } => io::ErrorKind::ConnectionRefused,
            MqttClientError::NotConnected => io::ErrorKind::NotConnected,
            MqttClientError::Encoding { .. } | MqttClientError::InvalidConfiguration { .. } => {
                io::ErrorKind::InvalidInput
            }
            MqttClientError::MalformedPacket { .. } | MqttClientError::ProtocolViolation { .. } => {
                io::ErrorKind::InvalidData
            }
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, error.to_string())
    }
}

/// Result type alias for MQTT client operations
pub type MqttClientResult<T> = Result<T, MqttClientError>;
