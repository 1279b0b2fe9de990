// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use super::error::MqttClientError;
use super::reconnect::ReconnectPolicy;
use crate::mqtt_serde::mqttv3::connect::Will;
use crate::mqtt_topic;

/// Connection and session options for one client.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes:
///
/// ```
/// use flowmqtt::mqtt_client::MqttClientOptions;
///
/// let opts = MqttClientOptions::from_json(r#"{"client_id":"sensor-1","keep_alive":15}"#).unwrap();
/// assert_eq!(opts.keep_alive, 15);
/// assert!(opts.clean_session);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttClientOptions {
    pub client_id: String,
    /// Seconds, 0 disables keep-alive.
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub will: Option<Will>,
    /// How long to wait for CONNACK after CONNECT is written.
    pub connect_timeout_ms: u64,
    /// Max outbound QoS 1/2 messages in flight, 0 means 65535.
    pub max_inflight: u16,
    /// Re-send stored subscriptions after reconnecting without a session.
    pub resubscribe: bool,
    pub reconnect: ReconnectPolicy,

    // --------------------------
    // Engine buffer limits
    // --------------------------
    /// Packets waiting in the outgoing buffer before sends fail with `BufferFull`.
    pub max_outgoing_packet_count: usize,
    /// Events buffered before inbound parsing pauses.
    pub max_event_count: usize,
}

impl Default for MqttClientOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            keep_alive: 60,
            clean_session: true,
            username: None,
            password: None,
            will: None,
            connect_timeout_ms: 10_000,
            max_inflight: 0,
            resubscribe: true,
            reconnect: ReconnectPolicy::default(),
            max_outgoing_packet_count: 1_000,
            max_event_count: 1_000,
        }
    }
}

impl MqttClientOptions {
    pub fn builder() -> MqttClientOptionsBuilder {
        MqttClientOptionsBuilder::default()
    }

    pub fn from_json(json: &str) -> Result<Self, MqttClientError> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| MqttClientError::InvalidConfiguration {
                field: "json".to_string(),
                reason: e.to_string(),
            })?;
        options.validate()?;
        Ok(options)
    }

    /// Checks combinations the broker would reject or the engine cannot honor.
    pub fn validate(&self) -> Result<(), MqttClientError> {
        fn invalid(field: &str, reason: &str) -> Result<(), MqttClientError> {
            Err(MqttClientError::InvalidConfiguration {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        }

        if self.client_id.is_empty() && !self.clean_session {
            return invalid("client_id", "an empty client id requires clean_session");
        }
        if self.client_id.len() > u16::MAX as usize {
            return invalid("client_id", "longer than 65535 bytes");
        }
        if self.password.is_some() && self.username.is_none() {
            return invalid("password", "a password requires a username");
        }
        if let Some(will) = &self.will {
            if will.qos > 2 {
                return invalid("will.qos", "must be 0, 1 or 2");
            }
            if let Err(e) = mqtt_topic::validate_topic_name(&will.topic) {
                return invalid("will.topic", &e.to_string());
            }
        }
        if self.connect_timeout_ms == 0 {
            return invalid("connect_timeout_ms", "must be greater than 0");
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return invalid("reconnect.max_delay_ms", "smaller than base_delay_ms");
        }
        if self.max_outgoing_packet_count == 0 || self.max_event_count == 0 {
            return invalid("buffer limits", "must be greater than 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MqttClientOptionsBuilder {
    options: MqttClientOptions,
}

impl MqttClientOptionsBuilder {
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.options.client_id = client_id.into();
        self
    }

    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.options.keep_alive = seconds;
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.options.clean_session = clean;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.options.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.options.password = Some(password.into());
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.options.will = Some(will);
        self
    }

    pub fn connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn max_inflight(mut self, max_inflight: u16) -> Self {
        self.options.max_inflight = max_inflight;
        self
    }

    pub fn resubscribe(mut self, resubscribe: bool) -> Self {
        self.options.resubscribe = resubscribe;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    pub fn max_outgoing_packet_count(mut self, count: usize) -> Self {
        self.options.max_outgoing_packet_count = count;
        self
    }

    pub fn max_event_count(mut self, count: usize) -> Self {
        self.options.max_event_count = count;
        self
    }

    pub fn build(self) -> MqttClientOptions {
        self.options
    }
}
