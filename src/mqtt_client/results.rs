// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::mqttv3::connack::MqttConnAck;
use crate::mqtt_serde::mqttv3::suback::SUBSCRIPTION_FAILURE;

/// Outcome of a CONNECT handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub return_code: u8,
    pub session_present: bool,
}

impl ConnectionResult {
    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }

    pub fn description(&self) -> &'static str {
        MqttConnAck::describe(self.return_code)
    }
}

/// A completed publish. `packet_id` is `None` for QoS 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub packet_id: Option<u16>,
    pub qos: u8,
}

/// SUBACK matched to its SUBSCRIBE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResult {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
    /// Granted QoS per filter, or 0x80 on failure.
    pub return_codes: Vec<u8>,
}

impl SubscribeResult {
    pub fn is_success(&self) -> bool {
        self.return_codes.iter().all(|c| *c != SUBSCRIPTION_FAILURE)
    }

    pub fn granted_qos(&self, topic_filter: &str) -> Option<u8> {
        self.topic_filters
            .iter()
            .position(|f| f == topic_filter)
            .and_then(|i| self.return_codes.get(i).copied())
            .filter(|c| *c != SUBSCRIPTION_FAILURE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeResult {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
}

/// An application message delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Effective QoS: the lower of the publish QoS and the granted QoS.
    pub qos: u8,
    pub retain: bool,
    pub dup: bool,
    /// The subscription filter this delivery is for, `None` when no stored
    /// subscription matched.
    pub subscription: Option<String>,
}

impl InboundMessage {
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
