// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_empty_packet, ParseError, ParseOk};

/// DISCONNECT, the last packet a client sends on a graceful close.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct MqttDisconnect;

impl MqttDisconnect {
    pub fn new() -> Self {
        Self
    }
}

impl MqttControlPacket for MqttDisconnect {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::DISCONNECT as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        Ok(
            match parse_empty_packet(buffer, ControlPacketType::DISCONNECT as u8, "DISCONNECT")? {
                Ok(total_len) => ParseOk::Packet(MqttPacket::Disconnect(MqttDisconnect), total_len),
                Err(hint) => ParseOk::Continue(hint, 0),
            },
        )
    }
}
