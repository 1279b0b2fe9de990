// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_empty_packet, ParseError, ParseOk};

/// PINGRESP, the broker's answer to PINGREQ.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct MqttPingResp;

impl MqttPingResp {
    pub fn new() -> Self {
        Self
    }
}

impl MqttControlPacket for MqttPingResp {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PINGRESP as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        Ok(
            match parse_empty_packet(buffer, ControlPacketType::PINGRESP as u8, "PINGRESP")? {
                Ok(total_len) => ParseOk::Packet(MqttPacket::PingResp(MqttPingResp), total_len),
                Err(hint) => ParseOk::Continue(hint, 0),
            },
        )
    }
}
