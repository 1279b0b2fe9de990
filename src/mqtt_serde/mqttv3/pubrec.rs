// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::check_packet_id;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_packet_id_only, ParseError, ParseOk};

/// PUBREC, first response to a QoS 2 PUBLISH.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttPubRec {
    pub packet_id: u16,
}

impl MqttPubRec {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl MqttControlPacket for MqttPubRec {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBREC as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(check_packet_id(self.packet_id)?.to_be_bytes().to_vec())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        Ok(
            match parse_packet_id_only(buffer, ControlPacketType::PUBREC as u8, 0x00, "PUBREC")? {
                Ok((packet_id, total_len)) => {
                    ParseOk::Packet(MqttPacket::PubRec(MqttPubRec::new(packet_id)), total_len)
                }
                Err(hint) => ParseOk::Continue(hint, 0),
            },
        )
    }
}
