// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::check_packet_id;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_packet_id_only, ParseError, ParseOk};

// MQTT-3.6.1-1: bits 3,2,1,0 of the fixed header are 0,0,1,0
const PUBREL_FLAGS: u8 = 0x02;

/// PUBREL, second stage of the QoS 2 handshake.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttPubRel {
    pub packet_id: u16,
}

impl MqttPubRel {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl MqttControlPacket for MqttPubRel {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBREL as u8
    }

    fn flags(&self) -> u8 {
        PUBREL_FLAGS
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(check_packet_id(self.packet_id)?.to_be_bytes().to_vec())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        Ok(
            match parse_packet_id_only(
                buffer,
                ControlPacketType::PUBREL as u8,
                PUBREL_FLAGS,
                "PUBREL",
            )? {
                Ok((packet_id, total_len)) => {
                    ParseOk::Packet(MqttPacket::PubRel(MqttPubRel::new(packet_id)), total_len)
                }
                Err(hint) => ParseOk::Continue(hint, 0),
            },
        )
    }
}
