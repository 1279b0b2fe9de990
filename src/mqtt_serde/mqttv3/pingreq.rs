// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_empty_packet, ParseError, ParseOk};

/// PINGREQ, sent by the client when the keep-alive interval elapses without other traffic.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct MqttPingReq;

impl MqttPingReq {
    pub fn new() -> Self {
        Self
    }
}

impl MqttControlPacket for MqttPingReq {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PINGREQ as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        Ok(
            match parse_empty_packet(buffer, ControlPacketType::PINGREQ as u8, "PINGREQ")? {
                Ok(total_len) => ParseOk::Packet(MqttPacket::PingReq(MqttPingReq), total_len),
                Err(hint) => ParseOk::Continue(hint, 0),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pingreq_bytes() {
        let bytes = MqttPingReq::new().to_bytes().unwrap();
        assert_eq!(bytes, vec![0xC0, 0x00]);
        assert_eq!(
            MqttPingReq::from_bytes(&bytes).unwrap(),
            ParseOk::Packet(MqttPacket::PingReq(MqttPingReq), 2)
        );
    }

    #[test]
    fn test_pingreq_nonzero_length() {
        match MqttPingReq::from_bytes(&[0xC0, 0x01, 0x00]) {
            Err(ParseError::ParseError(msg)) if msg.contains("remaining length of 0") => {}
            other => panic!("Expected length error, got {:?}", other),
        }
    }
}
