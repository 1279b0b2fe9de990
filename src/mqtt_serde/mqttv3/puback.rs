// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::check_packet_id;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_packet_id_only, ParseError, ParseOk};

/// Represents the PUBACK packet in MQTT v3.1.1.
///
/// The PUBACK packet is the response to a PUBLISH packet with QoS level 1.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttPubAck {
    /// The Packet Identifier from the PUBLISH packet that is being acknowledged.
    pub packet_id: u16,
}

impl MqttPubAck {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl MqttControlPacket for MqttPubAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBACK as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(check_packet_id(self.packet_id)?.to_be_bytes().to_vec())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        Ok(
            match parse_packet_id_only(buffer, ControlPacketType::PUBACK as u8, 0x00, "PUBACK")? {
                Ok((packet_id, total_len)) => {
                    ParseOk::Packet(MqttPacket::PubAck(MqttPubAck::new(packet_id)), total_len)
                }
                Err(hint) => ParseOk::Continue(hint, 0),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_puback_serialization() {
        let bytes = MqttPubAck::new(1000).to_bytes().unwrap();
        // packet type + remaining length + packet id (0x03E8)
        assert_eq!(bytes, vec![0x40, 0x02, 0x03, 0xE8]);
    }

    #[test]
    fn test_puback_deserialization() {
        match MqttPubAck::from_bytes(&[0x40, 0x02, 0x03, 0xE8]).unwrap() {
            ParseOk::Packet(MqttPacket::PubAck(puback), consumed) => {
                assert_eq!(consumed, 4);
                assert_eq!(puback.packet_id, 1000);
            }
            _ => panic!("Expected PUBACK packet"),
        }
    }

    #[test]
    fn test_puback_invalid_flags() {
        match MqttPubAck::from_bytes(&[0x41, 0x02, 0x00, 0x01]) {
            Err(ParseError::ParseError(msg)) if msg.contains("invalid fixed header flags") => {}
            _ => panic!("Expected ParseError with flags message"),
        }
    }

    #[test]
    fn test_puback_invalid_remaining_length() {
        match MqttPubAck::from_bytes(&[0x40, 0x01, 0x01]) {
            Err(ParseError::ParseError(msg)) if msg.contains("remaining length of 2") => {}
            _ => panic!("Expected ParseError with remaining length message"),
        }
    }

    #[test]
    fn test_puback_zero_packet_id() {
        assert!(matches!(
            MqttPubAck::from_bytes(&[0x40, 0x02, 0x00, 0x00]),
            Err(ParseError::InvalidPacketId)
        ));
        assert!(MqttPubAck::new(0).to_bytes().is_err());
    }

    #[test]
    fn test_puback_incomplete_packet() {
        match MqttPubAck::from_bytes(&[0x40, 0x02, 0x01]) {
            Ok(ParseOk::Continue(needed, _)) => assert_eq!(needed, 1),
            other => panic!("Expected Continue, got {:?}", other),
        }
    }
}
