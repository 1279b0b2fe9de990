// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    parse_fixed_header, parse_packet_id, parse_utf8_string, FixedHeader, ParseError, ParseOk,
};
use crate::mqtt_serde::{check_packet_id, check_topic_filter, encode_utf8_string};

const UNSUBSCRIBE_FLAGS: u8 = 0x02;

/// Represents the UNSUBSCRIBE packet in MQTT v3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttUnsubscribe {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
}

impl MqttUnsubscribe {
    pub fn new(packet_id: u16, topic_filters: Vec<String>) -> Self {
        Self {
            packet_id,
            topic_filters,
        }
    }
}

impl MqttControlPacket for MqttUnsubscribe {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::UNSUBSCRIBE as u8
    }

    fn flags(&self) -> u8 {
        UNSUBSCRIBE_FLAGS
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(TwoByteInteger::encode(check_packet_id(self.packet_id)?).to_vec())
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        // MQTT-3.10.3-2
        if self.topic_filters.is_empty() {
            return Err(ParseError::ParseError(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        let mut payload = Vec::new();
        for filter in &self.topic_filters {
            check_topic_filter(filter)?;
            payload.extend(encode_utf8_string(filter)?);
        }
        Ok(payload)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (header_len, total_len) = match parse_fixed_header(
            buffer,
            ControlPacketType::UNSUBSCRIBE as u8,
            Some(UNSUBSCRIBE_FLAGS),
            "UNSUBSCRIBE",
        )? {
            FixedHeader::Incomplete(hint) => return Ok(ParseOk::Continue(hint, 0)),
            FixedHeader::Complete(_, header_len, total_len) => (header_len, total_len),
        };
        let body = &buffer[header_len..total_len];

        let (packet_id, mut offset) = parse_packet_id(body)?;
        let mut topic_filters = Vec::new();
        while offset < body.len() {
            let (filter, consumed) = parse_utf8_string(&body[offset..])?;
            offset += consumed;
            check_topic_filter(&filter)?;
            topic_filters.push(filter);
        }
        if topic_filters.is_empty() {
            return Err(ParseError::ParseError(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Unsubscribe(MqttUnsubscribe::new(packet_id, topic_filters)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_bytes() {
        let unsubscribe = MqttUnsubscribe::new(5, vec!["a/b".to_string()]);
        assert_eq!(
            unsubscribe.to_bytes().unwrap(),
            vec![0xA2, 0x07, 0x00, 0x05, 0x00, 0x03, b'a', b'/', b'b']
        );
    }

    #[test]
    fn test_unsubscribe_roundtrip() {
        let unsubscribe =
            MqttUnsubscribe::new(900, vec!["sensors/#".to_string(), "x/+/y".to_string()]);
        let bytes = unsubscribe.to_bytes().unwrap();
        match MqttUnsubscribe::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Unsubscribe(parsed), _) => assert_eq!(parsed, unsubscribe),
            _ => panic!("Expected UNSUBSCRIBE packet"),
        }
    }

    #[test]
    fn test_unsubscribe_empty_rejected() {
        assert!(MqttUnsubscribe::new(1, vec![]).to_bytes().is_err());
    }
}
