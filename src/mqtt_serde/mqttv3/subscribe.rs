// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    parse_fixed_header, parse_packet_id, parse_utf8_string, FixedHeader, ParseError, ParseOk,
};
use crate::mqtt_serde::{check_packet_id, check_qos, check_topic_filter, encode_utf8_string};

// MQTT-3.8.1-1
const SUBSCRIBE_FLAGS: u8 = 0x02;

/// A single topic filter and its requested QoS.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct SubscriptionTopic {
    pub topic_filter: String,
    pub qos: u8,
}

impl SubscriptionTopic {
    pub fn new(topic_filter: impl Into<String>, qos: u8) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
        }
    }
}

/// Represents the SUBSCRIBE packet in MQTT v3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttSubscribe {
    pub packet_id: u16,
    pub subscriptions: Vec<SubscriptionTopic>,
}

impl MqttSubscribe {
    pub fn new(packet_id: u16, subscriptions: Vec<SubscriptionTopic>) -> Self {
        Self {
            packet_id,
            subscriptions,
        }
    }
}

impl MqttControlPacket for MqttSubscribe {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBSCRIBE as u8
    }

    fn flags(&self) -> u8 {
        SUBSCRIBE_FLAGS
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(TwoByteInteger::encode(check_packet_id(self.packet_id)?).to_vec())
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        // MQTT-3.8.3-3
        if self.subscriptions.is_empty() {
            return Err(ParseError::ParseError(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        let mut payload = Vec::new();
        for sub in &self.subscriptions {
            check_topic_filter(&sub.topic_filter)?;
            payload.extend(encode_utf8_string(&sub.topic_filter)?);
            payload.push(check_qos(sub.qos)?);
        }
        Ok(payload)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (header_len, total_len) = match parse_fixed_header(
            buffer,
            ControlPacketType::SUBSCRIBE as u8,
            Some(SUBSCRIBE_FLAGS),
            "SUBSCRIBE",
        )? {
            FixedHeader::Incomplete(hint) => return Ok(ParseOk::Continue(hint, 0)),
            FixedHeader::Complete(_, header_len, total_len) => (header_len, total_len),
        };
        let body = &buffer[header_len..total_len];

        let (packet_id, mut offset) = parse_packet_id(body)?;
        let mut subscriptions = Vec::new();
        while offset < body.len() {
            let (topic_filter, consumed) = parse_utf8_string(&body[offset..])?;
            offset += consumed;
            check_topic_filter(&topic_filter)?;

            let options = *body.get(offset).ok_or(ParseError::BufferTooShort)?;
            offset += 1;
            // MQTT-3.8.3-4: upper six bits are reserved
            if options & 0xFC != 0 {
                return Err(ParseError::ParseError(
                    "SUBSCRIBE requested QoS has reserved bits set".to_string(),
                ));
            }
            subscriptions.push(SubscriptionTopic::new(topic_filter, check_qos(options)?));
        }

        if subscriptions.is_empty() {
            return Err(ParseError::ParseError(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Subscribe(MqttSubscribe::new(packet_id, subscriptions)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_bytes() {
        let subscribe = MqttSubscribe::new(10, vec![SubscriptionTopic::new("a/+", 1)]);
        assert_eq!(
            subscribe.to_bytes().unwrap(),
            vec![0x82, 0x08, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'+', 0x01]
        );
    }

    #[test]
    fn test_subscribe_multiple_roundtrip() {
        let subscribe = MqttSubscribe::new(
            2,
            vec![
                SubscriptionTopic::new("sensors/#", 0),
                SubscriptionTopic::new("cmd/+/set", 2),
            ],
        );
        let bytes = subscribe.to_bytes().unwrap();
        match MqttSubscribe::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Subscribe(parsed), n) => {
                assert_eq!(n, bytes.len());
                assert_eq!(parsed, subscribe);
            }
            _ => panic!("Expected SUBSCRIBE packet"),
        }
    }

    #[test]
    fn test_subscribe_encoding_errors() {
        assert!(MqttSubscribe::new(1, vec![]).to_bytes().is_err());
        assert!(MqttSubscribe::new(0, vec![SubscriptionTopic::new("a", 0)])
            .to_bytes()
            .is_err());
        assert!(MqttSubscribe::new(1, vec![SubscriptionTopic::new("a/#/b", 0)])
            .to_bytes()
            .is_err());
        assert!(matches!(
            MqttSubscribe::new(1, vec![SubscriptionTopic::new("a", 3)]).to_bytes(),
            Err(ParseError::InvalidQoS(3))
        ));
    }

    #[test]
    fn test_subscribe_invalid_flags() {
        let bytes = vec![0x80, 0x06, 0x00, 0x01, 0x00, 0x01, b'a', 0x00];
        assert!(MqttSubscribe::from_bytes(&bytes).is_err());
    }
}
