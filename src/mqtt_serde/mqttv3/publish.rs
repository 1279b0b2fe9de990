// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    parse_fixed_header, parse_packet_id, parse_utf8_string, FixedHeader, ParseError, ParseOk,
};
use crate::mqtt_serde::{check_packet_id, check_qos, check_topic_name, encode_utf8_string};

/// Represents the PUBLISH packet in MQTT v3.1.1.
///
/// A PUBLISH packet is sent from a Client to a Server or from a Server to a Client
/// to transport an application message.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttPublish {
    pub dup: bool,
    pub qos: u8,
    pub retain: bool,
    pub topic_name: String,
    /// Packet Identifier is only present for QoS levels 1 and 2.
    pub packet_id: Option<u16>,
    pub payload: Vec<u8>,
}

impl MqttPublish {
    pub fn new(
        topic_name: String,
        qos: u8,
        payload: Vec<u8>,
        packet_id: Option<u16>,
        retain: bool,
        dup: bool,
    ) -> Self {
        Self {
            dup,
            qos,
            retain,
            topic_name,
            packet_id,
            payload,
        }
    }
}

impl MqttControlPacket for MqttPublish {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBLISH as u8
    }

    fn flags(&self) -> u8 {
        ((self.dup as u8) << 3) | (self.qos << 1) | (self.retain as u8)
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        check_qos(self.qos)?;
        check_topic_name(&self.topic_name)?;
        if self.qos == 0 && self.dup {
            return Err(ParseError::ParseError(
                "DUP flag must be 0 for QoS 0".to_string(),
            ));
        }

        let mut vh = encode_utf8_string(&self.topic_name)?;
        if self.qos > 0 {
            let packet_id = self.packet_id.ok_or(ParseError::InvalidPacketId)?;
            vh.extend_from_slice(&TwoByteInteger::encode(check_packet_id(packet_id)?));
        }
        Ok(vh)
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        Ok(self.payload.clone())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, header_len, total_len) = match parse_fixed_header(
            buffer,
            ControlPacketType::PUBLISH as u8,
            None,
            "PUBLISH",
        )? {
            FixedHeader::Incomplete(hint) => return Ok(ParseOk::Continue(hint, 0)),
            FixedHeader::Complete(flags, header_len, total_len) => (flags, header_len, total_len),
        };

        let dup = flags & 0x08 != 0;
        let qos = check_qos((flags & 0x06) >> 1)?;
        let retain = flags & 0x01 != 0;
        if qos == 0 && dup {
            return Err(ParseError::ParseError(
                "DUP flag must be 0 for QoS 0".to_string(),
            ));
        }

        let body = &buffer[header_len..total_len];
        let (topic_name, mut offset) = parse_utf8_string(body)?;
        check_topic_name(&topic_name)?;

        let packet_id = if qos > 0 {
            let (id, consumed) = parse_packet_id(&body[offset..])?;
            offset += consumed;
            Some(id)
        } else {
            None
        };

        Ok(ParseOk::Packet(
            MqttPacket::Publish(MqttPublish {
                dup,
                qos,
                retain,
                topic_name,
                packet_id,
                payload: body[offset..].to_vec(),
            }),
            total_len,
        ))
    }
}
