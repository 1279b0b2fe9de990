// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::check_packet_id;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    parse_fixed_header, parse_packet_id, FixedHeader, ParseError, ParseOk,
};

/// SUBACK return code for a rejected filter.
pub const SUBSCRIPTION_FAILURE: u8 = 0x80;

/// Represents the SUBACK packet in MQTT v3.1.1.
///
/// One return code per filter of the SUBSCRIBE, in the same order: the
/// granted QoS (0, 1, 2) or `0x80` for failure.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttSubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl MqttSubAck {
    pub fn new(packet_id: u16, return_codes: Vec<u8>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }
}

fn valid_return_code(code: u8) -> bool {
    matches!(code, 0x00 | 0x01 | 0x02 | SUBSCRIPTION_FAILURE)
}

impl MqttControlPacket for MqttSubAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBACK as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(TwoByteInteger::encode(check_packet_id(self.packet_id)?).to_vec())
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        if let Some(code) = self.return_codes.iter().find(|c| !valid_return_code(**c)) {
            return Err(ParseError::ParseError(format!(
                "invalid SUBACK return code 0x{:02X}",
                code
            )));
        }
        Ok(self.return_codes.clone())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (header_len, total_len) = match parse_fixed_header(
            buffer,
            ControlPacketType::SUBACK as u8,
            Some(0x00),
            "SUBACK",
        )? {
            FixedHeader::Incomplete(hint) => return Ok(ParseOk::Continue(hint, 0)),
            FixedHeader::Complete(_, header_len, total_len) => (header_len, total_len),
        };
        let body = &buffer[header_len..total_len];

        let (packet_id, offset) = parse_packet_id(body)?;
        let return_codes = body[offset..].to_vec();
        if return_codes.is_empty() {
            return Err(ParseError::ParseError(
                "SUBACK must contain at least one return code".to_string(),
            ));
        }
        if let Some(code) = return_codes.iter().find(|c| !valid_return_code(**c)) {
            return Err(ParseError::ParseError(format!(
                "invalid SUBACK return code 0x{:02X}",
                code
            )));
        }

        Ok(ParseOk::Packet(
            MqttPacket::SubAck(MqttSubAck::new(packet_id, return_codes)),
            total_len,
        ))
    }
}
