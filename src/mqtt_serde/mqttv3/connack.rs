// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_fixed_header, FixedHeader, ParseError, ParseOk};

/// CONNACK return codes (MQTT 3.1.1, 3.2.2.3).
pub const CONNECTION_ACCEPTED: u8 = 0x00;

/// Represents the CONNACK packet in MQTT v3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl MqttConnAck {
    pub fn new(session_present: bool, return_code: u8) -> Self {
        Self {
            session_present,
            return_code,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.return_code == CONNECTION_ACCEPTED
    }

    /// Human readable text for the return code.
    pub fn describe(return_code: u8) -> &'static str {
        match return_code {
            0x00 => "Connection Accepted",
            0x01 => "Connection Refused, unacceptable protocol version",
            0x02 => "Connection Refused, identifier rejected",
            0x03 => "Connection Refused, Server unavailable",
            0x04 => "Connection Refused, bad user name or password",
            0x05 => "Connection Refused, not authorized",
            _ => "Connection Refused, unknown return code",
        }
    }
}

impl MqttControlPacket for MqttConnAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNACK as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(vec![self.session_present as u8, self.return_code])
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (header_len, total_len) = match parse_fixed_header(
            buffer,
            ControlPacketType::CONNACK as u8,
            Some(0x00),
            "CONNACK",
        )? {
            FixedHeader::Incomplete(hint) => return Ok(ParseOk::Continue(hint, 0)),
            FixedHeader::Complete(_, header_len, total_len) => (header_len, total_len),
        };

        if total_len - header_len != 2 {
            return Err(ParseError::ParseError(
                "CONNACK packet must have a remaining length of 2".to_string(),
            ));
        }

        let ack_flags = buffer[header_len];
        if ack_flags & 0xFE != 0 {
            return Err(ParseError::ParseError(
                "CONNACK reserved acknowledge flags are not 0".to_string(),
            ));
        }
        let return_code = buffer[header_len + 1];
        // MQTT-3.2.2-4
        if return_code != CONNECTION_ACCEPTED && ack_flags != 0 {
            return Err(ParseError::ParseError(
                "CONNACK session present must be 0 on refusal".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::ConnAck(MqttConnAck::new(ack_flags == 1, return_code)),
            total_len,
        ))
    }
}
