// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::{BinaryData, TwoByteInteger};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    parse_fixed_header, parse_utf8_string, FixedHeader, ParseError, ParseOk,
};
use crate::mqtt_serde::{check_qos, check_topic_name, encode_binary_data, encode_utf8_string};

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_QOS: u8 = 0x18;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Last Will and Testament carried in CONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Will {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

impl Will {
    pub fn new(topic: impl Into<String>, message: impl Into<Vec<u8>>, qos: u8, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            qos,
            retain,
        }
    }
}

/// Represents the CONNECT packet in MQTT v3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MqttConnect {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl MqttConnect {
    pub fn new(client_id: String, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            clean_session,
            keep_alive,
            client_id,
            will: None,
            username: None,
            password: None,
        }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            flags |= FLAG_WILL | (will.qos << 3);
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }
}

impl MqttControlPacket for MqttConnect {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNECT as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        if let Some(will) = &self.will {
            check_qos(will.qos)?;
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ParseError::ParseError(
                "Password flag requires username flag".to_string(),
            ));
        }

        let mut vh = encode_utf8_string(PROTOCOL_NAME)?;
        vh.push(PROTOCOL_LEVEL);
        vh.push(self.connect_flags());
        vh.extend_from_slice(&TwoByteInteger::encode(self.keep_alive));
        Ok(vh)
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        if self.client_id.is_empty() && !self.clean_session {
            return Err(ParseError::ParseError(
                "empty client identifier requires clean session".to_string(),
            ));
        }

        let mut payload = encode_utf8_string(&self.client_id)?;
        if let Some(will) = &self.will {
            check_topic_name(&will.topic)?;
            payload.extend(encode_utf8_string(&will.topic)?);
            payload.extend(encode_binary_data(&will.message)?);
        }
        if let Some(username) = &self.username {
            payload.extend(encode_utf8_string(username)?);
        }
        if let Some(password) = &self.password {
            payload.extend(encode_binary_data(password)?);
        }
        Ok(payload)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (header_len, total_len) = match parse_fixed_header(
            buffer,
            ControlPacketType::CONNECT as u8,
            Some(0x00),
            "CONNECT",
        )? {
            FixedHeader::Incomplete(hint) => return Ok(ParseOk::Continue(hint, 0)),
            FixedHeader::Complete(_, header_len, total_len) => (header_len, total_len),
        };
        let body = &buffer[header_len..total_len];

        let (proto_name, mut offset) = parse_utf8_string(body)?;
        if proto_name != PROTOCOL_NAME {
            return Err(ParseError::ParseError("Invalid protocol name".to_string()));
        }

        if body.len() < offset + 4 {
            return Err(ParseError::BufferTooShort);
        }
        if body[offset] != PROTOCOL_LEVEL {
            return Err(ParseError::ParseError(format!(
                "Unsupported protocol level {}",
                body[offset]
            )));
        }
        let flags = body[offset + 1];
        let (keep_alive, _) = TwoByteInteger::decode(&body[offset + 2..])?;
        offset += 4;

        if flags & 0x01 != 0 {
            return Err(ParseError::ParseError(
                "CONNECT reserved flag bit is not 0".to_string(),
            ));
        }
        let will_flag = flags & FLAG_WILL != 0;
        let will_qos = (flags & FLAG_WILL_QOS) >> 3;
        let will_retain = flags & FLAG_WILL_RETAIN != 0;
        let username_flag = flags & FLAG_USERNAME != 0;
        let password_flag = flags & FLAG_PASSWORD != 0;

        if !will_flag && (will_qos != 0 || will_retain) {
            return Err(ParseError::ParseError(
                "Will QoS and Will Retain must be 0 without Will Flag".to_string(),
            ));
        }
        check_qos(will_qos)?;
        if password_flag && !username_flag {
            return Err(ParseError::ParseError(
                "Password flag requires username flag".to_string(),
            ));
        }

        let (client_id, consumed) = parse_utf8_string(&body[offset..])?;
        offset += consumed;

        let will = if will_flag {
            let (topic, consumed) = parse_utf8_string(&body[offset..])?;
            offset += consumed;
            let (message, consumed) = BinaryData::decode(&body[offset..])?;
            offset += consumed;
            Some(Will {
                topic,
                message,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };

        let username = if username_flag {
            let (u, consumed) = parse_utf8_string(&body[offset..])?;
            offset += consumed;
            Some(u)
        } else {
            None
        };

        let password = if password_flag {
            let (p, consumed) = BinaryData::decode(&body[offset..])?;
            offset += consumed;
            Some(p)
        } else {
            None
        };

        if offset != body.len() {
            return Err(ParseError::ParseError(
                "CONNECT packet has trailing bytes".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Connect(MqttConnect {
                clean_session: flags & FLAG_CLEAN_SESSION != 0,
                keep_alive,
                client_id,
                will,
                username,
                password,
            }),
            total_len,
        ))
    }
}
