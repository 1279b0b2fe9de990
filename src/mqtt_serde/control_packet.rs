// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use super::encode_variable_length;
use super::parser::packet_type;
use super::parser::{ParseError, ParseOk};

use crate::mqtt_serde::mqttv3::*;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MqttPacket {
    Connect(connect::MqttConnect),
    ConnAck(connack::MqttConnAck),
    Publish(publish::MqttPublish),
    PubAck(puback::MqttPubAck),
    PubRec(pubrec::MqttPubRec),
    PubRel(pubrel::MqttPubRel),
    PubComp(pubcomp::MqttPubComp),
    Subscribe(subscribe::MqttSubscribe),
    SubAck(suback::MqttSubAck),
    Unsubscribe(unsubscribe::MqttUnsubscribe),
    UnsubAck(unsuback::MqttUnsubAck),
    PingReq(pingreq::MqttPingReq),
    PingResp(pingresp::MqttPingResp),
    Disconnect(disconnect::MqttDisconnect),
}

impl MqttPacket {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        match self {
            MqttPacket::Connect(p) => p.to_bytes(),
            MqttPacket::ConnAck(p) => p.to_bytes(),
            MqttPacket::Publish(p) => p.to_bytes(),
            MqttPacket::PubAck(p) => p.to_bytes(),
            MqttPacket::PubRec(p) => p.to_bytes(),
            MqttPacket::PubRel(p) => p.to_bytes(),
            MqttPacket::PubComp(p) => p.to_bytes(),
            MqttPacket::Subscribe(p) => p.to_bytes(),
            MqttPacket::SubAck(p) => p.to_bytes(),
            MqttPacket::Unsubscribe(p) => p.to_bytes(),
            MqttPacket::UnsubAck(p) => p.to_bytes(),
            MqttPacket::PingReq(p) => p.to_bytes(),
            MqttPacket::PingResp(p) => p.to_bytes(),
            MqttPacket::Disconnect(p) => p.to_bytes(),
        }
    }

    /// Decodes the first packet in `buffer`.
    ///
    /// An empty buffer or a partially received fixed header is reported as
    /// `ParseOk::Continue`, never as an error.
    pub fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let packet_type_byte = match packet_type(buffer) {
            Ok(t) => t,
            Err(e) if e.is_incomplete() => return Ok(ParseOk::Continue(1, 0)),
            Err(e) => return Err(e),
        };
        let packet_type = ControlPacketType::try_from(packet_type_byte)?;

        let res = match packet_type {
            ControlPacketType::CONNECT => connect::MqttConnect::from_bytes(buffer),
            ControlPacketType::CONNACK => connack::MqttConnAck::from_bytes(buffer),
            ControlPacketType::PUBLISH => publish::MqttPublish::from_bytes(buffer),
            ControlPacketType::PUBACK => puback::MqttPubAck::from_bytes(buffer),
            ControlPacketType::PUBREC => pubrec::MqttPubRec::from_bytes(buffer),
            ControlPacketType::PUBREL => pubrel::MqttPubRel::from_bytes(buffer),
            ControlPacketType::PUBCOMP => pubcomp::MqttPubComp::from_bytes(buffer),
            ControlPacketType::SUBSCRIBE => subscribe::MqttSubscribe::from_bytes(buffer),
            ControlPacketType::SUBACK => suback::MqttSubAck::from_bytes(buffer),
            ControlPacketType::UNSUBSCRIBE => unsubscribe::MqttUnsubscribe::from_bytes(buffer),
            ControlPacketType::UNSUBACK => unsuback::MqttUnsubAck::from_bytes(buffer),
            ControlPacketType::PINGREQ => pingreq::MqttPingReq::from_bytes(buffer),
            ControlPacketType::PINGRESP => pingresp::MqttPingResp::from_bytes(buffer),
            ControlPacketType::DISCONNECT => disconnect::MqttDisconnect::from_bytes(buffer),
        };

        match res {
            Err(e) if e.is_incomplete() => Ok(ParseOk::Continue(1, 0)),
            other => other,
        }
    }

    pub fn packet_type(&self) -> ControlPacketType {
        match self {
            MqttPacket::Connect(_) => ControlPacketType::CONNECT,
            MqttPacket::ConnAck(_) => ControlPacketType::CONNACK,
            MqttPacket::Publish(_) => ControlPacketType::PUBLISH,
            MqttPacket::PubAck(_) => ControlPacketType::PUBACK,
            MqttPacket::PubRec(_) => ControlPacketType::PUBREC,
            MqttPacket::PubRel(_) => ControlPacketType::PUBREL,
            MqttPacket::PubComp(_) => ControlPacketType::PUBCOMP,
            MqttPacket::Subscribe(_) => ControlPacketType::SUBSCRIBE,
            MqttPacket::SubAck(_) => ControlPacketType::SUBACK,
            MqttPacket::Unsubscribe(_) => ControlPacketType::UNSUBSCRIBE,
            MqttPacket::UnsubAck(_) => ControlPacketType::UNSUBACK,
            MqttPacket::PingReq(_) => ControlPacketType::PINGREQ,
            MqttPacket::PingResp(_) => ControlPacketType::PINGRESP,
            MqttPacket::Disconnect(_) => ControlPacketType::DISCONNECT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPacketType {
    CONNECT = 1,
    CONNACK = 2,
    PUBLISH = 3,
    PUBACK = 4,
    PUBREC = 5,
    PUBREL = 6,
    PUBCOMP = 7,
    SUBSCRIBE = 8,
    SUBACK = 9,
    UNSUBSCRIBE = 10,
    UNSUBACK = 11,
    PINGREQ = 12,
    PINGRESP = 13,
    DISCONNECT = 14,
}

impl TryFrom<u8> for ControlPacketType {
    type Error = ParseError;

    // 0 and 15 are reserved in 3.1.1
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ControlPacketType::CONNECT),
            2 => Ok(ControlPacketType::CONNACK),
            3 => Ok(ControlPacketType::PUBLISH),
            4 => Ok(ControlPacketType::PUBACK),
            5 => Ok(ControlPacketType::PUBREC),
            6 => Ok(ControlPacketType::PUBREL),
            7 => Ok(ControlPacketType::PUBCOMP),
            8 => Ok(ControlPacketType::SUBSCRIBE),
            9 => Ok(ControlPacketType::SUBACK),
            10 => Ok(ControlPacketType::UNSUBSCRIBE),
            11 => Ok(ControlPacketType::UNSUBACK),
            12 => Ok(ControlPacketType::PINGREQ),
            13 => Ok(ControlPacketType::PINGRESP),
            14 => Ok(ControlPacketType::DISCONNECT),
            _ => Err(ParseError::InvalidPacketType),
        }
    }
}

pub trait MqttControlPacket {
    // MQTT 3.1.1: 2.2.1, MQTT control packet type
    fn control_packet_type(&self) -> u8;

    // MQTT 3.1.1: 2.2.2, Flags in the fixed header
    fn flags(&self) -> u8 {
        0u8
    }

    // Constructs the fixed header: type and flags, then the remaining length.
    fn fixed_header(&self, len: usize) -> Result<Vec<u8>, ParseError> {
        let byte1: u8 = (self.control_packet_type() << 4) | self.flags();
        let mut hdr = vec![byte1];
        hdr.extend(encode_variable_length(len)?);
        Ok(hdr)
    }

    // return variable header
    fn variable_header(&self) -> Result<Vec<u8>, ParseError>;

    // return payload
    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    // decoder
    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError>;

    // encoder
    fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        let vhdr = self.variable_header()?;
        let payload = self.payload()?;
        let remaining_length = vhdr.len() + payload.len();
        let mut bytes = self.fixed_header(remaining_length)?;
        bytes.reserve(remaining_length);
        bytes.extend(vhdr);
        bytes.extend(payload);
        Ok(bytes)
    }
}
