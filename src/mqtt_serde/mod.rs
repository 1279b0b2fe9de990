// SPDX-License-Identifier: MPL-2.0

//! MQTT 3.1.1 wire codec.
//!
//! Every control packet is a plain struct implementing [`MqttControlPacket`];
//! [`MqttPacket`] is the tagged union used by the engine. Decoding never
//! consumes a partial packet: an incomplete buffer yields
//! [`ParseOk::Continue`] and [`MqttParser`] keeps the bytes until the rest
//! arrives.
//!
//! [`MqttControlPacket`]: control_packet::MqttControlPacket
//! [`MqttPacket`]: control_packet::MqttPacket
//! [`ParseOk::Continue`]: parser::ParseOk::Continue

pub mod base_data;
pub mod control_packet;
pub mod mqttv3;
pub mod parser;

use crate::mqtt_serde::base_data::{
    BinaryData, Utf8String, VariableByteInteger, MAX_REMAINING_LENGTH,
};
use crate::mqtt_serde::parser::ParseError;
use crate::mqtt_topic::{validate_topic_filter, validate_topic_name};

//re export
pub use crate::mqtt_serde::control_packet::{MqttControlPacket, MqttPacket};
pub use crate::mqtt_serde::parser::stream::MqttParser;
pub use crate::mqtt_serde::parser::{ParseError as CodecError, ParseOk};

pub(crate) fn encode_binary_data(data: &[u8]) -> Result<Vec<u8>, ParseError> {
    BinaryData::encode(data)
}

pub(crate) fn encode_utf8_string(s: &str) -> Result<Vec<u8>, ParseError> {
    Utf8String::encode(s)
}

pub(crate) fn encode_variable_length(len: usize) -> Result<Vec<u8>, ParseError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ParseError::RemainingLengthTooLarge(len));
    }
    Ok(VariableByteInteger::encode(len as u32))
}

pub(crate) fn check_qos(qos: u8) -> Result<u8, ParseError> {
    if qos > 2 {
        return Err(ParseError::InvalidQoS(qos));
    }
    Ok(qos)
}

pub(crate) fn check_packet_id(packet_id: u16) -> Result<u16, ParseError> {
    if packet_id == 0 {
        return Err(ParseError::InvalidPacketId);
    }
    Ok(packet_id)
}

pub(crate) fn check_topic_name(topic: &str) -> Result<(), ParseError> {
    validate_topic_name(topic).map_err(|e| ParseError::InvalidTopic(e.to_string()))
}

pub(crate) fn check_topic_filter(filter: &str) -> Result<(), ParseError> {
    validate_topic_filter(filter).map_err(|e| ParseError::InvalidTopic(e.to_string()))
}
