// SPDX-License-Identifier: MPL-2.0

use super::control_packet::MqttPacket;
use crate::mqtt_serde::base_data::{TwoByteInteger, Utf8String, VariableByteInteger};
use std::error::Error;
use std::fmt;

pub type ParserResult = Result<ParseOk, ParseError>;

// First byte of Fixed header
pub const FIXED_HDR_LEN: usize = 1;

/// Codec failure.
///
/// `More` and `BufferEmpty` only ever describe an incomplete fixed header and
/// are absorbed by [`MqttPacket::from_bytes`]; everything else means the
/// bytes are malformed (when decoding) or a field is out of bounds (when
/// encoding).
#[derive(Debug)]
pub enum ParseError {
    More(usize, String), // not enough data for processing, hint for how many more bytes are needed
    BufferEmpty,
    ParseError(String),
    Utf8Error(std::str::Utf8Error),
    StringTooLong,
    BufferTooShort,
    InvalidPacketType,
    InvalidQoS(u8),
    InvalidPacketId,
    InvalidTopic(String),
    RemainingLengthTooLarge(usize),
    InvalidVariableByteInteger,
}

impl ParseError {
    /// True when more bytes may turn the buffer into a valid packet.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::More(_, _) | ParseError::BufferEmpty)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::More(hint, msg) => write!(f, "More data needed ({} bytes): {}", hint, msg),
            ParseError::BufferEmpty => write!(f, "Buffer Empty"),
            ParseError::ParseError(msg) => write!(f, "Parse Error: {}", msg),
            ParseError::Utf8Error(e) => write!(f, "UTF-8 Error: {}", e),
            ParseError::StringTooLong => write!(f, "String Too Long"),
            ParseError::BufferTooShort => write!(f, "Buffer Too Short"),
            ParseError::InvalidPacketType => write!(f, "Invalid Packet Type"),
            ParseError::InvalidQoS(qos) => write!(f, "Invalid QoS level {}", qos),
            ParseError::InvalidPacketId => write!(f, "Invalid Packet Identifier"),
            ParseError::InvalidTopic(msg) => write!(f, "Invalid Topic: {}", msg),
            ParseError::RemainingLengthTooLarge(len) => {
                write!(f, "Remaining length {} exceeds 268435455", len)
            }
            ParseError::InvalidVariableByteInteger => write!(f, "Invalid Variable Byte Integer"),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::Utf8Error(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ParseOk {
    Continue(usize, usize),    // (hint, consumed)
    Packet(MqttPacket, usize), // (packet, consumed)
}

pub fn packet_type(buffer: &[u8]) -> Result<u8, ParseError> {
    if buffer.is_empty() {
        return Err(ParseError::BufferEmpty);
    }
    Ok(buffer[0] >> 4)
}

pub fn parse_remaining_length(buffer: &[u8]) -> Result<(usize, usize), ParseError> {
    VariableByteInteger::decode(buffer)
}

// 1.5.3 UTF-8 encoded strings
pub fn parse_utf8_string(buffer: &[u8]) -> Result<(String, usize), ParseError> {
    Utf8String::decode(buffer)
}

pub fn parse_packet_id(buffer: &[u8]) -> Result<(u16, usize), ParseError> {
    let (id, consumed) = TwoByteInteger::decode(buffer)?;
    if id == 0 {
        return Err(ParseError::InvalidPacketId);
    }
    Ok((id, consumed))
}

/// Result of reading the fixed header of a packet of a known type.
pub(crate) enum FixedHeader {
    /// The full packet is not buffered yet; the hint is how many bytes are missing.
    Incomplete(usize),
    /// `(flags, header_len, total_len)`.
    Complete(u8, usize, usize),
}

/// Checks the packet type nibble and reads the remaining length.
///
/// `expected_flags` is the mandatory flags nibble for packet types that fix it.
pub(crate) fn parse_fixed_header(
    buffer: &[u8],
    expected_type: u8,
    expected_flags: Option<u8>,
    name: &str,
) -> Result<FixedHeader, ParseError> {
    if packet_type(buffer)? != expected_type {
        return Err(ParseError::InvalidPacketType);
    }

    let flags = buffer[0] & 0x0F;
    if let Some(expected) = expected_flags {
        if flags != expected {
            return Err(ParseError::ParseError(format!(
                "{} packet has invalid fixed header flags",
                name
            )));
        }
    }

    let (size, vbi_len) = match parse_remaining_length(&buffer[FIXED_HDR_LEN..]) {
        Ok(v) => v,
        Err(ParseError::More(hint, _)) => return Ok(FixedHeader::Incomplete(hint)),
        Err(e) => return Err(e),
    };
    let header_len = FIXED_HDR_LEN + vbi_len;
    let total_len = header_len + size;
    if total_len > buffer.len() {
        return Ok(FixedHeader::Incomplete(total_len - buffer.len()));
    }
    Ok(FixedHeader::Complete(flags, header_len, total_len))
}

/// Decodes the packets whose whole variable header is a single packet identifier
/// (PUBACK, PUBREC, PUBREL, PUBCOMP, UNSUBACK).
pub(crate) fn parse_packet_id_only(
    buffer: &[u8],
    expected_type: u8,
    expected_flags: u8,
    name: &str,
) -> Result<Result<(u16, usize), usize>, ParseError> {
    match parse_fixed_header(buffer, expected_type, Some(expected_flags), name)? {
        FixedHeader::Incomplete(hint) => Ok(Err(hint)),
        FixedHeader::Complete(_, header_len, total_len) => {
            if total_len - header_len != 2 {
                return Err(ParseError::ParseError(format!(
                    "{} packet must have a remaining length of 2",
                    name
                )));
            }
            let (packet_id, _) = parse_packet_id(&buffer[header_len..total_len])?;
            Ok(Ok((packet_id, total_len)))
        }
    }
}

/// Decodes the header-only packets (PINGREQ, PINGRESP, DISCONNECT).
pub(crate) fn parse_empty_packet(
    buffer: &[u8],
    expected_type: u8,
    name: &str,
) -> Result<Result<usize, usize>, ParseError> {
    match parse_fixed_header(buffer, expected_type, Some(0x00), name)? {
        FixedHeader::Incomplete(hint) => Ok(Err(hint)),
        FixedHeader::Complete(_, header_len, total_len) => {
            if total_len != header_len {
                return Err(ParseError::ParseError(format!(
                    "{} packet must have a remaining length of 0",
                    name
                )));
            }
            Ok(Ok(total_len))
        }
    }
}

pub mod stream;
