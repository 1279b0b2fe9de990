// SPDX-License-Identifier: MPL-2.0

use crate::mqtt_serde::control_packet::MqttPacket;
use crate::mqtt_serde::parser::{ParseError, ParseOk};
use bytes::{Buf, BytesMut};

/// A stateful parser for a stream of MQTT data.
/// It internally buffers data from a stream and yields complete packets.
#[derive(Debug)]
pub struct MqttParser {
    buffer: BytesMut,
}

impl Default for MqttParser {
    fn default() -> Self {
        Self::new(16384)
    }
}

impl MqttParser {
    /// Creates a new, empty parser.
    pub fn new(buffer_size: usize) -> Self {
        MqttParser {
            buffer: BytesMut::with_capacity(buffer_size),
        }
    }

    /// Appends new data from the stream to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to parse a single MQTT packet from the internal buffer.
    ///
    /// - If a full packet is available, it returns `Ok(Some(MqttPacket))`,
    ///   and the corresponding bytes are removed from the buffer.
    /// - If the buffer does not contain a full packet, it returns `Ok(None)`.
    /// - If the data in the buffer is malformed, it returns `Err(ParseError)`.
    ///   The buffer is left untouched; the connection is expected to be torn
    ///   down and the parser [`reset`](Self::reset).
    pub fn next_packet(&mut self) -> Result<Option<MqttPacket>, ParseError> {
        match MqttPacket::from_bytes(&self.buffer)? {
            ParseOk::Packet(packet, consumed) => {
                self.buffer.advance(consumed);
                Ok(Some(packet))
            }
            ParseOk::Continue(_, _) => Ok(None),
        }
    }

    /// Bytes buffered but not yet returned as a packet.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drops any buffered bytes, used when a new connection starts.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_serde::control_packet::MqttControlPacket;
    use crate::mqtt_serde::mqttv3::{MqttPubAck, MqttPublish};

    #[test]
    fn test_byte_by_byte_feed() {
        let publish = MqttPublish::new("a/b".to_string(), 1, b"hello".to_vec(), Some(9), false, false);
        let bytes = publish.to_bytes().unwrap();

        let mut parser = MqttParser::default();
        for (i, b) in bytes.iter().enumerate() {
            parser.feed(&[*b]);
            let res = parser.next_packet().unwrap();
            if i + 1 < bytes.len() {
                assert!(res.is_none());
            } else {
                assert_eq!(res, Some(MqttPacket::Publish(publish.clone())));
            }
        }
        assert!(parser.buffered().is_empty());
    }

    #[test]
    fn test_multiple_packets_in_one_read_preserve_order() {
        let mut data = MqttPubAck::new(1).to_bytes().unwrap();
        data.extend(MqttPubAck::new(2).to_bytes().unwrap());
        data.extend(&MqttPubAck::new(3).to_bytes().unwrap()[..2]);

        let mut parser = MqttParser::new(64);
        parser.feed(&data);
        assert_eq!(parser.next_packet().unwrap(), Some(MqttPacket::PubAck(MqttPubAck::new(1))));
        assert_eq!(parser.next_packet().unwrap(), Some(MqttPacket::PubAck(MqttPubAck::new(2))));
        assert_eq!(parser.next_packet().unwrap(), None);
        assert_eq!(parser.buffered().len(), 2);

        parser.feed(&[0x00, 0x03]);
        assert_eq!(parser.next_packet().unwrap(), Some(MqttPacket::PubAck(MqttPubAck::new(3))));
    }

    #[test]
    fn test_malformed_input_reports_error() {
        let mut parser = MqttParser::default();
        parser.feed(&[0x40, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(parser.next_packet().is_err());
        parser.reset();
        assert!(parser.buffered().is_empty());
        assert_eq!(parser.next_packet().unwrap(), None);
    }
}
