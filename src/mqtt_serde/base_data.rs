// SPDX-License-Identifier: MPL-2.0

use crate::mqtt_serde::parser::ParseError;

/// Largest value a remaining length field can carry (MQTT 3.1.1, 2.2.3).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

pub struct TwoByteInteger;

impl TwoByteInteger {
    pub fn encode(val: u16) -> [u8; 2] {
        val.to_be_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<(u16, usize), ParseError> {
        if bytes.len() < 2 {
            return Err(ParseError::BufferTooShort);
        }
        Ok((u16::from_be_bytes([bytes[0], bytes[1]]), 2))
    }
}

pub struct VariableByteInteger;

impl VariableByteInteger {
    pub fn encode(val: u32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4);
        let mut num = val;
        loop {
            let mut byte = (num % 128) as u8;
            num /= 128;
            if num > 0 {
                byte |= 128;
            }
            bytes.push(byte);
            if num == 0 {
                break;
            }
        }
        bytes
    }

    /// Decodes a remaining length field.
    ///
    /// Returns `ParseError::More` while the field itself is incomplete, so the
    /// caller can wait for another read. A continuation bit on the fourth byte
    /// and any non-minimal encoding are rejected as malformed.
    pub fn decode(buffer: &[u8]) -> Result<(usize, usize), ParseError> {
        let mut multiplier: usize = 1;
        let mut value: usize = 0;
        let mut i: usize = 0;

        loop {
            let byte = *buffer.get(i).ok_or(ParseError::More(
                1,
                "vbi: not enough bytes for remaining length".to_string(),
            ))?;

            if byte > 127 && i == 3 {
                return Err(ParseError::InvalidVariableByteInteger);
            }

            value += (byte & 127) as usize * multiplier;
            multiplier *= 128;
            i += 1;

            if byte & 128 == 0 {
                break;
            }
        }

        // 0x80 0x00 decodes to 0 but takes two bytes; the last byte of a
        // multi-byte encoding must carry data.
        if i > 1 && buffer[i - 1] == 0 {
            return Err(ParseError::ParseError(
                "remaining length encoding is not minimal".to_string(),
            ));
        }

        Ok((value, i))
    }
}

pub struct BinaryData;

impl BinaryData {
    pub fn encode(data: &[u8]) -> Result<Vec<u8>, ParseError> {
        if data.len() > u16::MAX as usize {
            return Err(ParseError::StringTooLong);
        }
        let mut bytes = Vec::with_capacity(2 + data.len());
        bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
        bytes.extend_from_slice(data);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
        let (len, _) = TwoByteInteger::decode(bytes)?;
        let end = 2 + len as usize;
        if bytes.len() < end {
            return Err(ParseError::BufferTooShort);
        }
        Ok((bytes[2..end].to_vec(), end))
    }
}

pub struct Utf8String;

impl Utf8String {
    pub fn encode(s: &str) -> Result<Vec<u8>, ParseError> {
        if s.contains('\u{0000}') {
            return Err(ParseError::ParseError(
                "UTF-8 string contains null character (U+0000)".to_string(),
            ));
        }
        BinaryData::encode(s.as_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<(String, usize), ParseError> {
        let (len, _) = TwoByteInteger::decode(bytes)?;
        let end = 2 + len as usize;
        if bytes.len() < end {
            return Err(ParseError::BufferTooShort);
        }
        let s = std::str::from_utf8(&bytes[2..end]).map_err(ParseError::Utf8Error)?;
        // MQTT-1.5.3-2
        if s.contains('\u{0000}') {
            return Err(ParseError::ParseError(
                "UTF-8 string contains null character (U+0000)".to_string(),
            ));
        }
        Ok((s.to_string(), end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_byte_integer() {
        assert_eq!(TwoByteInteger::encode(0x1234), [0x12, 0x34]);
        assert_eq!(TwoByteInteger::decode(&[0x12, 0x34]).unwrap(), (0x1234, 2));
        assert!(matches!(
            TwoByteInteger::decode(&[0x12]),
            Err(ParseError::BufferTooShort)
        ));
    }

    #[test]
    fn test_variable_byte_integer_boundaries() {
        let cases: [(u32, &[u8]); 8] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
            (2_097_151, &[0xFF, 0xFF, 0x7F]),
            (2_097_152, &[0x80, 0x80, 0x80, 0x01]),
            (268_435_455, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (value, encoded) in cases {
            assert_eq!(VariableByteInteger::encode(value), encoded.to_vec());
            assert_eq!(
                VariableByteInteger::decode(encoded).unwrap(),
                (value as usize, encoded.len())
            );
        }
    }

    #[test]
    fn test_variable_byte_integer_trailing_bytes_ignored() {
        assert_eq!(VariableByteInteger::decode(&[0x05, 0xAA]).unwrap(), (5, 1));
    }

    #[test]
    fn test_variable_byte_integer_five_bytes_rejected() {
        let res = VariableByteInteger::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert!(matches!(res, Err(ParseError::InvalidVariableByteInteger)));
    }

    #[test]
    fn test_variable_byte_integer_overlong_rejected() {
        // 0 encoded in two bytes
        let res = VariableByteInteger::decode(&[0x80, 0x00]);
        assert!(matches!(res, Err(ParseError::ParseError(msg)) if msg.contains("minimal")));
        // 127 encoded in three bytes
        let res = VariableByteInteger::decode(&[0xFF, 0x80, 0x00]);
        assert!(res.is_err());
    }

    #[test]
    fn test_variable_byte_integer_incomplete() {
        assert!(matches!(
            VariableByteInteger::decode(&[]),
            Err(ParseError::More(1, _))
        ));
        assert!(matches!(
            VariableByteInteger::decode(&[0x80, 0x80]),
            Err(ParseError::More(1, _))
        ));
    }

    #[test]
    fn test_binary_data() {
        let data = [1u8, 2, 3];
        let encoded = BinaryData::encode(&data).unwrap();
        assert_eq!(encoded, vec![0x00, 0x03, 1, 2, 3]);
        assert_eq!(BinaryData::decode(&encoded).unwrap(), (data.to_vec(), 5));
        assert!(matches!(
            BinaryData::decode(&[0x00, 0x05, 1]),
            Err(ParseError::BufferTooShort)
        ));
    }

    #[test]
    fn test_utf8_string() {
        let encoded = Utf8String::encode("a/b").unwrap();
        assert_eq!(encoded, vec![0x00, 0x03, b'a', b'/', b'b']);
        assert_eq!(Utf8String::decode(&encoded).unwrap(), ("a/b".to_string(), 5));
    }

    #[test]
    fn test_utf8_string_too_long() {
        let long = "x".repeat(65_536);
        assert!(matches!(
            Utf8String::encode(&long),
            Err(ParseError::StringTooLong)
        ));
        assert!(Utf8String::encode(&"x".repeat(65_535)).is_ok());
    }

    #[test]
    fn test_utf8_string_invalid_sequences() {
        assert!(matches!(
            Utf8String::decode(&[0x00, 0x02, 0xC3, 0x28]),
            Err(ParseError::Utf8Error(_))
        ));
        assert!(Utf8String::decode(&[0x00, 0x01, 0x00]).is_err());
    }
}
