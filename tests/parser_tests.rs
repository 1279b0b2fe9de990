// SPDX-License-Identifier: MPL-2.0

// Integration tests for the MQTT 3.1.1 codec and stream parser

use flowmqtt::mqtt_serde::control_packet::{MqttControlPacket, MqttPacket};
use flowmqtt::mqtt_serde::mqttv3::{
    MqttConnAck, MqttConnect, MqttDisconnect, MqttPingReq, MqttPingResp, MqttPubAck, MqttPubComp,
    MqttPubRec, MqttPubRel, MqttPublish, MqttSubAck, MqttSubscribe, MqttUnsubAck,
    MqttUnsubscribe, SubscriptionTopic, Will,
};
use flowmqtt::mqtt_serde::parser::{
    packet_type, parse_packet_id, parse_remaining_length, parse_utf8_string, stream::MqttParser,
    ParseError, ParseOk,
};

fn decode(bytes: &[u8]) -> MqttPacket {
    match MqttPacket::from_bytes(bytes).unwrap() {
        ParseOk::Packet(packet, consumed) => {
            assert_eq!(consumed, bytes.len());
            packet
        }
        other => panic!("Expected packet, got {:?}", other),
    }
}

fn sample_packets() -> Vec<MqttPacket> {
    let mut connect = MqttConnect::new("sensor-1".to_string(), 30, false);
    connect.will = Some(Will::new("status/sensor-1", "offline", 1, true));
    connect.username = Some("user".to_string());
    connect.password = Some(b"secret".to_vec());

    vec![
        MqttPacket::Connect(connect),
        MqttPacket::ConnAck(MqttConnAck::new(true, 0)),
        MqttPacket::Publish(MqttPublish::new(
            "sensors/a/temp".to_string(),
            2,
            b"21.5".to_vec(),
            Some(7),
            true,
            true,
        )),
        MqttPacket::PubAck(MqttPubAck::new(1)),
        MqttPacket::PubRec(MqttPubRec::new(2)),
        MqttPacket::PubRel(MqttPubRel::new(3)),
        MqttPacket::PubComp(MqttPubComp::new(4)),
        MqttPacket::Subscribe(MqttSubscribe::new(
            5,
            vec![
                SubscriptionTopic::new("sensors/+/temp", 1),
                SubscriptionTopic::new("factory/#", 2),
            ],
        )),
        MqttPacket::SubAck(MqttSubAck::new(5, vec![1, 0x80])),
        MqttPacket::Unsubscribe(MqttUnsubscribe::new(6, vec!["factory/#".to_string()])),
        MqttPacket::UnsubAck(MqttUnsubAck::new(6)),
        MqttPacket::PingReq(MqttPingReq::new()),
        MqttPacket::PingResp(MqttPingResp::new()),
        MqttPacket::Disconnect(MqttDisconnect::new()),
    ]
}

#[test]
fn test_every_packet_type_decodes_to_itself() {
    for packet in sample_packets() {
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(decode(&bytes), packet);
    }
}

#[test]
fn test_connect_exact_bytes() {
    let connect = MqttConnect::new("tester".to_string(), 60, true);
    assert_eq!(
        connect.to_bytes().unwrap(),
        vec![
            0x10, 18, // CONNECT, remaining length
            0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
            0x04, // level
            0x02, // clean session
            0x00, 0x3C, // keep alive
            0x00, 0x06, b't', b'e', b's', b't', b'e', b'r',
        ]
    );
}

#[test]
fn test_basic_parser_functions() {
    assert_eq!(packet_type(&[0x30, 0x00]).unwrap(), 3);
    assert!(matches!(packet_type(&[]), Err(ParseError::BufferEmpty)));
    assert_eq!(parse_remaining_length(&[0xC1, 0x02]).unwrap(), (321, 2));
    assert_eq!(
        parse_utf8_string(&[0x00, 0x02, b'h', b'i', 0xFF]).unwrap(),
        ("hi".to_string(), 4)
    );
    assert_eq!(parse_packet_id(&[0x12, 0x34]).unwrap(), (0x1234, 2));
    assert!(matches!(parse_packet_id(&[0x00, 0x00]), Err(ParseError::InvalidPacketId)));
}

#[test]
fn test_remaining_length_boundaries() {
    assert_eq!(parse_remaining_length(&[0x7F]).unwrap(), (127, 1));
    assert_eq!(parse_remaining_length(&[0x80, 0x01]).unwrap(), (128, 2));
    assert_eq!(
        parse_remaining_length(&[0xFF, 0xFF, 0xFF, 0x7F]).unwrap(),
        (268_435_455, 4)
    );
    // continuation bit on the 4th byte
    assert!(matches!(
        parse_remaining_length(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        Err(ParseError::InvalidVariableByteInteger)
    ));
    // overlong encoding of 0
    assert!(parse_remaining_length(&[0x80, 0x00]).is_err());
    // incomplete
    assert!(parse_remaining_length(&[0x80]).unwrap_err().is_incomplete());
}

#[test]
fn test_five_byte_remaining_length_is_malformed() {
    let bytes = [0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
    assert!(MqttPacket::from_bytes(&bytes).is_err());
}

#[test]
fn test_non_minimal_remaining_length_is_malformed() {
    // PINGRESP with remaining length 0 encoded in two bytes
    let bytes = [0xD0, 0x80, 0x00];
    assert!(MqttPacket::from_bytes(&bytes).is_err());
}

#[test]
fn test_reserved_packet_types_rejected() {
    assert!(MqttPacket::from_bytes(&[0x00, 0x00]).is_err());
    assert!(MqttPacket::from_bytes(&[0xF0, 0x00]).is_err());
}

#[test]
fn test_reserved_flag_violations() {
    // PUBREL must carry flags 0x02
    assert!(MqttPacket::from_bytes(&[0x60, 0x02, 0x00, 0x01]).is_err());
    assert!(MqttPacket::from_bytes(&[0x62, 0x02, 0x00, 0x01]).is_ok());
    // SUBSCRIBE with flags 0
    assert!(MqttPacket::from_bytes(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x01, b'a', 0x00]).is_err());
    // PINGREQ with a flag bit set
    assert!(MqttPacket::from_bytes(&[0xC1, 0x00]).is_err());
}

#[test]
fn test_publish_qos3_and_dup_qos0_are_malformed() {
    assert!(MqttPacket::from_bytes(&[0x36, 0x05, 0x00, 0x01, b't', 0x00, 0x01]).is_err());
    assert!(MqttPacket::from_bytes(&[0x38, 0x03, 0x00, 0x01, b't']).is_err());
}

#[test]
fn test_truncated_body_is_malformed() {
    // PUBACK declaring 1 byte of body
    assert!(MqttPacket::from_bytes(&[0x40, 0x01, 0x00]).is_err());
}

#[test]
fn test_partial_packets_need_more_data() {
    let bytes = MqttPacket::PubAck(MqttPubAck::new(42)).to_bytes().unwrap();
    for cut in 0..bytes.len() {
        assert!(matches!(
            MqttPacket::from_bytes(&bytes[..cut]).unwrap(),
            ParseOk::Continue(_, 0)
        ));
    }
}

#[test]
fn test_encoding_errors() {
    let no_id = MqttSubscribe::new(0, vec![SubscriptionTopic::new("a", 0)]);
    assert!(no_id.to_bytes().is_err());

    let empty = MqttSubscribe::new(1, vec![]);
    assert!(empty.to_bytes().is_err());

    let bad_filter = MqttUnsubscribe::new(1, vec!["a/#/b".to_string()]);
    assert!(bad_filter.to_bytes().is_err());

    let mut connect = MqttConnect::new("c".to_string(), 10, true);
    connect.password = Some(b"pw".to_vec());
    assert!(connect.to_bytes().is_err());

    let empty_topic = MqttPublish::new(String::new(), 0, vec![], None, false, false);
    assert!(empty_topic.to_bytes().is_err());
}

#[test]
fn test_stream_parser_split_across_reads() {
    let packets = sample_packets();
    let mut wire = Vec::new();
    for p in &packets {
        wire.extend(p.to_bytes().unwrap());
    }

    let mut parser = MqttParser::new(32);
    let mut decoded = Vec::new();
    for chunk in wire.chunks(7) {
        parser.feed(chunk);
        while let Some(packet) = parser.next_packet().unwrap() {
            decoded.push(packet);
        }
    }
    assert_eq!(decoded, packets);
    assert!(parser.buffered().is_empty());
}

#[test]
fn test_stream_parser_reports_malformed_input() {
    let mut parser = MqttParser::default();
    parser.feed(&MqttPacket::PingResp(MqttPingResp::new()).to_bytes().unwrap());
    parser.feed(&[0x00, 0x00]);
    assert_eq!(
        parser.next_packet().unwrap(),
        Some(MqttPacket::PingResp(MqttPingResp::new()))
    );
    assert!(parser.next_packet().is_err());
}
