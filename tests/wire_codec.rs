use bytes::Bytes;
use snapsync::error::Error;
use snapsync::protocol::messages::{
    CodecHeader, Hello, ServerSettings, TimeProbe, WireChunk, PROTOCOL_VERSION,
};
use snapsync::protocol::wire::{self, Frame, FrameBody, FrameKind, TimeValue, HEADER_SIZE};

fn hello() -> Hello {
    Hello {
        mac: "00:00:00:00:00:00".to_string(),
        host_name: "kitchen".to_string(),
        version: "0.1.0".to_string(),
        client_name: "snapsync".to_string(),
        os: "linux".to_string(),
        arch: "x86_64".to_string(),
        instance: 1,
        id: "4f1c2d3e".to_string(),
        protocol_version: PROTOCOL_VERSION,
    }
}

fn stamped(body: FrameBody) -> Frame {
    let mut frame = Frame::new(body).unwrap();
    frame.header.id = 7;
    frame.header.refers_to = 3;
    frame.header.sent = TimeValue::new(12, 345_678);
    frame.header.received = TimeValue::new(-2, 999_999);
    frame
}

#[test]
fn test_every_frame_kind_survives_encoding() {
    let bodies = vec![
        FrameBody::CodecHeader(CodecHeader {
            codec: "pcm".to_string(),
            payload: Bytes::from_static(b"RIFF....WAVE"),
        }),
        FrameBody::WireChunk(WireChunk {
            timestamp: TimeValue::new(1_700_000_000, 250_000),
            payload: Bytes::from(vec![1u8, 2, 3, 4, 5, 6, 7, 8]),
        }),
        FrameBody::ServerSettings(ServerSettings {
            buffer_ms: 1000,
            latency: 20,
            volume: 80,
            muted: false,
        }),
        FrameBody::Time(TimeProbe {
            latency: TimeValue::new(0, 1500),
        }),
        FrameBody::Hello(hello()),
        FrameBody::StreamTags(serde_json::json!({ "artist": "someone", "title": "something" })),
    ];

    for body in bodies {
        let frame = stamped(body);
        let encoded = wire::encode(&frame).unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE + frame.header.size as usize);

        let decoded = wire::decode_slice(&encoded).unwrap();
        assert_eq!(decoded, frame, "{:?}", frame.kind());
    }
}

#[test]
fn test_header_layout_is_little_endian() {
    let frame = stamped(FrameBody::Time(TimeProbe::default()));
    let encoded = wire::encode(&frame).unwrap();

    assert_eq!(&encoded[0..2], &4u16.to_le_bytes());
    assert_eq!(&encoded[2..4], &7u16.to_le_bytes());
    assert_eq!(&encoded[4..6], &3u16.to_le_bytes());
    assert_eq!(&encoded[6..10], &12i32.to_le_bytes());
    assert_eq!(&encoded[10..14], &345_678i32.to_le_bytes());
    assert_eq!(&encoded[22..26], &8u32.to_le_bytes());
    assert_eq!(encoded.len(), HEADER_SIZE + 8);
}

#[test]
fn test_codec_header_body_layout() {
    let frame = Frame::new(FrameBody::CodecHeader(CodecHeader {
        codec: "pcm".to_string(),
        payload: Bytes::from_static(&[9, 9]),
    }))
    .unwrap();
    let encoded = wire::encode(&frame).unwrap();
    let body = &encoded[HEADER_SIZE..];

    assert_eq!(body, &[3, 0, 0, 0, b'p', b'c', b'm', 2, 0, 0, 0, 9, 9]);
}

#[test]
fn test_size_comes_from_body_not_header() {
    let mut frame = Frame::new(FrameBody::Time(TimeProbe::default())).unwrap();
    frame.header.size = 999;
    let encoded = wire::encode(&frame).unwrap();
    let decoded = wire::decode_slice(&encoded).unwrap();
    assert_eq!(decoded.header.size, 8);
}

#[test]
fn test_truncated_header_is_rejected() {
    let encoded = wire::encode(&stamped(FrameBody::Time(TimeProbe::default()))).unwrap();
    let err = wire::decode_slice(&encoded[..HEADER_SIZE - 1]).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn test_truncated_body_is_rejected() {
    let encoded = wire::encode(&stamped(FrameBody::ServerSettings(ServerSettings {
        buffer_ms: 1000,
        latency: 0,
        volume: 100,
        muted: false,
    })))
    .unwrap();
    let err = wire::decode_slice(&encoded[..encoded.len() - 3]).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn test_inner_size_overrunning_body_is_rejected() {
    let mut encoded = wire::encode(&Frame::new(FrameBody::WireChunk(WireChunk {
        timestamp: TimeValue::default(),
        payload: Bytes::from_static(&[0; 4]),
    }))
    .unwrap())
    .unwrap();
    // Claim a payload longer than the frame body
    let size_at = HEADER_SIZE + 8;
    encoded[size_at..size_at + 4].copy_from_slice(&100u32.to_le_bytes());

    assert!(matches!(
        wire::decode_slice(&encoded).unwrap_err(),
        Error::Protocol(_)
    ));
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let mut encoded = wire::encode(&stamped(FrameBody::Time(TimeProbe::default()))).unwrap();
    encoded.push(0);
    assert!(matches!(
        wire::decode_slice(&encoded).unwrap_err(),
        Error::Protocol(_)
    ));
}

#[test]
fn test_unknown_kind_is_rejected() {
    let mut encoded = wire::encode(&stamped(FrameBody::Time(TimeProbe::default()))).unwrap();
    encoded[0..2].copy_from_slice(&42u16.to_le_bytes());
    assert!(matches!(
        wire::decode_slice(&encoded).unwrap_err(),
        Error::Protocol(_)
    ));
    assert!(FrameKind::try_from(0u16).is_err());
    assert_eq!(FrameKind::try_from(2u16).unwrap(), FrameKind::WireChunk);
}

#[test]
fn test_invalid_json_body_is_rejected() {
    let mut body = Vec::new();
    body.extend_from_slice(&5u32.to_le_bytes());
    body.extend_from_slice(b"{nope");

    let mut frame = Vec::new();
    frame.extend_from_slice(&3u16.to_le_bytes());
    frame.extend_from_slice(&[0; 20]);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);

    assert!(matches!(
        wire::decode_slice(&frame).unwrap_err(),
        Error::Protocol(_)
    ));
}

#[test]
fn test_time_value_conversions() {
    let t = TimeValue::from_ms(1500.25);
    assert_eq!(t, TimeValue::new(1, 500_250));
    assert_eq!(t.to_ms(), 1500.25);

    // Negative values keep usec in 0..1_000_000
    let neg = TimeValue::from_micros(-1);
    assert_eq!(neg, TimeValue::new(-1, 999_999));
    assert_eq!(neg.as_micros(), -1);
}
