// ABOUTME: Binary frame codec for the Snapcast stream protocol
// ABOUTME: Fixed 26-byte little-endian header followed by a kind-specific body

use crate::error::Error;
use crate::protocol::messages::{CodecHeader, Hello, ServerSettings, TimeProbe, WireChunk};
use bytes::{Buf, BufMut, Bytes};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 26;

const USEC_PER_SEC: i64 = 1_000_000;

/// A (seconds, microseconds) instant or duration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeValue {
    /// Whole seconds
    pub sec: i32,
    /// Microseconds, normalized to `0..1_000_000`
    pub usec: i32,
}

impl TimeValue {
    /// Create a time value, carrying excess microseconds into seconds
    pub fn new(sec: i32, usec: i32) -> Self {
        Self::from_micros(sec as i64 * USEC_PER_SEC + usec as i64)
    }

    /// Build from a total microsecond count
    pub fn from_micros(micros: i64) -> Self {
        Self {
            sec: micros.div_euclid(USEC_PER_SEC) as i32,
            usec: micros.rem_euclid(USEC_PER_SEC) as i32,
        }
    }

    /// Build from a millisecond value, rounded to the nearest microsecond
    pub fn from_ms(ms: f64) -> Self {
        Self::from_micros((ms * 1000.0).round() as i64)
    }

    /// Total microseconds
    pub fn as_micros(&self) -> i64 {
        self.sec as i64 * USEC_PER_SEC + self.usec as i64
    }

    /// Value in milliseconds
    pub fn to_ms(&self) -> f64 {
        self.sec as f64 * 1000.0 + self.usec as f64 / 1000.0
    }

    fn read(buf: &mut Bytes) -> Self {
        let sec = buf.get_i32_le();
        let usec = buf.get_i32_le();
        Self { sec, usec }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.put_i32_le(self.sec);
        out.put_i32_le(self.usec);
    }
}

/// Frame type tag carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameKind {
    /// Codec name and codec-specific header
    CodecHeader = 1,
    /// Timestamped audio payload
    WireChunk = 2,
    /// Buffer depth, latency and volume pushed by the server
    ServerSettings = 3,
    /// Clock probe request or reply
    Time = 4,
    /// Client identity handshake
    Hello = 5,
    /// Stream metadata
    StreamTags = 6,
}

impl TryFrom<u16> for FrameKind {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Error> {
        match value {
            1 => Ok(FrameKind::CodecHeader),
            2 => Ok(FrameKind::WireChunk),
            3 => Ok(FrameKind::ServerSettings),
            4 => Ok(FrameKind::Time),
            5 => Ok(FrameKind::Hello),
            6 => Ok(FrameKind::StreamTags),
            other => Err(Error::Protocol(format!("Unknown frame kind: {}", other))),
        }
    }
}

/// Fixed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Body type
    pub kind: FrameKind,
    /// Sender-assigned id
    pub id: u16,
    /// Id of the request this frame answers, 0 if none
    pub refers_to: u16,
    /// Sender clock when the frame left
    pub sent: TimeValue,
    /// Receiver clock when the frame arrived (stamped locally on receipt)
    pub received: TimeValue,
    /// Body length in bytes
    pub size: u32,
}

/// Decoded frame body
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// Codec header
    CodecHeader(CodecHeader),
    /// Audio chunk
    WireChunk(WireChunk),
    /// Server settings
    ServerSettings(ServerSettings),
    /// Time probe
    Time(TimeProbe),
    /// Handshake
    Hello(Hello),
    /// Stream metadata, passed through uninterpreted
    StreamTags(serde_json::Value),
}

impl FrameBody {
    /// Frame kind for this body
    pub fn kind(&self) -> FrameKind {
        match self {
            FrameBody::CodecHeader(_) => FrameKind::CodecHeader,
            FrameBody::WireChunk(_) => FrameKind::WireChunk,
            FrameBody::ServerSettings(_) => FrameKind::ServerSettings,
            FrameBody::Time(_) => FrameKind::Time,
            FrameBody::Hello(_) => FrameKind::Hello,
            FrameBody::StreamTags(_) => FrameKind::StreamTags,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            FrameBody::CodecHeader(header) => {
                put_sized(out, header.codec.as_bytes());
                put_sized(out, &header.payload);
            }
            FrameBody::WireChunk(chunk) => {
                chunk.timestamp.write(out);
                put_sized(out, &chunk.payload);
            }
            FrameBody::ServerSettings(settings) => put_json(out, settings)?,
            FrameBody::Time(probe) => probe.latency.write(out),
            FrameBody::Hello(hello) => put_json(out, hello)?,
            FrameBody::StreamTags(tags) => put_json(out, tags)?,
        }
        Ok(())
    }

    fn decode(kind: FrameKind, mut body: Bytes) -> Result<Self, Error> {
        let decoded = match kind {
            FrameKind::CodecHeader => {
                let codec = take_sized(&mut body, "codec name")?;
                let codec = String::from_utf8(codec.to_vec())
                    .map_err(|e| Error::Protocol(format!("Codec name is not UTF-8: {}", e)))?;
                let payload = take_sized(&mut body, "codec payload")?;
                FrameBody::CodecHeader(CodecHeader { codec, payload })
            }
            FrameKind::WireChunk => {
                need(&body, 8, "chunk timestamp")?;
                let timestamp = TimeValue::read(&mut body);
                let payload = take_sized(&mut body, "chunk payload")?;
                FrameBody::WireChunk(WireChunk { timestamp, payload })
            }
            FrameKind::ServerSettings => FrameBody::ServerSettings(take_json(&mut body)?),
            FrameKind::Time => {
                need(&body, 8, "time latency")?;
                FrameBody::Time(TimeProbe {
                    latency: TimeValue::read(&mut body),
                })
            }
            FrameKind::Hello => FrameBody::Hello(take_json(&mut body)?),
            FrameKind::StreamTags => FrameBody::StreamTags(take_json(&mut body)?),
        };

        if body.has_remaining() {
            return Err(Error::Protocol(format!(
                "{} trailing bytes in {:?} body",
                body.remaining(),
                kind
            )));
        }
        Ok(decoded)
    }
}

/// A complete transport frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Header fields
    pub header: FrameHeader,
    /// Typed body
    pub body: FrameBody,
}

impl Frame {
    /// Wrap a body with a zeroed header whose `kind` and `size` match the body
    pub fn new(body: FrameBody) -> Result<Self, Error> {
        let mut encoded = Vec::new();
        body.encode_into(&mut encoded)?;
        Ok(Self {
            header: FrameHeader {
                kind: body.kind(),
                id: 0,
                refers_to: 0,
                sent: TimeValue::default(),
                received: TimeValue::default(),
                size: body_len(&encoded)?,
            },
            body,
        })
    }

    /// Frame kind
    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }
}

/// Encode a frame into its wire representation.
///
/// `kind` and `size` are taken from the body, so a header built by hand can never
/// disagree with what is actually written.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    frame.body.encode_into(&mut body)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    let header = &frame.header;
    out.put_u16_le(frame.body.kind() as u16);
    out.put_u16_le(header.id);
    out.put_u16_le(header.refers_to);
    header.sent.write(&mut out);
    header.received.write(&mut out);
    out.put_u32_le(body_len(&body)?);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode one frame from a buffer holding exactly one frame
pub fn decode(mut buf: Bytes) -> Result<Frame, Error> {
    need(&buf, HEADER_SIZE, "frame header")?;

    let kind = FrameKind::try_from(buf.get_u16_le())?;
    let id = buf.get_u16_le();
    let refers_to = buf.get_u16_le();
    let sent = TimeValue::read(&mut buf);
    let received = TimeValue::read(&mut buf);
    let size = buf.get_u32_le();

    let body_size = size as usize;
    if buf.remaining() < body_size {
        return Err(Error::Protocol(format!(
            "Truncated {:?} frame: header says {} body bytes, got {}",
            kind,
            size,
            buf.remaining()
        )));
    }
    if buf.remaining() > body_size {
        return Err(Error::Protocol(format!(
            "{} bytes after {:?} frame body",
            buf.remaining() - body_size,
            kind
        )));
    }

    let body = FrameBody::decode(kind, buf)?;
    Ok(Frame {
        header: FrameHeader {
            kind,
            id,
            refers_to,
            sent,
            received,
            size,
        },
        body,
    })
}

/// Decode from a borrowed slice (copies the bytes once)
pub fn decode_slice(buf: &[u8]) -> Result<Frame, Error> {
    decode(Bytes::copy_from_slice(buf))
}

fn need(buf: &Bytes, len: usize, what: &str) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::Protocol(format!(
            "Truncated {}: need {} bytes, have {}",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn take_sized(buf: &mut Bytes, what: &str) -> Result<Bytes, Error> {
    need(buf, 4, what)?;
    let len = buf.get_u32_le() as usize;
    need(buf, len, what)?;
    Ok(buf.split_to(len))
}

fn take_json<T: DeserializeOwned>(buf: &mut Bytes) -> Result<T, Error> {
    let json = take_sized(buf, "JSON body")?;
    serde_json::from_slice(&json).map_err(|e| Error::Protocol(format!("Invalid JSON body: {}", e)))
}

fn put_sized(out: &mut Vec<u8>, data: &[u8]) {
    out.put_u32_le(data.len() as u32);
    out.extend_from_slice(data);
}

fn put_json<T: Serialize>(out: &mut Vec<u8>, value: &T) -> Result<(), Error> {
    let json = serde_json::to_vec(value).map_err(|e| Error::Protocol(e.to_string()))?;
    put_sized(out, &json);
    Ok(())
}

fn body_len(body: &[u8]) -> Result<u32, Error> {
    u32::try_from(body.len())
        .map_err(|_| Error::Protocol(format!("Frame body too large: {} bytes", body.len())))
}
