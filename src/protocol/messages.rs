// ABOUTME: Protocol message body definitions and serialization
// ABOUTME: Hello, server settings, codec header, wire chunk and time probe bodies

use crate::protocol::wire::TimeValue;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Stream protocol version announced in the handshake
pub const PROTOCOL_VERSION: u32 = 2;

/// Placeholder hardware address; WebSocket clients have no MAC to report
pub const DEFAULT_MAC: &str = "00:00:00:00:00:00";

/// Client identity handshake, sent once per connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Hardware address, [`DEFAULT_MAC`] for this client
    #[serde(rename = "MAC")]
    pub mac: String,
    /// Host the client runs on
    #[serde(rename = "HostName")]
    pub host_name: String,
    /// Client software version
    #[serde(rename = "Version")]
    pub version: String,
    /// Client software name
    #[serde(rename = "ClientName")]
    pub client_name: String,
    /// Operating system name
    #[serde(rename = "OS")]
    pub os: String,
    /// CPU architecture
    #[serde(rename = "Arch")]
    pub arch: String,
    /// Instance number among clients on the same host
    #[serde(rename = "Instance")]
    pub instance: u32,
    /// Persisted unique client id
    #[serde(rename = "ID")]
    pub id: String,
    /// Stream protocol version spoken, [`PROTOCOL_VERSION`]
    #[serde(rename = "SnapStreamProtocolVersion")]
    pub protocol_version: u32,
}

/// Server-pushed playback settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// End-to-end buffer the server targets, in milliseconds
    pub buffer_ms: i32,
    /// Additional latency configured for this client, in milliseconds
    pub latency: i32,
    /// Volume percent
    pub volume: u8,
    /// Whether output is muted
    pub muted: bool,
}

impl ServerSettings {
    /// Depth the jitter buffer should hold: buffer minus per-client latency
    pub fn buffer_depth_ms(&self) -> f64 {
        (self.buffer_ms - self.latency) as f64
    }
}

/// Codec announcement, sent once per stream start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecHeader {
    /// Codec name, e.g. `"pcm"`
    pub codec: String,
    /// Codec-specific header (a RIFF/WAVE header for PCM)
    pub payload: Bytes,
}

/// Timestamped audio payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireChunk {
    /// Server capture time of the first frame
    pub timestamp: TimeValue,
    /// Interleaved PCM bytes
    pub payload: Bytes,
}

/// Clock probe body.
///
/// Requests carry a zero latency; replies carry `server_received - client_sent`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeProbe {
    /// Client-to-server transit time; zero in requests
    pub latency: TimeValue,
}
