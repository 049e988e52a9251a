// ABOUTME: Main library entry point for snapsync
// ABOUTME: Exports public API for the synchronized Snapcast playback client

//! # snapsync
//!
//! Synchronized multi-room audio playback client for the Snapcast stream protocol.
//!
//! The client joins a stream over WebSocket, estimates the offset between its local
//! audio clock and the server clock, buffers timestamped PCM chunks and renders them
//! through a local output so every client in the group plays the same sample at the
//! same instant.
//!
//! ```text
//! transport frames -> wire codec -> { clock sync, session control, jitter buffer }
//!                                                     |
//!                   playback scheduler <- fill(playTime, offset snapshot)
//!                            |
//!                      audio output
//! ```

#![warn(missing_docs)]

/// Audio types and processing
pub mod audio;
/// Client configuration
pub mod config;
/// Protocol implementation for WebSocket communication
pub mod protocol;
/// Jitter buffer and playback scheduling
pub mod scheduler;
/// Session lifecycle, identity and host control surface
pub mod session;
/// Clock synchronization utilities
pub mod sync;

pub use config::{ClientConfig, ReconnectPolicy};
pub use protocol::client::ProtocolClient;
pub use protocol::wire::{Frame, FrameBody, FrameKind, TimeValue};
pub use scheduler::{JitterBuffer, PlaybackScheduler};
pub use session::{ConnectionState, IdentityStore, SessionController};
pub use sync::ClockSync;

/// Result type for snapsync operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Error types for snapsync
pub mod error {
    use thiserror::Error;

    /// Error types for snapsync operations
    #[derive(Error, Debug)]
    pub enum Error {
        /// WebSocket-related error
        #[error("WebSocket error: {0}")]
        WebSocket(String),

        /// Malformed or truncated frame, or a protocol violation
        #[error("Protocol error: {0}")]
        Protocol(String),

        /// Connection-related error
        #[error("Connection error: {0}")]
        Connection(String),

        /// Audio output error
        #[error("Audio output error: {0}")]
        Output(String),

        /// The server announced a codec this client cannot render
        #[error("Unsupported codec: {0}")]
        UnsupportedCodec(String),

        /// The server announced a sample format this client cannot render
        #[error("Unsupported sample format: {0}")]
        UnsupportedFormat(String),

        /// Invalid configuration
        #[error("Configuration error: {0}")]
        Config(String),

        /// Failure reading or writing the persisted client id
        #[error("Identity store error: {0}")]
        Identity(#[from] std::io::Error),
    }

    impl Error {
        /// Whether this error ends the client lifecycle instead of triggering a reconnect.
        ///
        /// Format errors have no safe fallback rendering, and an output that cannot be
        /// opened will not open on the next attempt either.
        pub fn is_fatal(&self) -> bool {
            matches!(
                self,
                Error::UnsupportedCodec(_) | Error::UnsupportedFormat(_) | Error::Output(_)
            )
        }
    }
}
