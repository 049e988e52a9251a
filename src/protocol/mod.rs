// ABOUTME: Protocol implementation for the Snapcast stream protocol
// ABOUTME: Binary frame codec, message bodies, and WebSocket client

/// WebSocket client implementation
pub mod client;
/// Protocol message body definitions and serialization
pub mod messages;
/// Binary frame encoding and decoding
pub mod wire;

pub use wire::{decode, encode, Frame, FrameBody, FrameHeader, FrameKind, TimeValue};
