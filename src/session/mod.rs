// ABOUTME: Session lifecycle for the playback client
// ABOUTME: Controller and reconnect loop, per-connection session state, persisted identity

/// Connection lifecycle and host control surface
pub mod controller;
/// Persisted client id
pub mod identity;
/// Per-connection playback state
pub mod playback;

pub use controller::{ConnectionState, SessionController};
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore};
pub use playback::PlaybackSession;
