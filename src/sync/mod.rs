// ABOUTME: Clock synchronization for the stream protocol
// ABOUTME: Round-trip offset estimation and server timestamp conversion

/// Clock sources and offset estimation
pub mod clock;

pub use clock::{Clock, ClockSync, SyncQuality, SystemClock};
