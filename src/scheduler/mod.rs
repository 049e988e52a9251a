// ABOUTME: Jitter buffer and playback scheduling
// ABOUTME: Chunk store with drift correction, and the completion-driven output ring

/// Chunk store answering timed fill requests
pub mod jitter_buffer;
/// Output buffer ring
pub mod playback;

pub use jitter_buffer::{FillReport, JitterBuffer, JitterStats};
pub use playback::PlaybackScheduler;
