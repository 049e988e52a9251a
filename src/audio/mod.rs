// ABOUTME: Audio types and processing for snapsync
// ABOUTME: Contains SampleFormat, AudioChunk, decoders, buffer pool and output abstraction

/// Audio decoder implementations
pub mod decode;
/// Audio output trait and implementations
pub mod output;
/// Buffer pool for reusing playback buffers
pub mod pool;
/// Core audio type definitions (SampleFormat, Codec, AudioChunk, Volume)
pub mod types;

pub use output::{AudioBackend, AudioOutput, PlaybackBuffer};
pub use pool::BufferPool;
pub use types::{AudioChunk, Codec, SampleFormat, Volume};
