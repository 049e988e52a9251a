// ABOUTME: Audio decoder implementations
// ABOUTME: Codec header parsing and conversion of wire samples to normalized floats

/// PCM decoder implementation
pub mod pcm;

pub use pcm::PcmDecoder;

use crate::audio::SampleFormat;

/// Decoder trait for audio codecs
pub trait Decoder: Send {
    /// Format of the samples this decoder produces
    fn format(&self) -> &SampleFormat;

    /// Convert whole frames from `data` into interleaved floats in `[-1.0, 1.0)`.
    ///
    /// Writes at most `out.len()` samples and returns how many were written.
    fn decode_into(&self, data: &[u8], out: &mut [f32]) -> usize;
}
