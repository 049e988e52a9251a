// ABOUTME: Audio output trait and implementations
// ABOUTME: Completion-driven playback of fixed-size, start-time-stamped buffers

/// cpal-based audio output implementation
#[cfg(feature = "cpal-output")]
pub mod cpal_output;

#[cfg(feature = "cpal-output")]
pub use cpal_output::{CpalBackend, CpalOutput};

use crate::audio::SampleFormat;
use crate::error::Error;
use crate::sync::Clock;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// A filled buffer of interleaved stereo samples due at `start_ms` on the output clock
#[derive(Debug)]
pub struct PlaybackBuffer {
    /// Interleaved samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Output clock time at which the first frame is rendered
    pub start_ms: f64,
}

/// A running output device.
///
/// Every buffer handed to [`schedule`](AudioOutput::schedule) comes back on the
/// completion channel given to [`AudioBackend::open`] once it has finished playing.
pub trait AudioOutput: Send {
    /// The device's hardware clock
    fn clock(&self) -> Arc<dyn Clock>;

    /// Delay between a frame being rendered and it becoming audible, in milliseconds
    fn latency_ms(&self) -> f64;

    /// Queue a buffer to start at its `start_ms`
    fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<(), Error>;
}

/// Opens output devices for a stream format
pub trait AudioBackend: Send + Sync {
    /// Open an output for `format`, reporting finished buffers on `completed`
    fn open(
        &self,
        format: &SampleFormat,
        completed: UnboundedSender<PlaybackBuffer>,
    ) -> Result<Box<dyn AudioOutput>, Error>;
}
