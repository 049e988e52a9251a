// Shared fakes and builders for the integration tests
#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use snapsync::audio::decode::pcm::riff_header;
use snapsync::audio::{AudioBackend, AudioChunk, AudioOutput, PlaybackBuffer, SampleFormat};
use snapsync::error::Error;
use snapsync::protocol::messages::{CodecHeader, ServerSettings};
use snapsync::protocol::wire::{Frame, FrameBody, TimeValue};
use snapsync::sync::Clock;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub const STEREO_16: SampleFormat = SampleFormat {
    sample_rate: 48_000,
    channels: 2,
    bits_per_sample: 16,
};

/// Clock the test moves by hand
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(now_ms: f64) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now_ms),
        })
    }

    pub fn set(&self, now_ms: f64) {
        *self.now.lock() = now_ms;
    }

    pub fn advance(&self, ms: f64) {
        *self.now.lock() += ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock()
    }
}

/// Output that records scheduled buffers instead of playing them
pub struct FakeOutput {
    pub clock: Arc<ManualClock>,
    pub latency_ms: f64,
    pub scheduled: Arc<Mutex<Vec<PlaybackBuffer>>>,
}

impl FakeOutput {
    pub fn new(clock: Arc<ManualClock>, latency_ms: f64) -> Self {
        Self {
            clock,
            latency_ms,
            scheduled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn take_first(&self) -> PlaybackBuffer {
        self.scheduled.lock().remove(0)
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.scheduled.lock().iter().map(|b| b.start_ms).collect()
    }
}

impl AudioOutput for FakeOutput {
    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<(), Error> {
        self.scheduled.lock().push(buffer);
        Ok(())
    }
}

/// Backend handing out `FakeOutput`s that share one clock and one schedule log
pub struct FakeBackend {
    pub clock: Arc<ManualClock>,
    pub scheduled: Arc<Mutex<Vec<PlaybackBuffer>>>,
    pub opened: Mutex<Vec<SampleFormat>>,
    /// Completion channels of every opened output, kept open like a live device
    pub completions: Mutex<Vec<UnboundedSender<PlaybackBuffer>>>,
    pub fail_open: bool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clock: ManualClock::new(1000.0),
            scheduled: Arc::new(Mutex::new(Vec::new())),
            opened: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            fail_open: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            clock: ManualClock::new(1000.0),
            scheduled: Arc::new(Mutex::new(Vec::new())),
            opened: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            fail_open: true,
        })
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.scheduled.lock().iter().map(|b| b.start_ms).collect()
    }
}

impl AudioBackend for FakeBackend {
    fn open(
        &self,
        format: &SampleFormat,
        completed: UnboundedSender<PlaybackBuffer>,
    ) -> Result<Box<dyn AudioOutput>, Error> {
        if self.fail_open {
            return Err(Error::Output("no device".to_string()));
        }
        self.opened.lock().push(*format);
        self.completions.lock().push(completed);
        Ok(Box::new(FakeOutput {
            clock: Arc::clone(&self.clock),
            latency_ms: 0.0,
            scheduled: Arc::clone(&self.scheduled),
        }))
    }
}

/// Stereo 16-bit payload where both channels of frame `i` hold `sample(i)`
pub fn pcm16(frames: usize, sample: impl Fn(usize) -> i16) -> Vec<u8> {
    let mut data = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let bytes = sample(i).to_le_bytes();
        data.extend_from_slice(&bytes);
        data.extend_from_slice(&bytes);
    }
    data
}

/// 16-bit stereo chunk at 48kHz starting at server time `start_ms`
pub fn chunk16(start_ms: f64, frames: usize, sample: impl Fn(usize) -> i16) -> AudioChunk {
    AudioChunk::new(
        TimeValue::from_ms(start_ms),
        STEREO_16,
        Bytes::from(pcm16(frames, sample)),
    )
}

/// Normalized value of a 16-bit sample
pub fn norm16(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

pub fn codec_header_frame(codec: &str, format: &SampleFormat) -> Frame {
    Frame::new(FrameBody::CodecHeader(CodecHeader {
        codec: codec.to_string(),
        payload: Bytes::from(riff_header(format)),
    }))
    .unwrap()
}

pub fn settings_frame(buffer_ms: i32, latency: i32, volume: u8, muted: bool) -> Frame {
    Frame::new(FrameBody::ServerSettings(ServerSettings {
        buffer_ms,
        latency,
        volume,
        muted,
    }))
    .unwrap()
}
