// ABOUTME: Core audio type definitions
// ABOUTME: SampleFormat, AudioChunk with a zero-copy read cursor, and Volume

use crate::error::Error;
use crate::protocol::wire::TimeValue;
use bytes::Bytes;

/// Audio codec type
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Codec {
    /// Raw interleaved little-endian PCM
    Pcm,
}

impl Codec {
    /// Parse a codec name from the codec header
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "pcm" => Ok(Codec::Pcm),
            other => Err(Error::UnsupportedCodec(other.to_string())),
        }
    }
}

/// PCM sample layout of a stream
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SampleFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channels per frame
    pub channels: u16,
    /// Significant bits per sample
    pub bits_per_sample: u16,
}

impl SampleFormat {
    /// Create a format without validating it
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Check the format is one this client can render: stereo, 16/24/32 bit, non-zero rate
    pub fn validate(&self) -> Result<(), Error> {
        if self.channels != 2 {
            return Err(Error::UnsupportedFormat(format!(
                "{} channels (only stereo is supported)",
                self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 16 | 24 | 32) {
            return Err(Error::UnsupportedFormat(format!(
                "{} bits per sample (16, 24 or 32 supported)",
                self.bits_per_sample
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::UnsupportedFormat("sample rate of 0 Hz".to_string()));
        }
        Ok(())
    }

    /// Bytes used to store one sample. 24-bit samples travel in 4-byte containers.
    pub fn sample_size(&self) -> usize {
        match self.bits_per_sample {
            24 => 4,
            bits => bits as usize / 8,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.sample_size() * self.channels as usize
    }

    /// Frames per millisecond
    pub fn ms_rate(&self) -> f64 {
        self.sample_rate as f64 / 1000.0
    }

    /// Duration of `frames` frames in milliseconds
    pub fn frames_to_ms(&self, frames: usize) -> f64 {
        frames as f64 / self.ms_rate()
    }

    /// Whole frames covering `ms` milliseconds (rounded down, never negative)
    pub fn ms_to_frames(&self, ms: f64) -> usize {
        (ms * self.ms_rate()).floor().max(0.0) as usize
    }
}

/// A received chunk of PCM audio, consumed incrementally through a read cursor
#[derive(Clone, Debug)]
pub struct AudioChunk {
    timestamp: TimeValue,
    format: SampleFormat,
    payload: Bytes,
    read_cursor: usize,
}

impl AudioChunk {
    /// Wrap a payload; any trailing partial frame is ignored
    pub fn new(timestamp: TimeValue, format: SampleFormat, payload: Bytes) -> Self {
        Self {
            timestamp,
            format,
            payload,
            read_cursor: 0,
        }
    }

    /// Server capture time of the first frame
    pub fn timestamp(&self) -> TimeValue {
        self.timestamp
    }

    /// Sample format of the payload
    pub fn format(&self) -> &SampleFormat {
        &self.format
    }

    /// Frames in the payload
    pub fn total_frames(&self) -> usize {
        self.payload.len() / self.format.frame_size()
    }

    /// Frames already consumed
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Frames not yet consumed
    pub fn remaining_frames(&self) -> usize {
        self.total_frames().saturating_sub(self.read_cursor)
    }

    /// Server time of the next unread frame
    pub fn start_ms(&self) -> f64 {
        self.timestamp.to_ms() + self.format.frames_to_ms(self.read_cursor)
    }

    /// Duration of the unread part in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.format.frames_to_ms(self.remaining_frames())
    }

    /// Whether every frame has been consumed
    pub fn is_drained(&self) -> bool {
        self.read_cursor >= self.total_frames()
    }

    /// Advance the cursor without reading; returns the frames actually skipped
    pub fn skip_frames(&mut self, frames: usize) -> usize {
        let skipped = frames.min(self.remaining_frames());
        self.read_cursor += skipped;
        skipped
    }

    /// Borrow up to `frames` unread frames and advance the cursor past them
    pub fn read_frames(&mut self, frames: usize) -> &[u8] {
        let frames = frames.min(self.remaining_frames());
        let frame_size = self.format.frame_size();
        let start = self.read_cursor * frame_size;
        self.read_cursor += frames;
        &self.payload[start..start + frames * frame_size]
    }
}

/// Playback gain
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Volume {
    percent: u8,
    muted: bool,
}

impl Volume {
    /// Create a volume, clamping `percent` to 100
    pub fn new(percent: u8, muted: bool) -> Self {
        Self {
            percent: percent.min(100),
            muted,
        }
    }

    /// Volume percent (0-100)
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Whether output is muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Linear gain applied to every sample
    pub fn gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.percent as f32 / 100.0
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(100, false)
    }
}
