// ABOUTME: Jitter buffer holding timestamped chunks ahead of their playback deadline
// ABOUTME: Answers fixed-size fill requests with hard-sync drift correction

use crate::audio::decode::Decoder;
use crate::audio::{AudioChunk, SampleFormat, Volume};
use crate::config::SyncConfig;
use crate::sync::ClockSync;
use std::collections::VecDeque;

/// Corrections and shortfalls from a single fill
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FillReport {
    /// Frames of silence written (waiting, alignment, or underrun)
    pub silence_frames: usize,
    /// Leading frames skipped to catch up with the play time
    pub fast_forwarded_frames: usize,
    /// Whole chunks discarded for lying entirely in the past
    pub dropped_chunks: usize,
    /// The queue ran dry before the request was satisfied
    pub underrun: bool,
}

/// Cumulative diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JitterStats {
    /// Fill requests answered
    pub fills: u64,
    /// Fills that ran out of audio
    pub underruns: u64,
    /// Chunks dropped during hard sync
    pub dropped_chunks: u64,
    /// Chunks evicted on insert for exceeding the age ceiling
    pub stale_chunks: u64,
    /// Frames skipped by fast-forward
    pub fast_forwarded_frames: u64,
    /// Silent frames written
    pub silence_frames: u64,
}

/// Ordered queue of audio chunks for one stream
pub struct JitterBuffer {
    decoder: Box<dyn Decoder>,
    chunks: VecDeque<AudioChunk>,
    /// Chunk being drained across fills
    current: Option<AudioChunk>,
    buffer_depth_ms: f64,
    hard_sync_threshold_ms: f64,
    stale_ceiling_ms: f64,
    volume: Volume,
    stats: JitterStats,
}

impl JitterBuffer {
    /// Create an empty buffer decoding with `decoder`
    pub fn new(decoder: Box<dyn Decoder>, config: &SyncConfig, buffer_depth_ms: f64) -> Self {
        Self {
            decoder,
            chunks: VecDeque::new(),
            current: None,
            buffer_depth_ms,
            hard_sync_threshold_ms: config.hard_sync_threshold_ms,
            stale_ceiling_ms: config.stale_chunk_ceiling_ms,
            volume: Volume::default(),
            stats: JitterStats::default(),
        }
    }

    /// Stream format
    pub fn format(&self) -> &SampleFormat {
        self.decoder.format()
    }

    /// Queue a chunk and evict anything too old to ever be played.
    ///
    /// `server_now_ms` is the current server time estimate.
    pub fn add_chunk(&mut self, chunk: AudioChunk, server_now_ms: f64) {
        if chunk.total_frames() == 0 {
            return;
        }
        self.chunks.push_back(chunk);

        let ceiling = self.stale_ceiling_ms + self.buffer_depth_ms;
        while let Some(front) = self.chunks.front() {
            let age = server_now_ms - front.timestamp().to_ms();
            if age <= ceiling {
                break;
            }
            log::debug!("Dropping stale chunk, age {:.0}ms", age);
            self.chunks.pop_front();
            self.stats.stale_chunks += 1;
        }
    }

    /// Fill `out` with the audio due at local time `play_time_ms`.
    ///
    /// The clock offset is read once, so a concurrent probe result cannot shift the
    /// play time halfway through a fill.
    pub fn fill(&mut self, out: &mut [f32], play_time_ms: f64, sync: &ClockSync) -> FillReport {
        let server_play_time_ms = sync.server_time(play_time_ms) - self.buffer_depth_ms;
        self.fill_at(out, server_play_time_ms)
    }

    /// Fill `out` with the audio whose server timestamp is `server_play_time_ms`
    pub fn fill_at(&mut self, out: &mut [f32], server_play_time_ms: f64) -> FillReport {
        let format = *self.decoder.format();
        let channels = format.channels as usize;
        let frames = out.len() / channels;
        let mut report = FillReport::default();
        out.fill(0.0);

        if self.current.is_none() {
            self.current = self.chunks.pop_front();
        }
        let Some(chunk) = self.current.as_ref() else {
            log::debug!("Buffer underrun: no audio queued");
            report.underrun = true;
            report.silence_frames = frames;
            self.record(&report);
            return report;
        };

        let requested_ms = format.frames_to_ms(frames);
        let mut age = server_play_time_ms - chunk.start_ms();

        if age < -requested_ms {
            // Ahead of schedule: wait for time to catch up
            report.silence_frames = frames;
            self.record(&report);
            return report;
        }

        let mut pos = 0;
        if age.abs() > self.hard_sync_threshold_ms {
            while let Some(chunk) = self.current.as_ref() {
                if age <= 0.0 || age <= chunk.duration_ms() {
                    break;
                }
                report.dropped_chunks += 1;
                self.current = self.chunks.pop_front();
                if let Some(next) = self.current.as_ref() {
                    age = server_play_time_ms - next.start_ms();
                }
            }

            if let Some(chunk) = self.current.as_mut() {
                if age > 0.0 {
                    report.fast_forwarded_frames = chunk.skip_frames(format.ms_to_frames(age));
                } else if age < 0.0 {
                    pos = format.ms_to_frames(-age).min(frames);
                    report.silence_frames = pos;
                }
            }

            log::debug!(
                "Hard sync at age {:.2}ms: dropped {} chunks, skipped {} frames, inserted {} silent frames",
                age,
                report.dropped_chunks,
                report.fast_forwarded_frames,
                report.silence_frames
            );
        }

        while pos < frames {
            let Some(chunk) = self.current.as_mut() else {
                break;
            };
            let data = chunk.read_frames(frames - pos);
            let written = self
                .decoder
                .decode_into(data, &mut out[pos * channels..frames * channels]);
            pos += written / channels;
            if chunk.is_drained() {
                self.current = self.chunks.pop_front();
            }
        }

        if pos < frames {
            log::debug!("Buffer underrun: {} frames short", frames - pos);
            report.underrun = true;
            report.silence_frames += frames - pos;
        }

        let gain = self.volume.gain();
        if gain != 1.0 {
            out.iter_mut().for_each(|s| *s *= gain);
        }

        self.record(&report);
        report
    }

    fn record(&mut self, report: &FillReport) {
        self.stats.fills += 1;
        self.stats.underruns += report.underrun as u64;
        self.stats.dropped_chunks += report.dropped_chunks as u64;
        self.stats.fast_forwarded_frames += report.fast_forwarded_frames as u64;
        self.stats.silence_frames += report.silence_frames as u64;
    }

    /// Set the output gain
    pub fn set_volume(&mut self, volume: Volume) {
        self.volume = volume;
    }

    /// Current output gain
    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Change the target depth, e.g. after new server settings
    pub fn set_buffer_depth(&mut self, buffer_depth_ms: f64) {
        self.buffer_depth_ms = buffer_depth_ms;
    }

    /// Target depth in milliseconds
    pub fn buffer_depth_ms(&self) -> f64 {
        self.buffer_depth_ms
    }

    /// Chunks waiting in the queue, not counting one partially drained
    pub fn queued_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no audio is held at all
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.chunks.is_empty()
    }

    /// Cumulative diagnostics
    pub fn stats(&self) -> JitterStats {
        self.stats
    }
}
