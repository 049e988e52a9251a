// ABOUTME: Completion-driven playback scheduler
// ABOUTME: Keeps a small ring of back-to-back buffers in flight on the output device

use crate::audio::{AudioOutput, BufferPool, PlaybackBuffer, SampleFormat};
use crate::config::PlaybackConfig;
use crate::error::Error;
use crate::scheduler::jitter_buffer::{FillReport, JitterBuffer};
use crate::sync::ClockSync;

/// Schedules fixed-size buffers so each starts exactly where the previous one ends.
///
/// Start times come from a running frame counter anchored once at `start`, so
/// rounding never accumulates over a long session.
pub struct PlaybackScheduler {
    pool: BufferPool,
    sample_rate: u32,
    buffer_frames: usize,
    buffer_count: usize,
    start_delay_ms: f64,
    origin_ms: f64,
    frames_scheduled: u64,
    in_flight: usize,
    running: bool,
}

impl PlaybackScheduler {
    /// Size the ring for `format`
    pub fn new(format: &SampleFormat, config: &PlaybackConfig) -> Self {
        let buffer_frames =
            ((format.sample_rate as u64 * config.buffer_duration_ms as u64 + 500) / 1000).max(1)
                as usize;
        let buffer_count = config.buffer_count.max(1);
        Self {
            pool: BufferPool::new(
                buffer_count + 1,
                buffer_frames * format.channels as usize,
            ),
            sample_rate: format.sample_rate,
            buffer_frames,
            buffer_count,
            start_delay_ms: config.start_delay_ms as f64,
            origin_ms: 0.0,
            frames_scheduled: 0,
            in_flight: 0,
            running: false,
        }
    }

    /// Anchor the timeline at `now + start_delay` and fill the whole ring
    pub fn start(
        &mut self,
        jitter: &mut JitterBuffer,
        sync: &ClockSync,
        output: &mut dyn AudioOutput,
    ) -> Result<(), Error> {
        self.anchor(output.clock().now_ms());
        self.running = true;
        for _ in 0..self.buffer_count {
            self.schedule_next(jitter, sync, output)?;
        }
        log::info!(
            "Playback started: {} buffers of {} frames",
            self.buffer_count,
            self.buffer_frames
        );
        Ok(())
    }

    /// Recycle a finished buffer and schedule its successor
    pub fn on_buffer_complete(
        &mut self,
        buffer: PlaybackBuffer,
        jitter: &mut JitterBuffer,
        sync: &ClockSync,
        output: &mut dyn AudioOutput,
    ) -> Result<(), Error> {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.pool.put(buffer.samples);
        if !self.running {
            return Ok(());
        }

        let now = output.clock().now_ms();
        if self.next_play_time_ms() < now {
            log::warn!(
                "Playback fell {:.1}ms behind the output clock, re-anchoring",
                now - self.next_play_time_ms()
            );
            self.anchor(now);
        }
        self.schedule_next(jitter, sync, output).map(|_| ())
    }

    /// Stop scheduling; completions still return buffers to the pool
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn anchor(&mut self, now_ms: f64) {
        self.origin_ms = now_ms + self.start_delay_ms;
        self.frames_scheduled = 0;
    }

    fn schedule_next(
        &mut self,
        jitter: &mut JitterBuffer,
        sync: &ClockSync,
        output: &mut dyn AudioOutput,
    ) -> Result<FillReport, Error> {
        let start_ms = self.next_play_time_ms();
        let mut samples = self.pool.get();
        // Aim at the moment the buffer becomes audible, not when it is handed over
        let report = jitter.fill(&mut samples, start_ms + output.latency_ms(), sync);

        output.schedule(PlaybackBuffer { samples, start_ms })?;
        self.frames_scheduled += self.buffer_frames as u64;
        self.in_flight += 1;
        Ok(report)
    }

    /// Output clock time at which the next buffer will start
    pub fn next_play_time_ms(&self) -> f64 {
        self.origin_ms + self.frames_scheduled as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Frames per buffer
    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    /// Duration of one buffer in milliseconds
    pub fn buffer_duration_ms(&self) -> f64 {
        self.buffer_frames as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Buffers handed to the output and not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Buffers idle in the pool
    pub fn pooled_buffers(&self) -> usize {
        self.pool.available()
    }

    /// Whether `start` has been called and `stop` has not
    pub fn is_running(&self) -> bool {
        self.running
    }
}
