// ABOUTME: Clock synchronization implementation
// ABOUTME: Median of round-trip offset estimates between the local and server clocks

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Default number of probe samples kept in the sliding window
pub const DEFAULT_WINDOW: usize = 100;

/// Local time source in milliseconds.
///
/// Implemented by the audio output's hardware clock once a device is open, so that
/// offsets are measured in the same domain buffers are scheduled in.
pub trait Clock: Send + Sync {
    /// Current local time in milliseconds. Zero means the clock has not started.
    fn now_ms(&self) -> f64;
}

/// Monotonic wall clock used before an output device exists
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Start a clock at the current instant
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        // Offset by one millisecond so a freshly created clock never reads as "not started"
        1.0 + self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock synchronization quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncQuality {
    /// Good synchronization (RTT < 50ms)
    Good,
    /// Degraded synchronization (RTT 50-100ms)
    Degraded,
    /// Lost synchronization (RTT >= 100ms or no sync)
    Lost,
}

/// Clock synchronization state
pub struct ClockSync {
    clock: Arc<dyn Clock>,

    /// Most recent per-probe offset estimates, oldest first
    window: VecDeque<f64>,
    capacity: usize,

    /// Median of `window`, in milliseconds (server - local)
    offset_ms: f64,

    /// Round trip of the latest probe in milliseconds
    rtt_ms: Option<f64>,
}

impl ClockSync {
    /// Create a synchronizer over `clock` keeping `capacity` samples
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            clock,
            window: VecDeque::with_capacity(capacity),
            capacity,
            offset_ms: 0.0,
            rtt_ms: None,
        }
    }

    /// Switch to a different local clock. Samples taken against the old clock are discarded.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
        self.reset();
    }

    /// Drop all samples and fall back to a zero offset
    pub fn reset(&mut self) {
        self.window.clear();
        self.offset_ms = 0.0;
        self.rtt_ms = None;
    }

    /// Local time in milliseconds
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Record one probe result.
    ///
    /// `c2s_ms` is server-received minus client-sent, `s2c_ms` is client-received minus
    /// server-sent. Each includes the one-way delay plus or minus the clock offset, so
    /// half their difference is the offset with the delay cancelled out.
    pub fn update(&mut self, c2s_ms: f64, s2c_ms: f64) {
        if self.clock.now_ms() == 0.0 {
            log::debug!("Local clock not started, restarting clock estimation");
            self.reset();
            return;
        }

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((c2s_ms - s2c_ms) / 2.0);
        self.rtt_ms = Some(c2s_ms + s2c_ms);
        self.offset_ms = median(&self.window);
    }

    /// Current offset estimate in milliseconds (server - local), 0 before any sample
    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    /// Translate a local time into server time
    pub fn server_time(&self, local_ms: f64) -> f64 {
        local_ms + self.offset_ms
    }

    /// Current server time estimate
    pub fn server_now(&self) -> f64 {
        self.server_time(self.now_ms())
    }

    /// Samples currently in the window, oldest first
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    /// Number of samples in the window
    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    /// Round trip of the latest probe in milliseconds
    pub fn rtt_ms(&self) -> Option<f64> {
        self.rtt_ms
    }

    /// Get sync quality based on RTT
    pub fn quality(&self) -> SyncQuality {
        match self.rtt_ms {
            Some(rtt) if rtt < 50.0 => SyncQuality::Good,
            Some(rtt) if rtt < 100.0 => SyncQuality::Degraded,
            _ => SyncQuality::Lost,
        }
    }
}

fn median(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
