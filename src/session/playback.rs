// ABOUTME: Per-connection playback session, the aggregate root of client state
// ABOUTME: Routes decoded frames to the clock, jitter buffer and scheduler without doing I/O

use crate::audio::decode::{Decoder, PcmDecoder};
use crate::audio::{AudioBackend, AudioChunk, AudioOutput, PlaybackBuffer, SampleFormat, Volume};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::protocol::messages::{CodecHeader, ServerSettings, TimeProbe};
use crate::protocol::wire::{Frame, FrameBody, FrameHeader, TimeValue};
use crate::scheduler::{JitterBuffer, JitterStats, PlaybackScheduler};
use crate::sync::{Clock, ClockSync, SystemClock};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Buffer depth assumed until the server sends its settings
pub const DEFAULT_BUFFER_DEPTH_MS: f64 = 1000.0;

/// Unanswered time requests remembered per clock; older ids are forgotten
const MAX_PENDING_PROBES: usize = 16;

/// Output, jitter buffer and scheduler for the stream announced by a codec header
struct ActiveStream {
    format: SampleFormat,
    jitter: JitterBuffer,
    scheduler: PlaybackScheduler,
    output: Box<dyn AudioOutput>,
    completed: mpsc::UnboundedReceiver<PlaybackBuffer>,
}

/// State for one connection. Nothing here survives a reconnect.
pub struct PlaybackSession {
    config: Arc<ClientConfig>,
    backend: Arc<dyn AudioBackend>,
    sync: ClockSync,
    settings: Option<ServerSettings>,
    volume: Volume,
    stream: Option<ActiveStream>,
    probe_due: bool,
    /// Ids of time requests sent on the current clock
    pending_probes: VecDeque<u16>,
}

impl PlaybackSession {
    /// Start a session measuring time on the system clock until an output opens
    pub fn new(config: Arc<ClientConfig>, backend: Arc<dyn AudioBackend>) -> Self {
        Self::with_clock(config, backend, Arc::new(SystemClock::new()))
    }

    /// Start a session on a specific pre-output clock
    pub fn with_clock(
        config: Arc<ClientConfig>,
        backend: Arc<dyn AudioBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sync = ClockSync::new(clock, config.sync.window);
        Self {
            config,
            backend,
            sync,
            settings: None,
            volume: Volume::default(),
            stream: None,
            probe_due: false,
            pending_probes: VecDeque::with_capacity(MAX_PENDING_PROBES),
        }
    }

    /// Route one received frame.
    ///
    /// The frame's `received` time is stamped here, so this must be called as soon as
    /// the frame arrives. Format errors are returned as fatal errors; the session
    /// stays inactive.
    pub fn handle_frame(&mut self, mut frame: Frame) -> Result<(), Error> {
        frame.header.received = TimeValue::from_ms(self.sync.now_ms());
        let header = frame.header;

        match frame.body {
            FrameBody::Time(probe) => self.on_time_reply(&header, probe),
            FrameBody::WireChunk(chunk) => {
                let server_now = self.sync.server_now();
                match self.stream.as_mut() {
                    Some(stream) => stream.jitter.add_chunk(
                        AudioChunk::new(chunk.timestamp, stream.format, chunk.payload),
                        server_now,
                    ),
                    None => log::debug!("Dropping audio chunk received before codec header"),
                }
            }
            FrameBody::CodecHeader(header) => self.start_stream(&header)?,
            FrameBody::ServerSettings(settings) => self.apply_settings(settings),
            FrameBody::StreamTags(_) => log::trace!("Ignoring stream tags"),
            FrameBody::Hello(_) => log::warn!("Ignoring unexpected hello from server"),
        }
        Ok(())
    }

    fn on_time_reply(&mut self, header: &FrameHeader, probe: TimeProbe) {
        // Only replies to requests timed on the current clock are comparable
        let Some(pos) = self.pending_probes.iter().position(|&id| id == header.refers_to) else {
            log::debug!(
                "Ignoring time reply to request {} not sent on the current clock",
                header.refers_to
            );
            return;
        };
        self.pending_probes.remove(pos);

        let c2s = probe.latency.to_ms();
        let s2c = header.received.to_ms() - header.sent.to_ms();
        self.sync.update(c2s, s2c);
        log::trace!(
            "Time probe {}: offset {:.3}ms over {} samples, quality {:?}",
            header.refers_to,
            self.sync.offset_ms(),
            self.sync.sample_count(),
            self.sync.quality()
        );
    }

    fn start_stream(&mut self, header: &CodecHeader) -> Result<(), Error> {
        let decoder = PcmDecoder::from_codec_header(header).map_err(|e| {
            log::error!("Cannot play stream: {}", e);
            e
        })?;
        let format = *decoder.format();

        // Release the previous device before opening the next one
        self.stream = None;

        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let mut output = self.backend.open(&format, completed_tx)?;
        self.sync.set_clock(output.clock());
        self.pending_probes.clear();
        self.probe_due = true;

        let depth = self
            .settings
            .map(|s| s.buffer_depth_ms())
            .unwrap_or(DEFAULT_BUFFER_DEPTH_MS);
        let mut jitter = JitterBuffer::new(Box::new(decoder), &self.config.sync, depth);
        jitter.set_volume(self.volume);

        let mut scheduler = PlaybackScheduler::new(&format, &self.config.playback);
        scheduler.start(&mut jitter, &self.sync, output.as_mut())?;

        log::info!(
            "Stream started: {} {}Hz {}ch {}bit, buffer {:.0}ms",
            header.codec,
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
            depth
        );

        self.stream = Some(ActiveStream {
            format,
            jitter,
            scheduler,
            output,
            completed: completed_rx,
        });
        Ok(())
    }

    fn apply_settings(&mut self, settings: ServerSettings) {
        log::debug!(
            "Server settings: buffer {}ms, latency {}ms, volume {}%, muted {}",
            settings.buffer_ms,
            settings.latency,
            settings.volume,
            settings.muted
        );
        self.settings = Some(settings);
        self.volume = Volume::new(settings.volume, settings.muted);
        if let Some(stream) = self.stream.as_mut() {
            stream.jitter.set_buffer_depth(settings.buffer_depth_ms());
            stream.jitter.set_volume(self.volume);
        }
    }

    /// Wait for the output to finish a buffer. Never resolves while no stream is playing.
    pub async fn next_completion(&mut self) -> Option<PlaybackBuffer> {
        match self.stream.as_mut() {
            Some(stream) => stream.completed.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Recycle a finished buffer and schedule the next one
    pub fn on_buffer_complete(&mut self, buffer: PlaybackBuffer) -> Result<(), Error> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        stream.scheduler.on_buffer_complete(
            buffer,
            &mut stream.jitter,
            &self.sync,
            stream.output.as_mut(),
        )
    }

    /// Body and send time for the next clock probe.
    ///
    /// Pass the id the frame was sent with to [`probe_sent`](Self::probe_sent).
    pub fn time_probe(&mut self) -> (FrameBody, TimeValue) {
        self.probe_due = false;
        (
            FrameBody::Time(TimeProbe::default()),
            TimeValue::from_ms(self.sync.now_ms()),
        )
    }

    /// Record the frame id a time request went out with, so its reply is accepted
    pub fn probe_sent(&mut self, id: u16) {
        if self.pending_probes.len() == MAX_PENDING_PROBES {
            self.pending_probes.pop_front();
        }
        self.pending_probes.push_back(id);
    }

    /// Whether a probe should go out now rather than at the next tick
    pub fn probe_due(&self) -> bool {
        self.probe_due
    }

    /// Set gain; takes effect from the next filled buffer
    pub fn set_volume(&mut self, volume: Volume) {
        self.volume = volume;
        if let Some(stream) = self.stream.as_mut() {
            stream.jitter.set_volume(volume);
        }
    }

    /// Stop scheduling and release the output
    pub fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.scheduler.stop();
            log::debug!(
                "Stream stopped after {} fills",
                stream.jitter.stats().fills
            );
        }
    }

    /// Whether a stream is playing
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Format of the playing stream
    pub fn format(&self) -> Option<SampleFormat> {
        self.stream.as_ref().map(|s| s.format)
    }

    /// Current gain
    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Latest server settings
    pub fn settings(&self) -> Option<ServerSettings> {
        self.settings
    }

    /// Clock synchronizer
    pub fn clock_sync(&self) -> &ClockSync {
        &self.sync
    }

    /// Jitter buffer of the playing stream
    pub fn jitter_buffer(&self) -> Option<&JitterBuffer> {
        self.stream.as_ref().map(|s| &s.jitter)
    }

    /// Diagnostics of the playing stream
    pub fn jitter_stats(&self) -> Option<JitterStats> {
        self.jitter_buffer().map(JitterBuffer::stats)
    }

    /// Scheduler of the playing stream
    pub fn scheduler(&self) -> Option<&PlaybackScheduler> {
        self.stream.as_ref().map(|s| &s.scheduler)
    }
}
