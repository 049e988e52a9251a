// ABOUTME: cpal-based audio output
// ABOUTME: Renders scheduled buffers at their start frame on a dedicated audio thread

use crate::audio::output::{AudioBackend, AudioOutput, PlaybackBuffer};
use crate::audio::SampleFormat;
use crate::error::Error;
use crate::sync::Clock;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedSender;

/// Hardware clock counting frames handed to the device
#[derive(Debug)]
pub struct DeviceClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl DeviceClock {
    fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

impl Clock for DeviceClock {
    fn now_ms(&self) -> f64 {
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Opens the host's default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open(
        &self,
        format: &SampleFormat,
        completed: UnboundedSender<PlaybackBuffer>,
    ) -> Result<Box<dyn AudioOutput>, Error> {
        Ok(Box::new(CpalOutput::new(*format, completed)?))
    }
}

/// Audio output backed by a cpal stream.
///
/// cpal streams are not `Send`, so the stream lives on its own thread for the
/// lifetime of this handle; buffers reach it over a channel.
pub struct CpalOutput {
    clock: Arc<DeviceClock>,
    latency_us: Arc<AtomicU64>,
    scheduled: Sender<PlaybackBuffer>,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device at the stream's sample rate
    pub fn new(
        format: SampleFormat,
        completed: UnboundedSender<PlaybackBuffer>,
    ) -> Result<Self, Error> {
        let clock = Arc::new(DeviceClock::new(format.sample_rate));
        let latency_us = Arc::new(AtomicU64::new(0));
        let (scheduled_tx, scheduled_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), Error>>(1);

        let renderer = Renderer {
            pending: scheduled_rx,
            current: None,
            completed,
            clock: Arc::clone(&clock),
            latency_us: Arc::clone(&latency_us),
            frames_per_ms: format.ms_rate(),
        };

        let thread = std::thread::Builder::new()
            .name("snapsync-audio".to_string())
            .spawn(move || {
                let stream = match build_stream(&format, renderer) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until the handle is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                log::debug!("Audio output stream closed");
            })
            .map_err(|e| Error::Output(format!("Failed to spawn audio thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Output("Audio thread exited during startup".to_string()))??;

        log::info!(
            "Audio output opened: {}Hz {}ch",
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            clock,
            latency_us,
            scheduled: scheduled_tx,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn latency_ms(&self) -> f64 {
        self.latency_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<(), Error> {
        self.scheduled
            .send(buffer)
            .map_err(|_| Error::Output("Audio thread is gone".to_string()))
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_stream(format: &SampleFormat, mut renderer: Renderer) -> Result<cpal::Stream, Error> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Output("No output device available".to_string()))?;

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                let ts = info.timestamp();
                if let Some(latency) = ts.playback.duration_since(&ts.callback) {
                    renderer
                        .latency_us
                        .store(latency.as_micros() as u64, Ordering::Relaxed);
                }
                renderer.render(data);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| Error::Output(format!("Failed to build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| Error::Output(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

/// Audio-thread side: copies scheduled buffers into the device at their start frame
struct Renderer {
    pending: Receiver<PlaybackBuffer>,
    current: Option<(PlaybackBuffer, usize)>,
    completed: UnboundedSender<PlaybackBuffer>,
    clock: Arc<DeviceClock>,
    latency_us: Arc<AtomicU64>,
    frames_per_ms: f64,
}

impl Renderer {
    fn render(&mut self, data: &mut [f32]) {
        let mut position = self.clock.frames();
        let mut frames = 0;
        for frame in data.chunks_exact_mut(2) {
            let [left, right] = self.next_frame(position);
            frame[0] = left;
            frame[1] = right;
            position += 1;
            frames += 1;
        }
        self.clock.advance(frames);
    }

    fn next_frame(&mut self, position: u64) -> [f32; 2] {
        if self.current.is_none() {
            self.current = self.pending.try_recv().ok().map(|buffer| (buffer, 0));
        }

        let Some((buffer, offset)) = self.current.as_mut() else {
            return [0.0; 2];
        };

        // Hold silence until the buffer's start frame; a late buffer starts immediately
        let start_frame = (buffer.start_ms * self.frames_per_ms).round().max(0.0) as u64;
        if *offset == 0 && position < start_frame {
            return [0.0; 2];
        }

        let index = *offset * 2;
        let frame = match buffer.samples.get(index..index + 2) {
            Some(&[left, right]) => [left, right],
            _ => [0.0; 2],
        };
        *offset += 1;

        if *offset * 2 >= buffer.samples.len() {
            if let Some((done, _)) = self.current.take() {
                let _ = self.completed.send(done);
            }
        }
        frame
    }
}
