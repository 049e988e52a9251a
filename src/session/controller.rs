// ABOUTME: Session controller owning the connection lifecycle
// ABOUTME: Handshake, reconnect loop, clock probing, and the host control surface

use crate::audio::{AudioBackend, Volume};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::protocol::client::{FrameReader, FrameWriter, ProtocolClient};
use crate::protocol::messages::{Hello, DEFAULT_MAC, PROTOCOL_VERSION};
use crate::protocol::wire::TimeValue;
use crate::session::identity::IdentityStore;
use crate::session::playback::PlaybackSession;
use crate::sync::{Clock, SystemClock};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not running, either never started, stopped, or ended by a fatal error
    Disconnected,
    /// Opening the transport, or connected and waiting for a playable stream
    Connecting,
    /// Playing a stream
    Active,
}

enum Command {
    SetVolume(Volume),
}

/// Why a single connection ended without an error
enum ConnectionEnd {
    /// The host dropped the command channel
    Stopped,
}

/// State shared between the host handle and the running loop.
///
/// `run_id` changes on every `start`/`stop`, so a loop that was already aborted
/// cannot overwrite the state published after it.
struct Shared {
    run_id: u64,
    state: watch::Sender<ConnectionState>,
    fatal: Option<String>,
}

impl Shared {
    fn publish(&mut self, run_id: u64, state: ConnectionState) {
        if self.run_id == run_id {
            self.state.send_if_modified(|current| {
                let changed = *current != state;
                *current = state;
                changed
            });
        }
    }
}

/// Host-facing control surface: start, stop, volume, and status
pub struct SessionController {
    config: Arc<ClientConfig>,
    identity: Arc<dyn IdentityStore>,
    backend: Arc<dyn AudioBackend>,
    shared: Arc<Mutex<Shared>>,
    state_rx: watch::Receiver<ConnectionState>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Create a stopped controller
    pub fn new(
        config: ClientConfig,
        identity: Arc<dyn IdentityStore>,
        backend: Arc<dyn AudioBackend>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config: Arc::new(config),
            identity,
            backend,
            shared: Arc::new(Mutex::new(Shared {
                run_id: 0,
                state: state_tx,
                fatal: None,
            })),
            state_rx,
            commands: None,
            task: None,
        }
    }

    /// Start connecting. Does nothing if already running.
    ///
    /// Returns `Error::Config` without connecting if the configuration is invalid.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        self.config.validate()?;
        let client_id = self.identity.ensure()?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let run_id = {
            let mut shared = self.shared.lock();
            shared.run_id += 1;
            shared.fatal = None;
            let run_id = shared.run_id;
            shared.publish(run_id, ConnectionState::Connecting);
            run_id
        };

        let runner = Runner {
            run_id,
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            client_id,
            commands: commands_rx,
        };

        self.commands = Some(commands_tx);
        self.task = Some(tokio::spawn(runner.run()));
        Ok(())
    }

    /// Stop playback and close the connection. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.commands = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let mut shared = self.shared.lock();
        shared.run_id += 1;
        let run_id = shared.run_id;
        shared.publish(run_id, ConnectionState::Disconnected);
    }

    /// Set volume and mute for the running session
    pub fn set_volume(&self, percent: u8, muted: bool) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::SetVolume(Volume::new(percent, muted)));
        }
    }

    /// Whether a stream is playing
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The error that ended the last run, if it was fatal
    pub fn fatal_error(&self) -> Option<String> {
        self.shared.lock().fatal.clone()
    }

    /// Stable id sent in the handshake
    pub fn client_id(&self) -> Result<String, Error> {
        self.identity.ensure()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The reconnect loop, running as a single task
struct Runner {
    run_id: u64,
    config: Arc<ClientConfig>,
    backend: Arc<dyn AudioBackend>,
    shared: Arc<Mutex<Shared>>,
    client_id: String,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Runner {
    async fn run(mut self) {
        let policy = self.config.reconnect.clone();
        let mut failures = 0u32;

        loop {
            self.publish(ConnectionState::Connecting);

            let mut reached_active = false;
            match self.run_connection(&mut reached_active).await {
                Ok(ConnectionEnd::Stopped) => break,
                Err(e) if e.is_fatal() => {
                    log::error!("Session ended: {}", e);
                    self.shared.lock().fatal = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    if reached_active {
                        failures = 0;
                    }
                    failures += 1;
                    if policy.is_exhausted(failures) {
                        log::warn!("Giving up after {} failed attempts: {}", failures, e);
                        break;
                    }
                    log::warn!(
                        "Connection lost ({}), reconnecting in {}ms",
                        e,
                        policy.backoff_ms
                    );
                }
            }

            self.publish(ConnectionState::Connecting);
            sleep(policy.backoff()).await;
        }

        self.publish(ConnectionState::Disconnected);
    }

    /// One connection, from handshake until it fails or the host stops it.
    /// Every call starts from a fresh `PlaybackSession`.
    async fn run_connection(&mut self, reached_active: &mut bool) -> Result<ConnectionEnd, Error> {
        let clock = SystemClock::new();
        let mut session = PlaybackSession::with_clock(
            Arc::clone(&self.config),
            Arc::clone(&self.backend),
            Arc::new(clock.clone()),
        );

        let hello = build_hello(&self.config, &self.client_id);
        let sent = TimeValue::from_ms(clock.now_ms());
        let (mut writer, mut reader) =
            ProtocolClient::connect(&self.config.server_url, hello, sent).await?;

        let mut probes = interval(self.config.sync.probe_interval());
        probes.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = self
            .drive(&mut session, &mut writer, &mut reader, &mut probes, reached_active)
            .await;

        session.shutdown();
        if let Err(e) = writer.close().await {
            log::debug!("Closing connection: {}", e);
        }
        result
    }

    async fn drive(
        &mut self,
        session: &mut PlaybackSession,
        writer: &mut FrameWriter,
        reader: &mut FrameReader,
        probes: &mut tokio::time::Interval,
        reached_active: &mut bool,
    ) -> Result<ConnectionEnd, Error> {
        loop {
            tokio::select! {
                frame = reader.next_frame() => {
                    let frame = frame?
                        .ok_or_else(|| Error::Connection("Server closed the connection".to_string()))?;
                    session.handle_frame(frame)?;

                    if session.is_active() && !*reached_active {
                        *reached_active = true;
                        self.publish(ConnectionState::Active);
                    }
                    if session.probe_due() {
                        send_time_probe(session, writer).await?;
                    }
                }
                _ = probes.tick() => send_time_probe(session, writer).await?,
                Some(buffer) = session.next_completion() => {
                    session.on_buffer_complete(buffer)?;
                }
                command = self.commands.recv() => match command {
                    Some(Command::SetVolume(volume)) => session.set_volume(volume),
                    None => return Ok(ConnectionEnd::Stopped),
                },
            }
        }
    }

    fn publish(&self, state: ConnectionState) {
        self.shared.lock().publish(self.run_id, state);
    }
}

async fn send_time_probe(
    session: &mut PlaybackSession,
    writer: &mut FrameWriter,
) -> Result<(), Error> {
    let (body, sent) = session.time_probe();
    let id = writer.send(body, sent).await?;
    session.probe_sent(id);
    Ok(())
}

fn build_hello(config: &ClientConfig, client_id: &str) -> Hello {
    Hello {
        mac: DEFAULT_MAC.to_string(),
        host_name: config.resolved_host_name(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        client_name: config.client_name.clone(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        instance: config.instance,
        id: client_id.to_string(),
        protocol_version: PROTOCOL_VERSION,
    }
}
