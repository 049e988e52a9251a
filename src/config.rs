// ABOUTME: Client configuration with defaults and TOML loading
// ABOUTME: Playback sizing, clock sync tunables, and the reconnect policy

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the stream endpoint
    pub server_url: String,
    /// Display name sent in the handshake
    pub client_name: String,
    /// Host name sent in the handshake; `HOSTNAME` or `"localhost"` when unset
    pub host_name: Option<String>,
    /// Instance number, distinguishing several clients on one host
    pub instance: u32,
    /// File holding the persisted client id; platform data dir when unset
    pub identity_path: Option<PathBuf>,
    /// Output ring sizing
    pub playback: PlaybackConfig,
    /// Clock probing and hard-sync tuning
    pub sync: SyncConfig,
    /// Retry behavior after a lost connection
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:1780/stream".to_string(),
            client_name: "snapsync".to_string(),
            host_name: None,
            instance: 1,
            identity_path: None,
            playback: PlaybackConfig::default(),
            sync: SyncConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Reject values the playback path cannot work with
    pub fn validate(&self) -> Result<(), Error> {
        if self.playback.buffer_duration_ms == 0 {
            return Err(Error::Config("playback.buffer_duration_ms must be > 0".to_string()));
        }
        if self.playback.buffer_count == 0 {
            return Err(Error::Config("playback.buffer_count must be > 0".to_string()));
        }
        if self.sync.window == 0 {
            return Err(Error::Config("sync.window must be > 0".to_string()));
        }
        if self.sync.probe_interval_ms == 0 {
            return Err(Error::Config("sync.probe_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Host name for the handshake
    pub fn resolved_host_name(&self) -> String {
        self.host_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

/// Output ring sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Duration of each output buffer
    pub buffer_duration_ms: u32,
    /// Buffers kept in flight
    pub buffer_count: usize,
    /// Lead time before the first buffer starts
    pub start_delay_ms: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 80,
            buffer_count: 3,
            start_delay_ms: 100,
        }
    }
}

/// Clock probing and drift correction tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between time probes
    pub probe_interval_ms: u64,
    /// Offset samples kept for the median
    pub window: usize,
    /// Misalignment below which no correction is applied
    pub hard_sync_threshold_ms: f64,
    /// Age beyond the buffer depth after which queued chunks are dropped
    pub stale_chunk_ceiling_ms: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 1000,
            window: 100,
            hard_sync_threshold_ms: 5.0,
            stale_chunk_ceiling_ms: 5000.0,
        }
    }
}

impl SyncConfig {
    /// Probe interval as a duration
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// How the controller retries after a transport or protocol failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Wait between attempts
    pub backoff_ms: u64,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: 1000,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff as a duration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Whether `failures` consecutive failures exhaust the policy
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}
