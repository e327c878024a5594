//! Configuration system for Portage.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PORTAGE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/portage/config.toml
//!   3. ~/.config/portage/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortageConfig {
    pub server: ServerConfig,
    pub push: PushConfig,
    pub pull: PullConfig,
    pub ack: AckConfig,
    pub registry: RegistryConfig,
}

/// Which engine the upstream record stream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Records are actively forwarded to connected clients.
    Push,
    /// Records wait in the pull engine for client batch requests.
    Pull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: String,
    /// TCP listen port.
    pub port: u16,
    /// Delivery mode for incoming records.
    pub mode: DeliveryMode,
    /// SO_SNDBUF for accepted sockets. 0 = leave the OS default.
    pub sndbuf_bytes: usize,
    /// SO_RCVBUF for accepted sockets. 0 = leave the OS default.
    pub rcvbuf_bytes: usize,
    /// Connections silent for longer than this are closed.
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Capacity of the fresh-record queue.
    pub queue_capacity: usize,
    /// Capacity of the failed-packet retry queue.
    pub retry_capacity: usize,
    /// Connection-acquisition attempts per send cycle. Bounds the
    /// selection spin only, never the number of redeliveries.
    pub select_attempts: u32,
    /// Period of the retry-queue re-drive task.
    pub repush_interval_ms: u64,
    /// Sleep between flow-control / selection polls.
    pub poll_backoff_ms: u64,
    /// Outbound packets per second. 0 = unlimited.
    pub flow_rate: u32,
    /// Token-bucket burst size.
    pub flow_burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// Capacity of the fresh-record queue.
    pub queue_capacity: usize,
    /// Capacity of the redelivery retry queue.
    pub retry_capacity: usize,
    /// Max records (or merged retry packets) per batch response.
    pub max_batch_count: u32,
    /// Max cumulative body bytes per batch response.
    pub max_batch_bytes: u64,
    /// How long a suspended pull request may wait before an empty
    /// response is returned.
    pub suspend_timeout_secs: u64,
    /// Fallback re-evaluation period for suspended requests.
    pub hold_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AckConfig {
    /// Delivered packets unacknowledged for longer than this are
    /// re-queued for redelivery.
    pub timeout_secs: u64,
    /// Sweep period for the in-flight ledger.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Topic this proxy serves; scopes the registration path.
    pub topic: String,
    /// Root of the provider registration tree.
    pub root_path: String,
    /// Period of the re-registration task.
    pub reregister_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for PortageConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            push: PushConfig::default(),
            pull: PullConfig::default(),
            ack: AckConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 10666,
            mode: DeliveryMode::Push,
            sndbuf_bytes: 64 * 1024,
            rcvbuf_bytes: 64 * 1024,
            read_timeout_secs: 120,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            retry_capacity: 100,
            select_attempts: 5,
            repush_interval_ms: 3_000,
            poll_backoff_ms: 1,
            flow_rate: 0,
            flow_burst: 32,
        }
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            retry_capacity: 100,
            max_batch_count: 10,
            max_batch_bytes: 8 * 1024 * 1024,
            suspend_timeout_secs: 15,
            hold_poll_interval_ms: 100,
        }
    }
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            sweep_interval_secs: 5,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            topic: "default".to_string(),
            root_path: "/portage/providers".to_string(),
            reregister_interval_secs: 30,
        }
    }
}

// ── Duration accessors ────────────────────────────────────────────────────────

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }
}

impl PushConfig {
    pub fn repush_interval(&self) -> Duration {
        Duration::from_millis(self.repush_interval_ms.max(1))
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms.max(1))
    }
}

impl PullConfig {
    pub fn suspend_timeout(&self) -> Duration {
        Duration::from_secs(self.suspend_timeout_secs)
    }

    pub fn hold_poll_interval(&self) -> Duration {
        Duration::from_millis(self.hold_poll_interval_ms.max(1))
    }
}

impl AckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl RegistryConfig {
    pub fn reregister_interval(&self) -> Duration {
        Duration::from_secs(self.reregister_interval_secs.max(1))
    }

    /// Topic-scoped registration path, e.g. `/portage/providers/orders`.
    pub fn provider_path(&self) -> String {
        format!("{}/{}", self.root_path.trim_end_matches('/'), self.topic)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("portage")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PortageConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            PortageConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PORTAGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PortageConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PORTAGE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PORTAGE_SERVER__PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Ok(v) = std::env::var("PORTAGE_SERVER__MODE") {
            match v.as_str() {
                "push" => self.server.mode = DeliveryMode::Push,
                "pull" => self.server.mode = DeliveryMode::Pull,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("PORTAGE_SERVER__READ_TIMEOUT_SECS") {
            if let Ok(t) = v.parse() {
                self.server.read_timeout_secs = t;
            }
        }
        if let Ok(v) = std::env::var("PORTAGE_PUSH__QUEUE_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.push.queue_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("PORTAGE_PUSH__FLOW_RATE") {
            if let Ok(n) = v.parse() {
                self.push.flow_rate = n;
            }
        }
        if let Ok(v) = std::env::var("PORTAGE_PULL__MAX_BATCH_COUNT") {
            if let Ok(n) = v.parse() {
                self.pull.max_batch_count = n;
            }
        }
        if let Ok(v) = std::env::var("PORTAGE_PULL__MAX_BATCH_BYTES") {
            if let Ok(n) = v.parse() {
                self.pull.max_batch_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("PORTAGE_REGISTRY__TOPIC") {
            self.registry.topic = v;
        }
    }
}
