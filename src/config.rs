// Configuration schema for the pulsewire liveness roles.
// Numan Thabit 2026

use std::{
    env, fs,
    io::{self, Read},
    ops::RangeInclusive,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::wire::PING_TOKEN_LEN;

/// Error returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when reading a configuration file from disk.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// Error when parsing the configuration contents.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration did not pass validation checks.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Runtime configuration shared by the coordinator and responder roles.
///
/// Every knob has a default matching the protocol constants, so an absent
/// config file yields a working setup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Socket and event-loop parameters.
    pub net: Net,
    /// Peer registry bounds.
    pub registry: RegistryLimits,
    /// Keepalive failure-detection policy.
    pub keepalive: Keepalive,
    /// Latency probe schedule.
    pub ping: Ping,
    /// Responder announcement schedule.
    pub hello: Hello,
}

impl Config {
    /// Loads configuration from `PULSEWIRE_CONFIG` if set, otherwise returns defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var("PULSEWIRE_CONFIG") {
            Ok(path) => Self::from_path(path),
            Err(_missing) => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    /// Loads a configuration file from the provided path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from any reader implementing [`Read`].
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ConfigError> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(|source| ConfigError::Io {
                path: PathBuf::from("<reader>"),
                source,
            })?;
        Self::from_toml_str(&buf)
    }

    /// Loads configuration from a TOML string slice.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        <Self as FromStr>::from_str(input)
    }

    /// Validates the configuration, returning an error when constraints are violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.net.validate().map_err(ConfigError::Validation)?;
        self.registry.validate().map_err(ConfigError::Validation)?;
        self.keepalive.validate().map_err(ConfigError::Validation)?;
        self.ping.validate().map_err(ConfigError::Validation)?;
        self.hello.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Socket and event-loop parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Net {
    /// UDP port to bind; the coordinator's is well known to responders.
    pub port: u16,
    /// Receive buffer size in bytes, the datagram size ceiling.
    pub recv_buffer_bytes: usize,
    /// Readiness-poll timeout in milliseconds; bounds loop reaction latency.
    pub poll_timeout_ms: u64,
}

impl Net {
    /// Readiness-poll timeout as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("net.port must be non-zero".into());
        }
        if self.recv_buffer_bytes < PING_TOKEN_LEN + 2 {
            return Err(format!(
                "net.recv_buffer_bytes must hold a full pong frame (at least {})",
                PING_TOKEN_LEN + 2
            ));
        }
        if self.poll_timeout_ms == 0 || self.poll_timeout_ms > 60_000 {
            return Err("net.poll_timeout_ms must lie within 1..=60000".into());
        }
        Ok(())
    }
}

impl Default for Net {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            recv_buffer_bytes: DEFAULT_RECV_BUFFER_BYTES,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

/// Peer registry bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryLimits {
    /// Maximum number of tracked peers; later HELLOs are dropped.
    pub max_peers: usize,
}

impl RegistryLimits {
    fn validate(&self) -> Result<(), String> {
        if self.max_peers == 0 {
            return Err("registry.max_peers must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

/// Keepalive failure-detection policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Keepalive {
    /// Interval between REQUEST probes per peer, in milliseconds.
    pub interval_ms: u64,
    /// Consecutive unanswered probes before a peer is marked down.
    pub failure_threshold: u32,
}

impl Keepalive {
    /// Probe interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("keepalive.interval_ms must be non-zero".into());
        }
        if self.failure_threshold == 0 {
            return Err("keepalive.failure_threshold must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Latency probe schedule. The firing interval is redrawn uniformly from
/// this range after every firing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ping {
    /// Lower bound of the probe interval, in milliseconds.
    pub min_interval_ms: u64,
    /// Upper bound of the probe interval, in milliseconds.
    pub max_interval_ms: u64,
}

impl Ping {
    /// Inclusive interval range to draw from.
    pub fn interval_range(&self) -> RangeInclusive<Duration> {
        Duration::from_millis(self.min_interval_ms)..=Duration::from_millis(self.max_interval_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.min_interval_ms == 0 {
            return Err("ping.min_interval_ms must be non-zero".into());
        }
        if self.max_interval_ms < self.min_interval_ms {
            return Err("ping.max_interval_ms must be >= min_interval_ms".into());
        }
        Ok(())
    }
}

impl Default for Ping {
    fn default() -> Self {
        Self {
            min_interval_ms: DEFAULT_PING_MIN_INTERVAL_MS,
            max_interval_ms: DEFAULT_PING_MAX_INTERVAL_MS,
        }
    }
}

/// Responder announcement schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Hello {
    /// Period between HELLO announcements, in milliseconds.
    pub interval_ms: u64,
}

impl Hello {
    /// Announcement period as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("hello.interval_ms must be non-zero".into());
        }
        Ok(())
    }
}

impl Default for Hello {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HELLO_INTERVAL_MS,
        }
    }
}

/// Well-known coordinator port.
pub const DEFAULT_PORT: u16 = 1305;

const DEFAULT_RECV_BUFFER_BYTES: usize = 1024;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
const DEFAULT_MAX_PEERS: usize = 10;
const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 270;
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_PING_MIN_INTERVAL_MS: u64 = 1500;
const DEFAULT_PING_MAX_INTERVAL_MS: u64 = 2550;
const DEFAULT_HELLO_INTERVAL_MS: u64 = 5000;
