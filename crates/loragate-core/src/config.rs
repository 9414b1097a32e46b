//! Configuration system for loragate.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LORAGATE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/loragate/config.toml
//!   3. ~/.config/loragate/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub radio: RadioConfig,
    pub collector: CollectorConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// UDP address the packet forwarder delivers radio frames to.
    pub bind_addr: String,
    /// Single-frame receive buffer. Longer frames are truncated.
    pub receive_buffer_bytes: usize,
    /// Idle sleep between polls when the radio has nothing pending.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Endpoint every packet is POSTed to.
    pub url: String,
    /// Sent as `Authorization: Basic <token>`. Empty = no header.
    pub auth_token: String,
    pub content_type: String,
    /// Per-request transport timeout.
    pub timeout_ms: u64,
    /// PEM trust anchor added to the client's root store.
    pub ca_cert_path: Option<PathBuf>,
    /// Fixed response buffer ceiling. 0 = size from Content-Length.
    pub response_buffer_bytes: usize,
    /// Largest Content-Length the response buffer will be sized to.
    pub max_response_bytes: usize,
    pub max_redirects: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of recent packet identities remembered for deduplication.
    pub dedup_capacity: usize,
    /// Handoff slots between ingest and egress. 1 = strict single slot.
    pub queue_capacity: usize,
    /// Retry-needed re-issues per packet. 0 = unlimited.
    pub max_retries: u32,
    /// Pause between retry-needed re-issues. 0 = yield only, which
    /// re-POSTs to a busy collector as fast as it answers.
    pub retry_backoff_ms: u64,
    /// Upper bound on one packet's delivery, retries included. 0 = none.
    pub send_deadline_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Pause between re-issues while the collector answers 429/503.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            collector: CollectorConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1700".to_string(),
            receive_buffer_bytes: 256,
            poll_interval_ms: 10,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/api/data".to_string(),
            auth_token: String::new(),
            content_type: "application/octet-stream".to_string(),
            timeout_ms: 15_000,
            ca_cert_path: None,
            response_buffer_bytes: 0,
            max_response_bytes: 64 * 1024,
            max_redirects: 3,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 100,
            queue_capacity: 1,
            max_retries: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            send_deadline_ms: 0,
        }
    }
}

impl RadioConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PipelineConfig {
    pub fn max_retries(&self) -> Option<u32> {
        (self.max_retries > 0).then_some(self.max_retries)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn send_deadline(&self) -> Option<Duration> {
        (self.send_deadline_ms > 0).then(|| Duration::from_millis(self.send_deadline_ms))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("loragate")
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
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GatewayConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            GatewayConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LORAGATE_CONFIG")
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
            let text = toml::to_string_pretty(&GatewayConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.dedup_capacity == 0 {
            return Err(ConfigError::Invalid("pipeline.dedup_capacity must be > 0"));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid("pipeline.queue_capacity must be > 0"));
        }
        if self.radio.receive_buffer_bytes == 0 {
            return Err(ConfigError::Invalid("radio.receive_buffer_bytes must be > 0"));
        }
        if self.collector.url.is_empty() {
            return Err(ConfigError::Invalid("collector.url must be set"));
        }
        Ok(())
    }

    /// Apply LORAGATE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Numeric values that fail to parse leave the setting unchanged.
        fn parse<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
            v.and_then(|v| v.trim().parse().ok())
        }

        // [radio]
        if let Some(v) = var("LORAGATE_RADIO__BIND_ADDR") {
            self.radio.bind_addr = v;
        }
        if let Some(n) = parse(var("LORAGATE_RADIO__RECEIVE_BUFFER_BYTES")) {
            self.radio.receive_buffer_bytes = n;
        }
        if let Some(ms) = parse(var("LORAGATE_RADIO__POLL_INTERVAL_MS")) {
            self.radio.poll_interval_ms = ms;
        }

        // [collector]
        if let Some(v) = var("LORAGATE_COLLECTOR__URL") {
            self.collector.url = v;
        }
        if let Some(v) = var("LORAGATE_COLLECTOR__AUTH_TOKEN") {
            self.collector.auth_token = v;
        }
        if let Some(v) = var("LORAGATE_COLLECTOR__CONTENT_TYPE") {
            self.collector.content_type = v;
        }
        if let Some(ms) = parse(var("LORAGATE_COLLECTOR__TIMEOUT_MS")) {
            self.collector.timeout_ms = ms;
        }
        if let Some(v) = var("LORAGATE_COLLECTOR__CA_CERT_PATH") {
            self.collector.ca_cert_path = Some(PathBuf::from(v));
        }
        if let Some(n) = parse(var("LORAGATE_COLLECTOR__RESPONSE_BUFFER_BYTES")) {
            self.collector.response_buffer_bytes = n;
        }
        if let Some(n) = parse(var("LORAGATE_COLLECTOR__MAX_RESPONSE_BYTES")) {
            self.collector.max_response_bytes = n;
        }
        if let Some(n) = parse(var("LORAGATE_COLLECTOR__MAX_REDIRECTS")) {
            self.collector.max_redirects = n;
        }

        // [pipeline]
        if let Some(n) = parse(var("LORAGATE_PIPELINE__DEDUP_CAPACITY")) {
            self.pipeline.dedup_capacity = n;
        }
        if let Some(n) = parse(var("LORAGATE_PIPELINE__QUEUE_CAPACITY")) {
            self.pipeline.queue_capacity = n;
        }
        if let Some(n) = parse(var("LORAGATE_PIPELINE__MAX_RETRIES")) {
            self.pipeline.max_retries = n;
        }
        if let Some(ms) = parse(var("LORAGATE_PIPELINE__RETRY_BACKOFF_MS")) {
            self.pipeline.retry_backoff_ms = ms;
        }
        if let Some(ms) = parse(var("LORAGATE_PIPELINE__SEND_DEADLINE_MS")) {
            self.pipeline.send_deadline_ms = ms;
        }
    }
}
