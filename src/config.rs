//! Pipeline configuration.
//!
//! Loaded from a JSON file; every field is optional.
//!
//! ```json
//! {
//!   "window_size": 4096,
//!   "servers": ["logs-1.internal:7001", "logs-2.internal:7001"],
//!   "token": "s3cret",
//!   "report": "collector.internal:7000",
//!   "on_malformed": "skip",
//!   "prefetch": 64,
//!   "network": { "connect_timeout_ms": 5000, "reconnect_backoff_ms": 250 },
//!   "log": { "level": "debug", "format": "json" }
//! }
//! ```
//!
//! With `discovery` set, the handshake supplies the token and, unless
//! `servers` is given explicitly, the server list. The report endpoint
//! defaults to the discovery endpoint.

use crate::channel::Endpoint;
use crate::discovery::Discovery;
use crate::error::{ErrorStrategy, PipelineError};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

/// Default number of requests per window.
pub const DEFAULT_WINDOW_SIZE: usize = 4096;

/// What to do with a record that does not parse.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
  /// Abort the pipeline with a diagnostic.
  #[default]
  Stop,
  /// Log the record and drop it.
  Skip,
}

impl MalformedPolicy {
  /// The parser error strategy implementing this policy.
  pub fn strategy<T: std::fmt::Debug + Clone + Send + Sync>(self) -> ErrorStrategy<T> {
    match self {
      MalformedPolicy::Stop => ErrorStrategy::Stop,
      MalformedPolicy::Skip => ErrorStrategy::Skip,
    }
  }
}

/// Connection behaviour shared by sources and the reporter.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
  /// Connect timeout in milliseconds.
  pub connect_timeout_ms: u64,
  /// Delay before each reconnect attempt, in milliseconds.
  pub reconnect_backoff_ms: u64,
  /// Consecutive failures tolerated before giving up; unbounded when absent.
  pub max_reconnects: Option<usize>,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      connect_timeout_ms: 10_000,
      reconnect_backoff_ms: 0,
      max_reconnects: None,
    }
  }
}

impl NetworkConfig {
  /// Connect timeout.
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  /// Delay before each reconnect attempt.
  pub fn reconnect_backoff(&self) -> Duration {
    Duration::from_millis(self.reconnect_backoff_ms)
  }

  /// Error strategy for transport failures.
  pub fn reconnect_strategy<T: std::fmt::Debug + Clone + Send + Sync>(&self) -> ErrorStrategy<T> {
    ErrorStrategy::Retry(self.max_reconnects.unwrap_or(usize::MAX))
  }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  /// Very verbose.
  Trace,
  /// Per-user and per-window events.
  Debug,
  /// Normal operation.
  #[default]
  Info,
  /// Reconnects and dropped records.
  Warn,
  /// Fatal failures only.
  Error,
}

impl LogLevel {
  /// Filter directive for this level.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Trace => "trace",
      Self::Debug => "debug",
      Self::Info => "info",
      Self::Warn => "warn",
      Self::Error => "error",
    }
  }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  /// Human-readable output.
  #[default]
  Console,
  /// One JSON object per event.
  Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
  /// Minimum level, overridden by `RUST_LOG`.
  pub level: LogLevel,
  /// Output format.
  pub format: LogFormat,
}

/// Everything needed to run a pipeline.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
  /// Requests per flush window.
  pub window_size: usize,
  /// Log servers to tail.
  pub servers: Vec<Endpoint>,
  /// Credential sent as the first line of every connection.
  pub token: Option<String>,
  /// Handshake endpoint.
  pub discovery: Option<Endpoint>,
  /// Report endpoint; defaults to `discovery`.
  pub report: Option<Endpoint>,
  /// Handling of malformed records.
  pub on_malformed: MalformedPolicy,
  /// Per-source read-ahead queue capacity; sources are read inline when absent.
  pub prefetch: Option<usize>,
  /// Drop users idle for this many windows; never when absent.
  pub evict_idle_epochs: Option<u64>,
  /// Flush partially filled windows when the sources end.
  pub flush_on_shutdown: bool,
  /// Connection behaviour.
  pub network: NetworkConfig,
  /// Logging.
  pub log: LogConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      window_size: DEFAULT_WINDOW_SIZE,
      servers: Vec::new(),
      token: None,
      discovery: None,
      report: None,
      on_malformed: MalformedPolicy::default(),
      prefetch: None,
      evict_idle_epochs: None,
      flush_on_shutdown: false,
      network: NetworkConfig::default(),
      log: LogConfig::default(),
    }
  }
}

impl PipelineConfig {
  /// A configuration tailing `servers` and reporting to `report`.
  pub fn new(servers: Vec<Endpoint>, report: Endpoint) -> Self {
    Self {
      servers,
      report: Some(report),
      ..Self::default()
    }
  }

  /// Parses a JSON document.
  pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
    serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))
  }

  /// Reads and parses a JSON file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
      .map_err(|e| PipelineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    Self::from_json_str(&text)
  }

  /// Where statistic records are sent.
  pub fn report_endpoint(&self) -> Option<&Endpoint> {
    self.report.as_ref().or(self.discovery.as_ref())
  }

  /// The window size as a non-zero count.
  pub fn window(&self) -> Result<NonZeroUsize, PipelineError> {
    NonZeroUsize::new(self.window_size)
      .ok_or_else(|| PipelineError::Config("window_size must be greater than zero".to_string()))
  }

  /// Takes the token and, if none were configured, the servers from a handshake.
  pub fn apply_discovery(&mut self, discovery: Discovery) {
    self.token = Some(discovery.token);
    if self.servers.is_empty() {
      self.servers = discovery.servers;
    }
  }

  /// Checks that the configuration can run.
  pub fn validate(&self) -> Result<(), PipelineError> {
    self.window()?;
    if self.servers.is_empty() {
      return Err(PipelineError::Config("no log servers configured".to_string()));
    }
    if self.report_endpoint().is_none() {
      return Err(PipelineError::Config("no report endpoint configured".to_string()));
    }
    if self.prefetch == Some(0) {
      return Err(PipelineError::Config("prefetch must be greater than zero".to_string()));
    }
    if self.evict_idle_epochs == Some(0) {
      return Err(PipelineError::Config(
        "evict_idle_epochs must be greater than zero".to_string(),
      ));
    }
    Ok(())
  }
}
