//! Process-wide `tracing` subscriber setup.

use crate::config::{LogConfig, LogFormat};
use crate::error::PipelineError;
use tracing_subscriber::{EnvFilter, fmt};

/// Builds the level filter; `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()))
}

/// Installs the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), PipelineError> {
  let builder = fmt().with_env_filter(env_filter(config)).with_target(false);
  let installed = match config.format {
    LogFormat::Json => builder.json().flatten_event(true).try_init(),
    LogFormat::Console => builder.try_init(),
  };
  installed.map_err(|e| PipelineError::Config(format!("cannot install logger: {}", e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::LogLevel;

  #[test]
  fn test_second_init_fails() {
    let config = LogConfig {
      level: LogLevel::Warn,
      format: LogFormat::Console,
    };
    // Another test in the binary may have installed one already.
    let _ = init_logging(&config);
    assert!(matches!(init_logging(&config), Err(PipelineError::Config(_))));
  }
}
