use clap::Parser;
use logweave::{
  Endpoint, LogPipeline, PipelineConfig, PipelineError, TcpConnector, handshake, logging,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
  name = "logweave",
  version,
  about = "Aggregate per-user statistics from streaming HTTP access logs"
)]
struct Cli {
  /// JSON configuration file
  #[arg(long, env = "LOGWEAVE_CONFIG")]
  config: Option<PathBuf>,

  /// Discovery endpoint supplying the token and log servers
  #[arg(long, value_name = "HOST:PORT")]
  discover: Option<Endpoint>,

  /// Log server to tail (repeatable)
  #[arg(long = "server", value_name = "HOST:PORT")]
  servers: Vec<Endpoint>,

  /// Report endpoint
  #[arg(long, value_name = "HOST:PORT")]
  report: Option<Endpoint>,

  /// Access token
  #[arg(long, env = "LOGWEAVE_TOKEN")]
  token: Option<String>,

  /// Requests per reporting window
  #[arg(long)]
  window_size: Option<usize>,
}

impl Cli {
  fn into_config(self) -> Result<PipelineConfig, PipelineError> {
    let mut config = match &self.config {
      Some(path) => PipelineConfig::from_file(path)?,
      None => PipelineConfig::default(),
    };
    if self.discover.is_some() {
      config.discovery = self.discover;
    }
    if !self.servers.is_empty() {
      config.servers = self.servers;
    }
    if self.report.is_some() {
      config.report = self.report;
    }
    if self.token.is_some() {
      config.token = self.token;
    }
    if let Some(window_size) = self.window_size {
      config.window_size = window_size;
    }
    Ok(config)
  }
}

async fn run(mut config: PipelineConfig) -> Result<(), PipelineError> {
  let connector = Arc::new(TcpConnector::new(config.network.connect_timeout()));

  if let Some(endpoint) = config.discovery.clone() {
    let discovery = handshake(connector.as_ref(), &endpoint).await?;
    config.apply_discovery(discovery);
  }

  let pipeline = LogPipeline::new(config, connector)?;
  let shutdown = CancellationToken::new();
  let on_signal = shutdown.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::info!("Interrupted, shutting down");
      on_signal.cancel();
    }
  });

  let summary = pipeline.run(shutdown).await?;
  tracing::info!(
    requests = summary.requests,
    records_reported = summary.records_reported,
    "Done"
  );
  Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
  let config = match Cli::parse().into_config() {
    Ok(config) => config,
    Err(e) => {
      eprintln!("logweave: {e}");
      return ExitCode::from(2);
    }
  };

  if let Err(e) = logging::init_logging(&config.log) {
    eprintln!("logweave: {e}");
    return ExitCode::from(2);
  }

  match run(config).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      tracing::error!(error = %e, "logweave failed");
      ExitCode::FAILURE
    }
  }
}
