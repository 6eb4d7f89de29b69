//! Pipeline assembly and drive loop.
//!
//! ```text
//! LogSourceProducer ─ RequestParserTransformer ─┐
//! LogSourceProducer ─ RequestParserTransformer ─┼─ RoundRobinMergeTransformer ─ analyzer ─ reporter
//! LogSourceProducer ─ RequestParserTransformer ─┘
//! ```
//!
//! [`LogPipeline::run`] pulls merged requests and pushes each one through the
//! analyzer until every source has ended, a fatal error surfaces, or the
//! shutdown token fires. The reporter is closed on every exit path; the
//! analyzer's final partial-window flush only happens when the sources ended
//! on their own.

use crate::aggregators;
use crate::channel::Connector;
use crate::config::PipelineConfig;
use crate::consumer::{Consumer, DynConsumer};
use crate::consumers::{
  AggregatorConsumer, EvictIdle, FanoutConsumer, PerUserRouter, ReportConsumer, SharedConsumer,
};
use crate::error::PipelineError;
use crate::producer::Producer;
use crate::producers::LogSourceProducer;
use crate::request::{Item, Request};
use crate::stat::{StatKind, StatRecord};
use crate::transformer::Transformer;
use crate::transformers::{RequestParserTransformer, RoundRobinMergeTransformer};
use futures::{Stream, StreamExt};
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Merged stream of parsed requests from every source.
pub type RequestStream = Pin<Box<dyn Stream<Item = Result<Request, PipelineError>> + Send>>;

/// Totals for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
  /// Requests pushed into the analyzer.
  pub requests: u64,
  /// Statistic records written to the report endpoint.
  pub records_reported: u64,
}

enum End {
  Exhausted,
  Cancelled,
}

/// A configured log analysis pipeline.
pub struct LogPipeline {
  config: PipelineConfig,
  window: NonZeroUsize,
  connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for LogPipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LogPipeline")
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

impl LogPipeline {
  /// Validates `config` and prepares a pipeline connecting through `connector`.
  pub fn new(config: PipelineConfig, connector: Arc<dyn Connector>) -> Result<Self, PipelineError> {
    config.validate()?;
    let window = config.window()?;
    Ok(Self {
      config,
      window,
      connector,
    })
  }

  /// The configuration this pipeline runs with.
  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  fn source(&self, endpoint: &crate::channel::Endpoint) -> LogSourceProducer {
    let network = &self.config.network;
    let mut source = LogSourceProducer::new(endpoint.clone(), Arc::clone(&self.connector))
      .with_reconnect_backoff(network.reconnect_backoff())
      .with_error_strategy(network.reconnect_strategy());
    if let Some(token) = &self.config.token {
      source = source.with_token(token.clone());
    }
    source
  }

  /// Builds one reader and parser per server and merges them round-robin.
  pub async fn request_stream(&self) -> RequestStream {
    let mut parsed = Vec::with_capacity(self.config.servers.len());
    for endpoint in &self.config.servers {
      let mut source = self.source(endpoint);
      let mut parser = RequestParserTransformer::new()
        .with_error_strategy(self.config.on_malformed.strategy())
        .with_name(format!("parser[{}]", endpoint));
      let parsed_stream: RequestStream = parser.transform(source.produce()).await;
      parsed.push(parsed_stream);
    }
    if parsed.is_empty() {
      return Box::pin(futures::stream::empty());
    }

    let first = parsed.remove(0);
    let mut merge = RoundRobinMergeTransformer::new().with_name("merge".to_string());
    if let Some(capacity) = self.config.prefetch {
      merge = merge.with_prefetch(capacity);
    }
    merge.add_streams(parsed);
    merge.transform(first).await
  }

  /// The report sink for this configuration.
  pub fn reporter(&self) -> Result<ReportConsumer, PipelineError> {
    let endpoint = self
      .config
      .report_endpoint()
      .ok_or_else(|| PipelineError::Config("no report endpoint configured".to_string()))?;
    let network = &self.config.network;
    let mut reporter = ReportConsumer::new(endpoint.clone(), Arc::clone(&self.connector))
      .with_reconnect_backoff(network.reconnect_backoff())
      .with_error_strategy(network.reconnect_strategy());
    if let Some(token) = &self.config.token {
      reporter = reporter.with_token(token.clone());
    }
    Ok(reporter)
  }

  /// Builds the fanout of per-kind routers, all emitting into `reporter`.
  ///
  /// Routers are ordered requests, bytes, resources, ipaddr.
  pub fn analyzer<C>(&self, reporter: SharedConsumer<C>) -> FanoutConsumer<Arc<Request>>
  where
    C: Consumer<Input = StatRecord> + 'static,
  {
    let routers: Vec<DynConsumer<Arc<Request>>> = StatKind::ALL
      .into_iter()
      .map(|kind| self.router(kind, reporter.clone()))
      .collect();
    FanoutConsumer::new(routers).with_name("analyzer".to_string())
  }

  fn router<C>(&self, kind: StatKind, reporter: SharedConsumer<C>) -> DynConsumer<Arc<Request>>
  where
    C: Consumer<Input = StatRecord> + 'static,
  {
    let mut router = PerUserRouter::new(self.window, move |user: &str| -> DynConsumer<Item> {
      Box::new(AggregatorConsumer::new(
        user,
        aggregators::for_kind(kind),
        reporter.clone(),
      ))
    })
    .with_flush_on_close(self.config.flush_on_shutdown)
    .with_name(format!("{}_router", kind));
    if let Some(max_idle_epochs) = self.config.evict_idle_epochs {
      router = router.with_eviction(EvictIdle { max_idle_epochs });
    }
    Box::new(router)
  }

  /// Runs until the sources end, a fatal error occurs, or `shutdown` fires.
  pub async fn run(&self, shutdown: CancellationToken) -> Result<PipelineSummary, PipelineError> {
    let reporter = SharedConsumer::new(self.reporter()?);
    let mut analyzer = self.analyzer(reporter.clone());
    let mut requests = self.request_stream().await;
    let mut seen = 0u64;

    tracing::info!(
      servers = self.config.servers.len(),
      window_size = self.window.get(),
      "Pipeline starting"
    );

    let drive = async {
      while let Some(next) = requests.next().await {
        analyzer.accept(Arc::new(next?)).await?;
        seen += 1;
      }
      Ok::<_, PipelineError>(())
    };
    let ended = tokio::select! {
      biased;
      () = shutdown.cancelled() => Ok(End::Cancelled),
      result = drive => result.map(|()| End::Exhausted),
    };
    drop(requests);

    let analyzer_closed = match ended {
      Ok(End::Exhausted) => {
        tracing::info!(requests = seen, "Sources exhausted");
        tokio::select! {
          biased;
          () = shutdown.cancelled() => Ok(()),
          result = analyzer.close() => result,
        }
      }
      Ok(End::Cancelled) => {
        tracing::info!(requests = seen, "Shutdown requested");
        Ok(())
      }
      Err(ref e) => {
        tracing::error!(error = %e, requests = seen, "Pipeline failed");
        Ok(())
      }
    };

    let mut reporter = reporter.lock().await;
    let reporter_closed = reporter.close().await;
    let summary = PipelineSummary {
      requests: seen,
      records_reported: reporter.delivered(),
    };

    ended?;
    analyzer_closed?;
    reporter_closed?;
    tracing::info!(
      requests = summary.requests,
      records_reported = summary.records_reported,
      "Pipeline finished"
    );
    Ok(summary)
  }
}
