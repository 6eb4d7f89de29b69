//! Log source producer: tails one remote log server.
//!
//! [`LogSourceProducer`] opens a [`LineChannel`] to its server and groups the
//! incoming lines into [`RecordBlock`]s. Blank lines (after trimming) delimit
//! records and are never part of a block; runs of blank lines never produce
//! empty blocks.
//!
//! # Failure handling
//!
//! - A clean end of stream ends the producer for good. A final block that was
//!   not followed by a blank line is still emitted.
//! - An I/O failure (refused connect, reset, timeout) closes the channel,
//!   discards the partially read block and asks the error strategy what to do.
//!   `Retry` and `Skip` reconnect and read the stream from the start. `Stop`
//!   yields the [`PipelineError::Transport`] as the last item and ends the
//!   producer, so a source that gave up never looks like a clean close.
//! - A line that is not valid UTF-8 is not a connection problem. It is kept
//!   as a lossy decoding and its block is marked
//!   [`RecordBlock::undecodable`], leaving the verdict to the parser.
//!
//! The default strategy is `Retry(usize::MAX)`. The retry counter passed to
//! the strategy counts consecutive failures and resets once a block has been
//! delivered, so `Retry(n)` bounds reconnect attempts between two successful
//! records rather than over the producer's lifetime.

use crate::channel::{Connector, Endpoint, LineChannel};
use crate::error::{ErrorAction, ErrorStrategy, PipelineError, StreamError};
use crate::output::Output;
use crate::producer::{Producer, ProducerConfig};
use crate::request::RecordBlock;
use async_stream::stream;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Item of a log source: a record block, or the failure that ended the source.
pub type SourceItem = Result<RecordBlock, PipelineError>;

/// Producer that yields the record blocks of one log server.
#[derive(Clone)]
pub struct LogSourceProducer {
  endpoint: Endpoint,
  token: Option<String>,
  connector: Arc<dyn Connector>,
  reconnect_backoff: Duration,
  /// Producer configuration.
  pub config: ProducerConfig<SourceItem>,
}

impl std::fmt::Debug for LogSourceProducer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LogSourceProducer")
      .field("endpoint", &self.endpoint)
      .field("reconnect_backoff", &self.reconnect_backoff)
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

impl LogSourceProducer {
  /// Creates a producer reading from `endpoint`.
  pub fn new(endpoint: Endpoint, connector: Arc<dyn Connector>) -> Self {
    Self {
      endpoint,
      token: None,
      connector,
      reconnect_backoff: Duration::ZERO,
      config: ProducerConfig::default().with_error_strategy(ErrorStrategy::Retry(usize::MAX)),
    }
  }

  /// Sends `token` as the first line of every connection.
  #[must_use]
  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  /// Waits `backoff` before each reconnect attempt.
  #[must_use]
  pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
    self.reconnect_backoff = backoff;
    self
  }

  /// Sets the error strategy applied to connection failures.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<SourceItem>) -> Self {
    self.config = self.config.with_error_strategy(strategy);
    self
  }

  /// Sets the name used in logs.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.config = self.config.with_name(name);
    self
  }

  /// The server this producer reads from.
  pub fn endpoint(&self) -> &Endpoint {
    &self.endpoint
  }
}

impl Output for LogSourceProducer {
  type Output = SourceItem;
  type OutputStream = Pin<Box<dyn Stream<Item = SourceItem> + Send>>;
}

impl Producer for LogSourceProducer {
  fn produce(&mut self) -> Self::OutputStream {
    let endpoint = self.endpoint.clone();
    let token = self.token.clone();
    let connector = Arc::clone(&self.connector);
    let backoff = self.reconnect_backoff;
    let strategy = self.config.error_strategy();
    let context = self.create_error_context(None);
    let info = self.component_info();

    Box::pin(stream! {
      let mut failures = 0usize;
      loop {
        let mut pending: Vec<String> = Vec::new();
        let mut undecodable: Option<usize> = None;
        let failure: io::Error = match LineChannel::open(connector.as_ref(), &endpoint, token.as_deref()).await {
          Err(e) => e,
          Ok(mut channel) => {
            tracing::debug!(component = %info.name, endpoint = %endpoint, "Connected to log source");
            loop {
              match channel.read_raw_line().await {
                Ok(Some(bytes)) => {
                  let (line, valid) = match String::from_utf8(bytes) {
                    Ok(line) => (line, true),
                    Err(e) => (String::from_utf8_lossy(e.as_bytes()).into_owned(), false),
                  };
                  let line = line.trim();
                  if !line.is_empty() {
                    if !valid && undecodable.is_none() {
                      tracing::warn!(
                        component = %info.name,
                        endpoint = %endpoint,
                        line = %line,
                        "Log line is not valid UTF-8"
                      );
                      undecodable = Some(pending.len());
                    }
                    pending.push(line.to_string());
                  } else if !pending.is_empty() {
                    failures = 0;
                    yield Ok(
                      RecordBlock::new(endpoint.clone(), std::mem::take(&mut pending))
                        .with_undecodable(undecodable.take()),
                    );
                  }
                }
                Ok(None) => {
                  if !pending.is_empty() {
                    yield Ok(
                      RecordBlock::new(endpoint.clone(), std::mem::take(&mut pending))
                        .with_undecodable(undecodable.take()),
                    );
                  }
                  tracing::info!(component = %info.name, endpoint = %endpoint, "Log source closed the stream");
                  return;
                }
                Err(e) => break e,
              }
            }
          }
        };

        if !pending.is_empty() {
          tracing::debug!(
            component = %info.name,
            endpoint = %endpoint,
            lines = pending.len(),
            "Discarding partial record"
          );
        }

        failures += 1;
        let error = StreamError::new(
          Box::new(PipelineError::transport(endpoint.clone(), failure)),
          context.clone(),
          info.clone(),
        )
        .with_retries(failures - 1);

        match strategy.decide(&error) {
          ErrorAction::Retry | ErrorAction::Skip => {
            tracing::warn!(
              component = %info.name,
              endpoint = %endpoint,
              error = %error.source,
              retries = error.retries,
              "Log source failed, reconnecting"
            );
          }
          ErrorAction::Stop => {
            tracing::error!(
              component = %info.name,
              endpoint = %endpoint,
              error = %error.source,
              retries = error.retries,
              "Log source failed, giving up"
            );
            yield Err(error.into_pipeline_error());
            return;
          }
        }
        drop(error);

        if backoff.is_zero() {
          tokio::task::yield_now().await;
        } else {
          tokio::time::sleep(backoff).await;
        }
      }
    })
  }

  fn get_config_impl(&self) -> &ProducerConfig<SourceItem> {
    &self.config
  }

  fn component_info(&self) -> crate::error::ComponentInfo {
    crate::error::ComponentInfo {
      name: self
        .config
        .name()
        .unwrap_or_else(|| format!("log_source[{}]", self.endpoint)),
      type_name: std::any::type_name::<Self>().to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::testing::{ScriptedConnector, ScriptedTransport, Step};
  use futures::StreamExt;

  fn producer(connector: Arc<ScriptedConnector>) -> LogSourceProducer {
    LogSourceProducer::new(Endpoint::new("logs", 9000), connector)
  }

  async fn blocks(mut source: LogSourceProducer) -> Vec<RecordBlock> {
    source
      .produce()
      .map(|item| item.expect("source failed"))
      .collect()
      .await
  }

  fn lines(block: &RecordBlock) -> Vec<&str> {
    block.lines.iter().map(String::as_str).collect()
  }

  #[tokio::test]
  async fn test_groups_lines_into_blocks() {
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(ScriptedTransport::lines(
      "GET /a HTTP/1.1\r\nFrom: x\r\n\r\n\r\n   \r\n  GET /b HTTP/1.1  \r\nHost: h\r\n\r\n",
    ))]));

    let blocks = blocks(producer(Arc::clone(&connector))).await;

    assert_eq!(blocks.len(), 2);
    assert_eq!(lines(&blocks[0]), vec!["GET /a HTTP/1.1", "From: x"]);
    assert_eq!(lines(&blocks[1]), vec!["GET /b HTTP/1.1", "Host: h"]);
    assert_eq!(blocks[0].source, Endpoint::new("logs", 9000));
    assert_eq!(blocks[0].undecodable, None);
  }

  #[tokio::test]
  async fn test_clean_close_ends_without_reconnect() {
    let connector = Arc::new(ScriptedConnector::new(vec![
      Ok(ScriptedTransport::lines("GET /a HTTP/1.1\r\n\r\nGET /tail HTTP/1.1")),
      Ok(ScriptedTransport::lines("GET /never HTTP/1.1\r\n\r\n")),
    ]));

    let blocks = blocks(producer(Arc::clone(&connector))).await;

    assert_eq!(blocks.len(), 2);
    assert_eq!(lines(&blocks[1]), vec!["GET /tail HTTP/1.1"]);
    assert_eq!(connector.attempts(), 1);
  }

  #[tokio::test]
  async fn test_reconnects_after_reset_and_drops_partial_block() {
    let connector = Arc::new(ScriptedConnector::new(vec![
      Ok(ScriptedTransport::new(vec![
        Step::Data(b"GET /a HTTP/1.1\r\n\r\nGET /partial HTTP/1.1\r\nHost: h\r\n".to_vec()),
        Step::Fail(io::ErrorKind::ConnectionReset),
      ])),
      Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
      Ok(ScriptedTransport::lines("GET /b HTTP/1.1\r\n\r\n")),
    ]));

    let blocks = blocks(producer(Arc::clone(&connector))).await;

    let resources: Vec<Vec<&str>> = blocks.iter().map(lines).collect();
    assert_eq!(resources, vec![vec!["GET /a HTTP/1.1"], vec!["GET /b HTTP/1.1"]]);
    assert_eq!(connector.attempts(), 3);
  }

  #[tokio::test]
  async fn test_invalid_utf8_is_kept_for_the_parser() {
    let connector = Arc::new(ScriptedConnector::new(vec![
      Ok(ScriptedTransport::new(vec![Step::Data(
        b"GET /\xff HTTP/1.1\r\nFrom: u\r\n\r\nGET /b HTTP/1.1\r\n\r\n".to_vec(),
      )])),
      Ok(ScriptedTransport::lines("GET /never HTTP/1.1\r\n\r\n")),
    ]));

    let blocks = blocks(producer(Arc::clone(&connector))).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(blocks.len(), 2);
    assert_eq!(lines(&blocks[0]), vec!["GET /\u{FFFD} HTTP/1.1", "From: u"]);
    assert_eq!(blocks[0].undecodable, Some(0));
    assert_eq!(blocks[1].undecodable, None);
  }

  #[tokio::test]
  async fn test_retry_limit_ends_with_transport_error() {
    // every attempt is refused
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));

    let items: Vec<SourceItem> = producer(Arc::clone(&connector))
      .with_error_strategy(ErrorStrategy::Retry(2))
      .produce()
      .collect()
      .await;

    assert_eq!(items.len(), 1);
    match &items[0] {
      Err(PipelineError::Transport { endpoint, source }) => {
        assert_eq!(endpoint, &Endpoint::new("logs", 9000));
        assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused);
      }
      other => panic!("unexpected item: {other:?}"),
    }
    assert_eq!(connector.attempts(), 3);
  }

  #[tokio::test]
  async fn test_stop_strategy_gives_up_on_first_failure() {
    let connector = Arc::new(ScriptedConnector::new(vec![
      Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
      Ok(ScriptedTransport::lines("GET /a HTTP/1.1\r\n\r\n")),
    ]));

    let items: Vec<SourceItem> = producer(Arc::clone(&connector))
      .with_error_strategy(ErrorStrategy::Stop)
      .produce()
      .collect()
      .await;

    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(PipelineError::Transport { .. })));
    assert_eq!(connector.attempts(), 1);
  }

  #[tokio::test]
  async fn test_token_sent_on_every_connection() {
    let first = ScriptedTransport::new(vec![Step::Fail(io::ErrorKind::BrokenPipe)]);
    let second = ScriptedTransport::lines("");
    let (first_written, second_written) = (first.written(), second.written());
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(first), Ok(second)]));

    let blocks = blocks(producer(connector).with_token("s3cret")).await;

    assert!(blocks.is_empty());
    assert_eq!(first_written.lock().unwrap().as_slice(), b"s3cret\r\n");
    assert_eq!(second_written.lock().unwrap().as_slice(), b"s3cret\r\n");
  }

  #[test]
  fn test_default_name_mentions_endpoint() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let source = producer(connector);
    assert_eq!(source.component_info().name, "log_source[logs:9000]");
    assert_eq!(
      source.config().error_strategy(),
      ErrorStrategy::Retry(usize::MAX)
    );
  }
}
