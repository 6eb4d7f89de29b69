//! Report sink: writes statistic records to the report endpoint.
//!
//! [`ReportConsumer`] keeps one [`LineChannel`] open across records and writes
//! each record as `"{kind}: {user} {value}\r\n"`. The channel is opened lazily
//! on the first record.
//!
//! When opening or writing fails the channel is dropped and the error strategy
//! decides what happens to the record being written:
//!
//! - `Retry` (default, unbounded): reconnect and write the same record again.
//! - `Skip`: drop the record and keep going; the next record reconnects.
//! - `Stop`: return [`PipelineError::Transport`] to the caller.
//!
//! A record is counted as delivered once its line has been flushed. A line
//! flushed just before the connection broke may still be lost by the peer;
//! delivery is at-least-once from this side and nothing more.

use crate::channel::{Connector, Endpoint, LineChannel};
use crate::consumer::{Consumer, ConsumerConfig};
use crate::error::{ErrorAction, ErrorStrategy, PipelineError, StreamError};
use crate::input::Input;
use crate::stat::StatRecord;
use async_trait::async_trait;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Consumer writing statistic records to a persistent report channel.
pub struct ReportConsumer {
  endpoint: Endpoint,
  token: Option<String>,
  connector: Arc<dyn Connector>,
  channel: Option<LineChannel>,
  reconnect_backoff: Duration,
  delivered: u64,
  /// Consumer configuration.
  pub config: ConsumerConfig<StatRecord>,
}

impl ReportConsumer {
  /// Creates a reporter for `endpoint`.
  pub fn new(endpoint: Endpoint, connector: Arc<dyn Connector>) -> Self {
    Self {
      endpoint,
      token: None,
      connector,
      channel: None,
      reconnect_backoff: Duration::ZERO,
      delivered: 0,
      config: ConsumerConfig::default()
        .with_error_strategy(ErrorStrategy::Retry(usize::MAX))
        .with_name("reporter".to_string()),
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

  /// Sets the error handling strategy for this consumer.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<StatRecord>) -> Self {
    self.config.error_strategy = strategy;
    self
  }

  /// Sets the name for this consumer.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.config.name = name;
    self
  }

  /// Records written and flushed so far.
  pub fn delivered(&self) -> u64 {
    self.delivered
  }

  /// Whether a channel is currently open.
  pub fn is_connected(&self) -> bool {
    self.channel.is_some()
  }

  async fn send_line(&mut self, line: &str) -> io::Result<()> {
    let channel = match self.channel.take() {
      Some(channel) => channel,
      None => {
        let channel =
          LineChannel::open(self.connector.as_ref(), &self.endpoint, self.token.as_deref()).await?;
        tracing::debug!(
          component = %self.config.name,
          endpoint = %self.endpoint,
          "Connected to report endpoint"
        );
        channel
      }
    };
    self.channel.insert(channel).write_line(line).await
  }
}

impl Input for ReportConsumer {
  type Input = StatRecord;
  type InputStream = Pin<Box<dyn Stream<Item = StatRecord> + Send>>;
}

#[async_trait]
impl Consumer for ReportConsumer {
  async fn accept(&mut self, record: StatRecord) -> Result<(), PipelineError> {
    let line = record.to_string();
    let mut failures = 0usize;
    loop {
      let failure = match self.send_line(&line).await {
        Ok(()) => {
          self.delivered += 1;
          return Ok(());
        }
        Err(e) => e,
      };
      self.channel = None;
      failures += 1;

      let error = StreamError::new(
        Box::new(PipelineError::transport(self.endpoint.clone(), failure)),
        self.create_error_context(Some(record.clone())),
        self.component_info(),
      )
      .with_retries(failures - 1);

      match self.handle_error(&error) {
        ErrorAction::Retry => {
          tracing::warn!(
            component = %self.config.name,
            endpoint = %self.endpoint,
            error = %error.source,
            retries = error.retries,
            "Report channel failed, reconnecting"
          );
          if !self.reconnect_backoff.is_zero() {
            tokio::time::sleep(self.reconnect_backoff).await;
          }
        }
        ErrorAction::Skip => {
          tracing::warn!(
            component = %self.config.name,
            endpoint = %self.endpoint,
            error = %error.source,
            record = %line,
            "Report channel failed, dropping record"
          );
          return Ok(());
        }
        ErrorAction::Stop => {
          tracing::error!(
            component = %self.config.name,
            endpoint = %self.endpoint,
            error = %error.source,
            retries = error.retries,
            "Report channel failed, giving up"
          );
          return Err(error.into_pipeline_error());
        }
      }
    }
  }

  async fn close(&mut self) -> Result<(), PipelineError> {
    tracing::info!(
      component = %self.config.name,
      endpoint = %self.endpoint,
      delivered = self.delivered,
      "Closing report channel"
    );
    match self.channel.take() {
      Some(mut channel) => channel
        .shutdown()
        .await
        .map_err(|e| PipelineError::transport(self.endpoint.clone(), e)),
      None => Ok(()),
    }
  }

  fn get_config_impl(&self) -> &ConsumerConfig<StatRecord> {
    &self.config
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::testing::{ScriptedConnector, ScriptedTransport};
  use crate::stat::StatKind;

  fn reporter(connector: Arc<ScriptedConnector>) -> ReportConsumer {
    ReportConsumer::new(Endpoint::new("report", 7000), connector).with_token("tok")
  }

  fn text(buffer: &std::sync::Mutex<Vec<u8>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
  }

  #[tokio::test]
  async fn test_one_channel_for_all_records() {
    let transport = ScriptedTransport::lines("");
    let written = transport.written();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(transport)]));
    let mut reporter = reporter(Arc::clone(&connector));

    reporter
      .accept(StatRecord::count(StatKind::Requests, "alice", 3))
      .await
      .unwrap();
    reporter
      .accept(StatRecord::text(StatKind::IpAddr, "alice", "1.2.3.4"))
      .await
      .unwrap();
    reporter.close().await.unwrap();

    assert_eq!(
      text(&written),
      "tok\r\nrequests: alice 3\r\nipaddr: alice 1.2.3.4\r\n"
    );
    assert_eq!(connector.attempts(), 1);
    assert_eq!(reporter.delivered(), 2);
    assert!(!reporter.is_connected());
  }

  #[tokio::test]
  async fn test_reconnect_rewrites_failed_record() {
    // token and first record go through, the second record's write fails
    let broken = ScriptedTransport::failing_after(2, io::ErrorKind::ConnectionReset);
    let fresh = ScriptedTransport::lines("");
    let (broken_written, fresh_written) = (broken.written(), fresh.written());
    let connector = Arc::new(ScriptedConnector::new(vec![
      Ok(broken),
      Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
      Ok(fresh),
    ]));
    let mut reporter = reporter(Arc::clone(&connector));

    reporter
      .accept(StatRecord::count(StatKind::Bytes, "bob", 10))
      .await
      .unwrap();
    reporter
      .accept(StatRecord::count(StatKind::Bytes, "carol", 20))
      .await
      .unwrap();

    assert_eq!(text(&broken_written), "tok\r\nbytes: bob 10\r\n");
    assert_eq!(text(&fresh_written), "tok\r\nbytes: carol 20\r\n");
    assert_eq!(connector.attempts(), 3);
    assert_eq!(reporter.delivered(), 2);
  }

  #[tokio::test]
  async fn test_stop_returns_transport_error() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let mut reporter = reporter(Arc::clone(&connector)).with_error_strategy(ErrorStrategy::Stop);

    let err = reporter
      .accept(StatRecord::count(StatKind::Requests, "u", 1))
      .await
      .unwrap_err();

    assert!(matches!(err, PipelineError::Transport { ref endpoint, .. } if endpoint.port == 7000));
    assert!(err.is_transient());
    assert_eq!(connector.attempts(), 1);
  }

  #[tokio::test]
  async fn test_bounded_retry_gives_up() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let mut reporter =
      reporter(Arc::clone(&connector)).with_error_strategy(ErrorStrategy::Retry(3));

    assert!(
      reporter
        .accept(StatRecord::count(StatKind::Requests, "u", 1))
        .await
        .is_err()
    );
    assert_eq!(connector.attempts(), 4);
  }

  #[tokio::test]
  async fn test_skip_drops_record_and_continues() {
    let transport = ScriptedTransport::lines("");
    let written = transport.written();
    let connector = Arc::new(ScriptedConnector::new(vec![
      Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
      Ok(transport),
    ]));
    let mut reporter = reporter(Arc::clone(&connector)).with_error_strategy(ErrorStrategy::Skip);

    reporter
      .accept(StatRecord::count(StatKind::Requests, "lost", 1))
      .await
      .unwrap();
    reporter
      .accept(StatRecord::count(StatKind::Requests, "kept", 2))
      .await
      .unwrap();

    assert_eq!(text(&written), "tok\r\nrequests: kept 2\r\n");
    assert_eq!(reporter.delivered(), 1);
  }
}
