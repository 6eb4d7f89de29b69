//! Parses record blocks into requests.
//!
//! Each block goes through [`crate::request::parse`]. What happens to a
//! malformed block is decided by the transformer's error strategy:
//!
//! - `Stop` (default): the error is emitted as an `Err` item and the stream
//!   ends, so the pipeline can abort with a diagnostic.
//! - `Skip`: the block is logged at `warn` and dropped.
//!
//! Parsing is pure, so `Retry` has nothing to retry and behaves like `Stop`.
//!
//! A failure item from the source is passed through unchanged and ends the
//! stream.

use crate::error::{ErrorAction, ErrorContext, ErrorStrategy, PipelineError, StreamError};
use crate::input::Input;
use crate::output::Output;
use crate::producers::log_source_producer::SourceItem;
use crate::request::{Request, parse};
use crate::transformer::{Transformer, TransformerConfig};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Transformer from [`crate::request::RecordBlock`] to parsed [`Request`].
#[derive(Debug, Clone, Default)]
pub struct RequestParserTransformer {
  /// Transformer configuration.
  pub config: TransformerConfig<SourceItem>,
}

impl RequestParserTransformer {
  /// Creates a parser that stops at the first malformed block.
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the error strategy for malformed blocks.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<SourceItem>) -> Self {
    self.config = self.config.with_error_strategy(strategy);
    self
  }

  /// Sets the name for the transformer.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.config = self.config.with_name(name);
    self
  }
}

impl Input for RequestParserTransformer {
  type Input = SourceItem;
  type InputStream = Pin<Box<dyn Stream<Item = SourceItem> + Send>>;
}

impl Output for RequestParserTransformer {
  type Output = Result<Request, PipelineError>;
  type OutputStream = Pin<Box<dyn Stream<Item = Result<Request, PipelineError>> + Send>>;
}

#[async_trait]
impl Transformer for RequestParserTransformer {
  async fn transform(&mut self, input: Self::InputStream) -> Self::OutputStream {
    let strategy = self.config.error_strategy();
    let info = self.component_info();
    let context = self.create_error_context(None);

    Box::pin(stream! {
      let mut input = input;
      while let Some(item) = input.next().await {
        let block = match item {
          Ok(block) => block,
          Err(e) => {
            yield Err(e);
            return;
          }
        };
        let error = match parse(&block) {
          Ok(request) => {
            yield Ok(request);
            continue;
          }
          Err(e) => e,
        };

        let origin = block.source.clone();
        let failure = StreamError::new(
          Box::new(error.clone()),
          ErrorContext {
            timestamp: chrono::Utc::now(),
            item: Some(Ok(block)),
            ..context.clone()
          },
          info.clone(),
        );
        match strategy.decide(&failure) {
          ErrorAction::Skip => {
            tracing::warn!(
              component = %info.name,
              origin = %origin,
              error = %error,
              "Skipping malformed request"
            );
          }
          ErrorAction::Stop | ErrorAction::Retry => {
            tracing::error!(
              component = %info.name,
              origin = %origin,
              error = %error,
              "Malformed request, stopping"
            );
            yield Err(error);
            return;
          }
        }
      }
    })
  }

  fn get_config_impl(&self) -> &TransformerConfig<SourceItem> {
    &self.config
  }
}
