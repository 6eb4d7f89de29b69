//! Consumers: push-driven sinks at the end of a pipeline.
//!
//! Unlike the pull-based producers and transformers, a [`Consumer`] is driven
//! one item at a time by whoever owns it: [`Consumer::accept`] processes a
//! single item to completion before returning, and [`Consumer::close`] releases
//! whatever the consumer holds open. This is what lets the fanout and per-user
//! routing stages deliver every item synchronously to a static graph of
//! downstream consumers.
//!
//! [`Consumer::consume`] drains a whole stream through `accept` and then
//! closes the consumer; it stops at the first error.

use crate::error::{
  ComponentInfo, ErrorAction, ErrorContext, ErrorStrategy, PipelineError, StreamError,
};
use crate::input::Input;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Configuration for a consumer component.
#[derive(Debug, Clone)]
pub struct ConsumerConfig<M: std::fmt::Debug + Clone + Send + Sync + 'static> {
  /// The error handling strategy to use when consuming items.
  pub error_strategy: ErrorStrategy<M>,
  /// The name of this consumer, empty when unnamed.
  pub name: String,
}

impl<M: std::fmt::Debug + Clone + Send + Sync + 'static> Default for ConsumerConfig<M> {
  fn default() -> Self {
    Self {
      error_strategy: ErrorStrategy::Stop,
      name: String::new(),
    }
  }
}

impl<M: std::fmt::Debug + Clone + Send + Sync + 'static> ConsumerConfig<M> {
  /// Sets the error handling strategy for this consumer configuration.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<M>) -> Self {
    self.error_strategy = strategy;
    self
  }

  /// Sets the name for this consumer configuration.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.name = name;
    self
  }

  /// Returns the current error handling strategy.
  pub fn error_strategy(&self) -> ErrorStrategy<M> {
    self.error_strategy.clone()
  }

  /// Returns the current name.
  pub fn name(&self) -> &str {
    &self.name
  }
}

/// Boxed consumer of `T`, as stored by fanout and routing stages.
pub type DynConsumer<T> =
  Box<dyn Consumer<Input = T, InputStream = Pin<Box<dyn Stream<Item = T> + Send>>>>;

/// Trait for components that accept items pushed to them.
#[async_trait]
pub trait Consumer: Input + Send {
  /// Processes one item.
  ///
  /// Returns only after the item has been fully handled, including delivery
  /// to any downstream consumers.
  async fn accept(&mut self, item: Self::Input) -> Result<(), PipelineError>;

  /// Releases resources held by this consumer.
  async fn close(&mut self) -> Result<(), PipelineError> {
    Ok(())
  }

  /// Pushes every item of `input` through [`Consumer::accept`], then closes.
  async fn consume(&mut self, input: Self::InputStream) -> Result<(), PipelineError> {
    let mut input = std::pin::pin!(input);
    while let Some(item) = input.next().await {
      if let Err(e) = self.accept(item).await {
        tracing::error!(
          component = %self.component_info().name,
          error = %e,
          "Consumer failed, closing"
        );
        let _ = self.close().await;
        return Err(e);
      }
    }
    self.close().await
  }

  /// Returns a reference to the consumer's configuration.
  fn config(&self) -> &ConsumerConfig<Self::Input> {
    self.get_config_impl()
  }

  /// Handles an error that occurred while consuming an item.
  fn handle_error(&self, error: &StreamError<Self::Input>) -> ErrorAction {
    self.config().error_strategy.decide(error)
  }

  /// Creates an error context for error reporting.
  fn create_error_context(&self, item: Option<Self::Input>) -> ErrorContext<Self::Input> {
    let info = self.component_info();
    ErrorContext {
      timestamp: chrono::Utc::now(),
      item,
      component_name: info.name,
      component_type: info.type_name,
    }
  }

  /// Returns information about the component for error reporting.
  fn component_info(&self) -> ComponentInfo {
    let name = self.config().name();
    ComponentInfo {
      name: if name.is_empty() {
        "consumer".to_string()
      } else {
        name.to_string()
      },
      type_name: std::any::type_name::<Self>().to_string(),
    }
  }

  /// Returns the stored configuration.
  fn get_config_impl(&self) -> &ConsumerConfig<Self::Input>;
}
