//! Producers: the start of a pipeline.
//!
//! A [`Producer`] turns some external resource into a lazy stream of items.
//! In this crate the only producer is the log source, which tails a remote
//! server and yields record blocks.

use crate::error::{ComponentInfo, ErrorContext, ErrorStrategy};
use crate::output::Output;

/// Configuration for a producer component.
#[derive(Debug, Clone)]
pub struct ProducerConfig<M: std::fmt::Debug + Clone + Send + Sync> {
  /// The error handling strategy to use when producing items.
  pub error_strategy: ErrorStrategy<M>,
  /// Optional name for identifying this producer in logs.
  pub name: Option<String>,
}

impl<M: std::fmt::Debug + Clone + Send + Sync> Default for ProducerConfig<M> {
  fn default() -> Self {
    Self {
      error_strategy: ErrorStrategy::Stop,
      name: None,
    }
  }
}

impl<M: std::fmt::Debug + Clone + Send + Sync> ProducerConfig<M> {
  /// Sets the error handling strategy for this producer configuration.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<M>) -> Self {
    self.error_strategy = strategy;
    self
  }

  /// Sets the name for this producer configuration.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.name = Some(name);
    self
  }

  /// Returns the current error handling strategy.
  pub fn error_strategy(&self) -> ErrorStrategy<M> {
    self.error_strategy.clone()
  }

  /// Returns the current name, if set.
  pub fn name(&self) -> Option<String> {
    self.name.clone()
  }
}

/// Trait for components that produce data streams.
///
/// `produce` must be lazy: no I/O happens until the returned stream is polled.
pub trait Producer: Output {
  /// Produces a stream of items.
  fn produce(&mut self) -> Self::OutputStream;

  /// Returns a reference to the producer's configuration.
  fn config(&self) -> &ProducerConfig<Self::Output> {
    self.get_config_impl()
  }

  /// Creates an error context for error reporting.
  fn create_error_context(&self, item: Option<Self::Output>) -> ErrorContext<Self::Output> {
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
    ComponentInfo {
      name: self
        .config()
        .name()
        .unwrap_or_else(|| "producer".to_string()),
      type_name: std::any::type_name::<Self>().to_string(),
    }
  }

  /// Returns the stored configuration.
  fn get_config_impl(&self) -> &ProducerConfig<Self::Output>;
}
