use crate::consumer::{Consumer, ConsumerConfig};
use crate::error::{ErrorStrategy, PipelineError};
use crate::input::Input;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// A consumer that collects every item into a `Vec`.
///
/// Mostly useful as a terminal stage in tests and for inspecting what a
/// router or aggregator emitted.
pub struct VecConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// The Vec storing consumed items.
  pub vec: Vec<T>,
  /// Whether `close` has been called.
  pub closed: bool,
  /// Configuration for the consumer, including error handling strategy.
  pub config: ConsumerConfig<T>,
}

impl<T> Default for VecConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> VecConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// Creates a new `VecConsumer`.
  pub fn new() -> Self {
    Self {
      vec: Vec::new(),
      closed: false,
      config: ConsumerConfig::default(),
    }
  }

  /// Sets the error handling strategy for this consumer.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<T>) -> Self {
    self.config.error_strategy = strategy;
    self
  }

  /// Sets the name for this consumer.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.config.name = name;
    self
  }

  /// Consumes the consumer and returns the collected items.
  pub fn into_vec(self) -> Vec<T> {
    self.vec
  }
}

impl<T> Input for VecConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  type Input = T;
  type InputStream = Pin<Box<dyn Stream<Item = T> + Send>>;
}

#[async_trait]
impl<T> Consumer for VecConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  async fn accept(&mut self, item: T) -> Result<(), PipelineError> {
    self.vec.push(item);
    Ok(())
  }

  async fn close(&mut self) -> Result<(), PipelineError> {
    self.closed = true;
    Ok(())
  }

  fn get_config_impl(&self) -> &ConsumerConfig<T> {
    &self.config
  }
}
