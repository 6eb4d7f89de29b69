//! Fanout: deliver every item to several consumers.
//!
//! [`FanoutConsumer`] hands a clone of each accepted item to each of its
//! targets, in declaration order, and waits for each delivery to finish before
//! moving on. The first target that fails aborts the delivery: later targets do
//! not see the item and the failure is returned as
//! [`PipelineError::FanoutDelivery`] naming the target.

use crate::consumer::{Consumer, ConsumerConfig, DynConsumer};
use crate::error::{ErrorStrategy, PipelineError};
use crate::input::Input;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Consumer that broadcasts items to a fixed list of targets.
pub struct FanoutConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  targets: Vec<DynConsumer<T>>,
  /// Consumer configuration.
  pub config: ConsumerConfig<T>,
}

impl<T> FanoutConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// Creates a fanout over `targets`.
  pub fn new(targets: Vec<DynConsumer<T>>) -> Self {
    Self {
      targets,
      config: ConsumerConfig::default(),
    }
  }

  /// Appends a target.
  pub fn add_target(&mut self, target: DynConsumer<T>) {
    self.targets.push(target);
  }

  /// Number of targets.
  pub fn len(&self) -> usize {
    self.targets.len()
  }

  /// Whether there are no targets.
  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
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
}

impl<T> Input for FanoutConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  type Input = T;
  type InputStream = Pin<Box<dyn Stream<Item = T> + Send>>;
}

#[async_trait]
impl<T> Consumer for FanoutConsumer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  async fn accept(&mut self, item: T) -> Result<(), PipelineError> {
    for (index, target) in self.targets.iter_mut().enumerate() {
      if let Err(e) = target.accept(item.clone()).await {
        return Err(PipelineError::FanoutDelivery {
          index,
          target: target.component_info().name,
          source: Box::new(e),
        });
      }
    }
    Ok(())
  }

  /// Closes every target, returning the first failure.
  async fn close(&mut self) -> Result<(), PipelineError> {
    let mut first_error = None;
    for target in &mut self.targets {
      if let Err(e) = target.close().await {
        tracing::warn!(
          component = %self.config.name,
          target = %target.component_info().name,
          error = %e,
          "Fanout target failed to close"
        );
        first_error.get_or_insert(e);
      }
    }
    first_error.map_or(Ok(()), Err)
  }

  fn get_config_impl(&self) -> &ConsumerConfig<T> {
    &self.config
  }
}
