//! Binds one [`StatAggregator`] to one user.
//!
//! Requests are folded into the aggregator; a flush drains it and forwards
//! every resulting [`StatRecord`] to the downstream consumer, in order, before
//! `accept` returns.

use crate::aggregators::StatAggregator;
use crate::consumer::{Consumer, ConsumerConfig};
use crate::error::PipelineError;
use crate::input::Input;
use crate::request::Item;
use crate::stat::StatRecord;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Per-user aggregator stage.
pub struct AggregatorConsumer<A, C>
where
  A: StatAggregator,
  C: Consumer<Input = StatRecord>,
{
  user: String,
  aggregator: A,
  target: C,
  /// Consumer configuration.
  pub config: ConsumerConfig<Item>,
}

impl<A, C> AggregatorConsumer<A, C>
where
  A: StatAggregator,
  C: Consumer<Input = StatRecord>,
{
  /// Creates the stage for `user`, emitting into `target`.
  pub fn new(user: impl Into<String>, aggregator: A, target: C) -> Self {
    let user = user.into();
    let config = ConsumerConfig::default().with_name(format!("{}[{}]", aggregator.kind(), user));
    Self {
      user,
      aggregator,
      target,
      config,
    }
  }

  /// The user this stage aggregates for.
  pub fn user(&self) -> &str {
    &self.user
  }
}

impl<A, C> Input for AggregatorConsumer<A, C>
where
  A: StatAggregator,
  C: Consumer<Input = StatRecord>,
{
  type Input = Item;
  type InputStream = Pin<Box<dyn Stream<Item = Item> + Send>>;
}

#[async_trait]
impl<A, C> Consumer for AggregatorConsumer<A, C>
where
  A: StatAggregator,
  C: Consumer<Input = StatRecord>,
{
  async fn accept(&mut self, item: Item) -> Result<(), PipelineError> {
    match item {
      Item::Request(request) => self.aggregator.observe(&self.user, &request),
      Item::Flush => {
        for record in self.aggregator.flush(&self.user) {
          self.target.accept(record).await?;
        }
        Ok(())
      }
    }
  }

  async fn close(&mut self) -> Result<(), PipelineError> {
    self.target.close().await
  }

  fn get_config_impl(&self) -> &ConsumerConfig<Item> {
    &self.config
  }
}
