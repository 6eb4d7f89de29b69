//! A cloneable handle to one consumer.
//!
//! The four statistic routers all report into the same sink. Each of them
//! holds a [`SharedConsumer`] handle; items are forwarded to the inner
//! consumer under an async mutex, one at a time.
//!
//! Closing a handle does nothing. Whoever created the shared consumer closes
//! the inner consumer once, through [`SharedConsumer::lock`].

use crate::consumer::{Consumer, ConsumerConfig};
use crate::error::PipelineError;
use crate::input::Input;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared handle forwarding items to an inner consumer.
pub struct SharedConsumer<C: Consumer> {
  inner: Arc<Mutex<C>>,
  /// Configuration for this handle.
  pub config: ConsumerConfig<C::Input>,
}

impl<C: Consumer> Clone for SharedConsumer<C> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      config: self.config.clone(),
    }
  }
}

impl<C: Consumer> SharedConsumer<C> {
  /// Wraps `consumer`; handles inherit its name.
  pub fn new(consumer: C) -> Self {
    let config = ConsumerConfig::default().with_name(consumer.component_info().name);
    Self {
      inner: Arc::new(Mutex::new(consumer)),
      config,
    }
  }

  /// Locks the inner consumer.
  pub async fn lock(&self) -> MutexGuard<'_, C> {
    self.inner.lock().await
  }

  /// Returns the inner consumer if this is the last handle.
  pub fn try_unwrap(self) -> Result<C, Self> {
    let config = self.config;
    Arc::try_unwrap(self.inner)
      .map(Mutex::into_inner)
      .map_err(|inner| Self { inner, config })
  }
}

impl<C: Consumer> Input for SharedConsumer<C> {
  type Input = C::Input;
  type InputStream = Pin<Box<dyn Stream<Item = C::Input> + Send>>;
}

#[async_trait]
impl<C: Consumer> Consumer for SharedConsumer<C> {
  async fn accept(&mut self, item: Self::Input) -> Result<(), PipelineError> {
    self.inner.lock().await.accept(item).await
  }

  fn get_config_impl(&self) -> &ConsumerConfig<C::Input> {
    &self.config
  }
}
