//! Per-user routing with global windows.
//!
//! [`PerUserRouter`] keys each request by [`Request::user`] and forwards it
//! to that user's own consumer, created on first sight through a factory. It
//! counts requests globally, not per user: once `window_size` requests have
//! been delivered it sends [`Item::Flush`] to every consumer created so far,
//! in creation order, including users that saw nothing during the window.
//!
//! Per-user consumers live until the router is closed unless an
//! [`EvictionPolicy`] says otherwise. The default, [`NeverEvict`], keeps them
//! forever, so memory grows with the number of distinct users. [`EvictIdle`]
//! drops users that stayed silent for a number of windows; their consumer is
//! flushed with everyone else's first and then closed, and a user that shows
//! up again starts from a fresh consumer.

use crate::consumer::{Consumer, ConsumerConfig, DynConsumer};
use crate::error::PipelineError;
use crate::input::Input;
use crate::request::{Item, Request};
use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;

/// Builds the consumer for a newly seen user.
pub type ConsumerFactory = Box<dyn FnMut(&str) -> DynConsumer<Item> + Send>;

/// Decides, after each window, which per-user consumers to drop.
pub trait EvictionPolicy: Send {
  /// `idle_epochs` is the number of whole windows since `user` last had a request.
  fn should_evict(&mut self, user: &str, idle_epochs: u64) -> bool;
}

/// Keeps every user forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
  fn should_evict(&mut self, _user: &str, _idle_epochs: u64) -> bool {
    false
  }
}

/// Evicts users idle for at least `max_idle_epochs` windows.
#[derive(Debug, Clone, Copy)]
pub struct EvictIdle {
  /// Idle windows tolerated before eviction.
  pub max_idle_epochs: u64,
}

impl EvictionPolicy for EvictIdle {
  fn should_evict(&mut self, _user: &str, idle_epochs: u64) -> bool {
    idle_epochs >= self.max_idle_epochs
  }
}

struct Route {
  user: String,
  consumer: DynConsumer<Item>,
  last_active_epoch: u64,
}

/// Routes requests to per-user consumers and flushes them every window.
pub struct PerUserRouter {
  window_size: NonZeroUsize,
  factory: ConsumerFactory,
  users: HashMap<String, usize>,
  routes: Vec<Route>,
  in_window: usize,
  epoch: u64,
  eviction: Box<dyn EvictionPolicy>,
  flush_on_close: bool,
  /// Consumer configuration.
  pub config: ConsumerConfig<Arc<Request>>,
}

impl PerUserRouter {
  /// Creates a router flushing every `window_size` requests.
  pub fn new<F>(window_size: NonZeroUsize, factory: F) -> Self
  where
    F: FnMut(&str) -> DynConsumer<Item> + Send + 'static,
  {
    Self {
      window_size,
      factory: Box::new(factory),
      users: HashMap::new(),
      routes: Vec::new(),
      in_window: 0,
      epoch: 0,
      eviction: Box::new(NeverEvict),
      flush_on_close: false,
      config: ConsumerConfig::default(),
    }
  }

  /// Sets the eviction policy.
  #[must_use]
  pub fn with_eviction(mut self, policy: impl EvictionPolicy + 'static) -> Self {
    self.eviction = Box::new(policy);
    self
  }

  /// Flushes a partially filled window when the router is closed.
  #[must_use]
  pub fn with_flush_on_close(mut self, flush: bool) -> Self {
    self.flush_on_close = flush;
    self
  }

  /// Sets the name for this consumer.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.config.name = name;
    self
  }

  /// Number of users with a live consumer.
  pub fn user_count(&self) -> usize {
    self.routes.len()
  }

  /// Users with a live consumer, in creation order.
  pub fn users(&self) -> impl Iterator<Item = &str> {
    self.routes.iter().map(|route| route.user.as_str())
  }

  /// Number of completed windows.
  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  /// Requests per window.
  pub fn window_size(&self) -> NonZeroUsize {
    self.window_size
  }

  fn register(&mut self, user: &str) -> usize {
    tracing::debug!(component = %self.config.name, user = %user, "Registering user");
    let consumer = (self.factory)(user);
    self.routes.push(Route {
      user: user.to_string(),
      consumer,
      last_active_epoch: self.epoch,
    });
    let index = self.routes.len() - 1;
    self.users.insert(user.to_string(), index);
    index
  }

  async fn flush_all(&mut self) -> Result<(), PipelineError> {
    tracing::debug!(
      component = %self.config.name,
      epoch = self.epoch,
      users = self.routes.len(),
      "Window closed, flushing"
    );
    for route in &mut self.routes {
      route.consumer.accept(Item::Flush).await?;
    }
    self.in_window = 0;
    self.epoch += 1;
    self.evict_idle().await;
    Ok(())
  }

  async fn evict_idle(&mut self) {
    let finished = self.epoch - 1;
    let mut kept = Vec::with_capacity(self.routes.len());
    let mut evicted = 0usize;
    for mut route in std::mem::take(&mut self.routes) {
      let idle = finished.saturating_sub(route.last_active_epoch);
      if !self.eviction.should_evict(&route.user, idle) {
        kept.push(route);
        continue;
      }
      evicted += 1;
      tracing::debug!(
        component = %self.config.name,
        user = %route.user,
        idle_epochs = idle,
        "Evicting idle user"
      );
      if let Err(e) = route.consumer.close().await {
        tracing::warn!(
          component = %self.config.name,
          user = %route.user,
          error = %e,
          "Evicted consumer failed to close"
        );
      }
    }
    self.routes = kept;
    if evicted > 0 {
      self.users = self
        .routes
        .iter()
        .enumerate()
        .map(|(index, route)| (route.user.clone(), index))
        .collect();
    }
  }
}

impl Input for PerUserRouter {
  type Input = Arc<Request>;
  type InputStream = Pin<Box<dyn Stream<Item = Arc<Request>> + Send>>;
}

#[async_trait]
impl Consumer for PerUserRouter {
  async fn accept(&mut self, request: Arc<Request>) -> Result<(), PipelineError> {
    let existing = self.users.get(request.user()).copied();
    let index = match existing {
      Some(index) => index,
      None => self.register(request.user()),
    };
    let epoch = self.epoch;
    let route = &mut self.routes[index];
    route.last_active_epoch = epoch;
    route.consumer.accept(Item::Request(request)).await?;

    self.in_window += 1;
    if self.in_window >= self.window_size.get() {
      self.flush_all().await?;
    }
    Ok(())
  }

  /// Closes every per-user consumer, returning the first failure.
  async fn close(&mut self) -> Result<(), PipelineError> {
    if self.flush_on_close && self.in_window > 0 {
      self.flush_all().await?;
    }
    let mut first_error = None;
    for route in &mut self.routes {
      if let Err(e) = route.consumer.close().await {
        first_error.get_or_insert(e);
      }
    }
    first_error.map_or(Ok(()), Err)
  }

  fn get_config_impl(&self) -> &ConsumerConfig<Arc<Request>> {
    &self.config
  }
}
