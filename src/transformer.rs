//! Transformers: stream-to-stream stages.
//!
//! A [`Transformer`] consumes one input stream and returns a new output stream.
//! The returned stream is lazy; work happens as the caller polls it.
//!
//! ```rust
//! use futures::StreamExt;
//! use logweave::transformer::Transformer;
//! use logweave::transformers::RoundRobinMergeTransformer;
//!
//! # async fn example() {
//! let mut merge = RoundRobinMergeTransformer::new()
//!   .with_stream(Box::pin(futures::stream::iter(vec![2, 4])));
//! let merged: Vec<i32> = merge
//!   .transform(Box::pin(futures::stream::iter(vec![1, 3])))
//!   .await
//!   .collect()
//!   .await;
//! assert_eq!(merged, vec![1, 2, 3, 4]);
//! # }
//! ```

use crate::error::{ComponentInfo, ErrorContext, ErrorStrategy};
use crate::input::Input;
use crate::output::Output;
use async_trait::async_trait;

/// Configuration for a transformer component.
#[derive(Debug, Clone)]
pub struct TransformerConfig<M: std::fmt::Debug + Clone + Send + Sync> {
  /// The error handling strategy to use when transforming items.
  pub error_strategy: ErrorStrategy<M>,
  /// Optional name for identifying this transformer in logs.
  pub name: Option<String>,
}

impl<M: std::fmt::Debug + Clone + Send + Sync> Default for TransformerConfig<M> {
  fn default() -> Self {
    Self {
      error_strategy: ErrorStrategy::Stop,
      name: None,
    }
  }
}

impl<M: std::fmt::Debug + Clone + Send + Sync> TransformerConfig<M> {
  /// Sets the error handling strategy for this transformer configuration.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<M>) -> Self {
    self.error_strategy = strategy;
    self
  }

  /// Sets the name for this transformer configuration.
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

/// Trait for components that transform one stream into another.
#[async_trait]
pub trait Transformer: Input + Output {
  /// Transforms a stream of input items into a stream of output items.
  async fn transform(&mut self, input: Self::InputStream) -> Self::OutputStream;

  /// Returns a reference to the transformer's configuration.
  fn config(&self) -> &TransformerConfig<Self::Input> {
    self.get_config_impl()
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
    ComponentInfo {
      name: self
        .config()
        .name()
        .unwrap_or_else(|| "transformer".to_string()),
      type_name: std::any::type_name::<Self>().to_string(),
    }
  }

  /// Returns the stored configuration.
  fn get_config_impl(&self) -> &TransformerConfig<Self::Input>;
}
