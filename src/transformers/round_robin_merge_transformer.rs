//! Fair round-robin merge of several streams.
//!
//! [`RoundRobinMergeTransformer`] interleaves its input stream with any number
//! of additional streams. The rotation order is fixed: the transform input
//! first, then the added streams in the order they were added. The merge pulls
//! exactly one item from the next source in the rotation and forwards it. A
//! source that ends is removed for good; the others keep their relative order.
//! The merged stream ends when every source has ended.
//!
//! ```text
//! a: a1 a2 a3        b: b1          c: c1 c2
//! merged: a1 b1 c1 a2 c2 a3
//! ```
//!
//! The merge is cooperative: while it waits on one source it does not look at
//! the others. With [`RoundRobinMergeTransformer::with_prefetch`] every source
//! is instead driven by its own task into a bounded queue, so slow sources read
//! ahead concurrently. The output order is the same either way. Prefetch tasks
//! are aborted when the merged stream is dropped.

use crate::error::ErrorStrategy;
use crate::input::Input;
use crate::output::Output;
use crate::transformer::{Transformer, TransformerConfig};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Transformer that merges streams in round-robin order.
pub struct RoundRobinMergeTransformer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  streams: Vec<BoxedStream<T>>,
  prefetch: Option<usize>,
  /// Transformer configuration.
  pub config: TransformerConfig<T>,
}

impl<T> RoundRobinMergeTransformer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// Creates a merge with no additional streams.
  #[must_use]
  pub fn new() -> Self {
    Self {
      streams: Vec::new(),
      prefetch: None,
      config: TransformerConfig::default(),
    }
  }

  /// Appends a stream to the rotation.
  pub fn add_stream(&mut self, stream: BoxedStream<T>) {
    self.streams.push(stream);
  }

  /// Appends several streams to the rotation, in order.
  pub fn add_streams(&mut self, streams: impl IntoIterator<Item = BoxedStream<T>>) {
    self.streams.extend(streams);
  }

  /// Builder form of [`Self::add_stream`].
  #[must_use]
  pub fn with_stream(mut self, stream: BoxedStream<T>) -> Self {
    self.add_stream(stream);
    self
  }

  /// Drives each source on its own task with a queue of `capacity` items.
  #[must_use]
  pub fn with_prefetch(mut self, capacity: usize) -> Self {
    self.prefetch = Some(capacity.max(1));
    self
  }

  /// Sets the error strategy for the transformer.
  #[must_use]
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<T>) -> Self {
    self.config = self.config.with_error_strategy(strategy);
    self
  }

  /// Sets the name for the transformer.
  #[must_use]
  pub fn with_name(mut self, name: String) -> Self {
    self.config = self.config.with_name(name);
    self
  }

  /// Number of streams merged besides the transform input.
  pub fn stream_count(&self) -> usize {
    self.streams.len()
  }
}

impl<T> Default for RoundRobinMergeTransformer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Input for RoundRobinMergeTransformer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  type Input = T;
  type InputStream = BoxedStream<T>;
}

impl<T> Output for RoundRobinMergeTransformer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  type Output = T;
  type OutputStream = BoxedStream<T>;
}

/// Moves every source onto its own task feeding a bounded queue.
fn prefetched<T: Send + 'static>(
  streams: Vec<BoxedStream<T>>,
  capacity: usize,
) -> (Vec<BoxedStream<T>>, Vec<tokio::task::JoinHandle<()>>) {
  let mut receivers: Vec<BoxedStream<T>> = Vec::with_capacity(streams.len());
  let mut handles = Vec::with_capacity(streams.len());
  for mut source in streams {
    let (tx, rx) = mpsc::channel(capacity);
    handles.push(tokio::spawn(async move {
      while let Some(item) = source.next().await {
        if tx.send(item).await.is_err() {
          break;
        }
      }
    }));
    receivers.push(Box::pin(ReceiverStream::new(rx)));
  }
  (receivers, handles)
}

#[async_trait]
impl<T> Transformer for RoundRobinMergeTransformer<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  async fn transform(&mut self, input: Self::InputStream) -> Self::OutputStream {
    let mut all_streams = Vec::with_capacity(self.streams.len() + 1);
    all_streams.push(input);
    all_streams.append(&mut self.streams);
    let prefetch = self.prefetch;
    let name = self.component_info().name;

    Box::pin(stream! {
      let (all_streams, handles) = match prefetch {
        Some(capacity) => prefetched(all_streams, capacity),
        None => (all_streams, Vec::new()),
      };
      let _abort_on_drop = scopeguard::guard(handles, |handles| {
        for handle in handles {
          handle.abort();
        }
      });

      let mut streams: Vec<_> = all_streams.into_iter().map(Some).collect();
      let mut active_count = streams.len();

      while active_count > 0 {
        for (index, stream_option) in streams.iter_mut().enumerate() {
          if let Some(stream) = stream_option {
            match stream.next().await {
              Some(item) => yield item,
              None => {
                *stream_option = None;
                active_count -= 1;
                tracing::debug!(
                  component = %name,
                  source = index,
                  remaining = active_count,
                  "Merge source exhausted"
                );
              }
            }
          }
        }
      }
    })
  }

  fn get_config_impl(&self) -> &TransformerConfig<T> {
    &self.config
  }
}
