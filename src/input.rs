//! Input side of a pipeline component.
//!
//! Transformers and consumers implement [`Input`] to declare the item type they
//! accept and the stream type that carries it. Streams are boxed and pinned
//! (`Pin<Box<dyn Stream<Item = T> + Send>>`) so stages can be composed without
//! naming their concrete types.

use futures::Stream;

/// Trait for components that accept a stream of items.
pub trait Input {
  /// The type of items accepted by this component.
  type Input: std::fmt::Debug + Clone + Send + Sync + 'static;
  /// The stream type that yields items of type `Self::Input`.
  type InputStream: Stream<Item = Self::Input> + Send + 'static;
}
