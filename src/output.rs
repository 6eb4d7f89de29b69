//! Output side of a pipeline component.
//!
//! Producers and transformers implement [`Output`] to declare what they emit.
//! Together with [`crate::input::Input`] this lets the pipeline wire stages
//! whose item types line up.

use futures::Stream;

/// Trait for components that produce a stream of items.
pub trait Output {
  /// The type of items produced by this component.
  type Output: std::fmt::Debug + Clone + Send + Sync + 'static;
  /// The stream type that yields items of type `Self::Output`.
  type OutputStream: Stream<Item = Self::Output> + Send + 'static;
}
