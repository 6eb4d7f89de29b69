//! # Error Handling
//!
//! Error policy and error types shared by every stage of the log pipeline.
//!
//! ## Overview
//!
//! Two layers cooperate here:
//!
//! - **Policy**: [`ErrorStrategy`] decides, per component, whether a failure is
//!   retried, skipped or fatal. Components wrap each failure in a [`StreamError`]
//!   carrying an [`ErrorContext`] (timestamp, offending item, component identity)
//!   and a retry counter, then ask their strategy for an [`ErrorAction`].
//! - **Domain**: [`PipelineError`] names what actually went wrong: a broken
//!   transport, a malformed request, a missing header, a failed fanout target.
//!   It is what fatal paths return to the caller.
//!
//! ## Error Strategies
//!
//! - **Stop**: abort the component
//! - **Skip**: drop the offending item (or connection attempt) and continue
//! - **Retry(n)**: retry while fewer than `n` retries have been spent, then stop
//! - **Custom**: user-defined handler
//!
//! Sources and the reporter default to `Retry(usize::MAX)`, so transient I/O
//! failures are retried indefinitely. The request parser defaults to `Stop`.

use crate::channel::Endpoint;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Action to take when an error occurs in a pipeline component.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorAction {
  /// Stop processing immediately.
  Stop,
  /// Skip the item that caused the error and continue processing.
  Skip,
  /// Retry the operation that caused the error.
  Retry,
}

type CustomErrorHandler<T> = Arc<dyn Fn(&StreamError<T>) -> ErrorAction + Send + Sync>;

/// Strategy for handling errors in pipeline components.
///
/// # Example
///
/// ```rust
/// use logweave::error::{ErrorAction, ErrorStrategy};
///
/// // Give up after three consecutive reconnects.
/// let strategy = ErrorStrategy::<String>::new_custom(|error| {
///   if error.retries < 3 {
///     ErrorAction::Retry
///   } else {
///     ErrorAction::Stop
///   }
/// });
/// # let _ = strategy;
/// ```
pub enum ErrorStrategy<T> {
  /// Stop processing immediately when an error occurs.
  Stop,
  /// Skip items that cause errors and continue processing.
  Skip,
  /// Retry failed operations up to the specified number of times.
  Retry(usize),
  /// Custom error handling logic.
  Custom(CustomErrorHandler<T>),
}

impl<T: fmt::Debug + Clone + Send + Sync> Clone for ErrorStrategy<T> {
  fn clone(&self) -> Self {
    match self {
      ErrorStrategy::Stop => ErrorStrategy::Stop,
      ErrorStrategy::Skip => ErrorStrategy::Skip,
      ErrorStrategy::Retry(n) => ErrorStrategy::Retry(*n),
      ErrorStrategy::Custom(handler) => ErrorStrategy::Custom(handler.clone()),
    }
  }
}

impl<T: fmt::Debug + Clone + Send + Sync> fmt::Debug for ErrorStrategy<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorStrategy::Stop => write!(f, "ErrorStrategy::Stop"),
      ErrorStrategy::Skip => write!(f, "ErrorStrategy::Skip"),
      ErrorStrategy::Retry(n) => write!(f, "ErrorStrategy::Retry({})", n),
      ErrorStrategy::Custom(_) => write!(f, "ErrorStrategy::Custom"),
    }
  }
}

impl<T: fmt::Debug + Clone + Send + Sync> PartialEq for ErrorStrategy<T> {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (ErrorStrategy::Stop, ErrorStrategy::Stop) => true,
      (ErrorStrategy::Skip, ErrorStrategy::Skip) => true,
      (ErrorStrategy::Retry(n1), ErrorStrategy::Retry(n2)) => n1 == n2,
      (ErrorStrategy::Custom(_), ErrorStrategy::Custom(_)) => true,
      _ => false,
    }
  }
}

impl<T: fmt::Debug + Clone + Send + Sync> ErrorStrategy<T> {
  /// Creates a custom error handling strategy with a user-defined handler function.
  pub fn new_custom<F>(f: F) -> Self
  where
    F: Fn(&StreamError<T>) -> ErrorAction + Send + Sync + 'static,
  {
    Self::Custom(Arc::new(f))
  }

  /// Maps an error to the action this strategy prescribes.
  ///
  /// `Retry(n)` answers [`ErrorAction::Retry`] while `error.retries < n` and
  /// [`ErrorAction::Stop`] afterwards.
  pub fn decide(&self, error: &StreamError<T>) -> ErrorAction {
    match self {
      ErrorStrategy::Stop => ErrorAction::Stop,
      ErrorStrategy::Skip => ErrorAction::Skip,
      ErrorStrategy::Retry(n) if error.retries < *n => ErrorAction::Retry,
      ErrorStrategy::Retry(_) => ErrorAction::Stop,
      ErrorStrategy::Custom(handler) => handler(error),
    }
  }
}

/// Error that occurred inside a component, with the context needed to decide
/// what to do about it.
#[derive(Debug)]
pub struct StreamError<T> {
  /// The original error that occurred.
  pub source: Box<dyn Error + Send + Sync>,
  /// Context about when and where the error occurred.
  pub context: ErrorContext<T>,
  /// Information about the component that encountered the error.
  pub component: ComponentInfo,
  /// Number of times this error has been retried.
  pub retries: usize,
}

impl<T: fmt::Debug + Clone + Send + Sync> Clone for StreamError<T> {
  fn clone(&self) -> Self {
    let source: Box<dyn Error + Send + Sync> = match self.source.downcast_ref::<PipelineError>() {
      Some(e) => Box::new(e.clone()),
      None => Box::new(StringError(self.source.to_string())),
    };
    Self {
      source,
      context: self.context.clone(),
      component: self.component.clone(),
      retries: self.retries,
    }
  }
}

/// A simple error type that wraps a string message.
#[derive(Debug)]
pub struct StringError(pub String);

impl fmt::Display for StringError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Error for StringError {}

impl<T: fmt::Debug + Clone + Send + Sync> StreamError<T> {
  /// Creates a new `StreamError` with `retries` set to 0.
  pub fn new(
    source: Box<dyn Error + Send + Sync>,
    context: ErrorContext<T>,
    component: ComponentInfo,
  ) -> Self {
    Self {
      source,
      context,
      component,
      retries: 0,
    }
  }

  /// Sets the number of retries already spent on this failure.
  #[must_use]
  pub fn with_retries(mut self, retries: usize) -> Self {
    self.retries = retries;
    self
  }

  /// Converts this error into the [`PipelineError`] reported to callers.
  ///
  /// A `PipelineError` source is returned as is; any other source becomes
  /// [`PipelineError::Stage`] naming the component.
  pub fn into_pipeline_error(self) -> PipelineError {
    match self.source.downcast::<PipelineError>() {
      Ok(error) => *error,
      Err(other) => PipelineError::Stage {
        component: self.component.name,
        message: other.to_string(),
      },
    }
  }
}

impl<T: fmt::Debug + Clone + Send + Sync> fmt::Display for StreamError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Error in {} ({}): {}",
      self.component.name, self.component.type_name, self.source
    )
  }
}

impl<T: fmt::Debug + Clone + Send + Sync> Error for StreamError<T> {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(self.source.as_ref())
  }
}

/// Context information about when and where an error occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext<T> {
  /// The timestamp when the error occurred.
  pub timestamp: chrono::DateTime<chrono::Utc>,
  /// The item being processed when the error occurred, if available.
  pub item: Option<T>,
  /// The name of the component that encountered the error.
  pub component_name: String,
  /// The type of the component that encountered the error.
  pub component_type: String,
}

impl<T: fmt::Debug + Clone + Send + Sync> Default for ErrorContext<T> {
  fn default() -> Self {
    Self {
      timestamp: chrono::Utc::now(),
      item: None,
      component_name: "default".to_string(),
      component_type: "default".to_string(),
    }
  }
}

/// Information about a pipeline component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
  /// The name of the component.
  pub name: String,
  /// The type name of the component.
  pub type_name: String,
}

impl Default for ComponentInfo {
  fn default() -> Self {
    Self {
      name: "default".to_string(),
      type_name: "default".to_string(),
    }
  }
}

impl ComponentInfo {
  /// Creates a new `ComponentInfo` with the given name and type name.
  pub fn new(name: String, type_name: String) -> Self {
    Self { name, type_name }
  }
}

/// Failures surfaced by the log pipeline.
///
/// `Clone` so that failures can travel inside stream items and be duplicated by
/// the fanout stage; I/O errors are therefore shared behind an [`Arc`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
  /// A channel to a remote endpoint could not be opened, read or written.
  #[error("transport failure on {endpoint}: {source}")]
  Transport {
    /// Remote side of the failed channel.
    endpoint: Endpoint,
    /// Underlying I/O error.
    #[source]
    source: Arc<io::Error>,
  },
  /// A record block did not have the `METHOD RESOURCE PROTOCOL` / `Key: value` shape.
  #[error("malformed request from {origin}: {reason} (line {line:?})")]
  MalformedRequest {
    /// Source server the block came from.
    origin: Endpoint,
    /// What was wrong with it.
    reason: String,
    /// The offending line.
    line: String,
  },
  /// An aggregator needed a header the request did not carry.
  #[error("request for {resource} from {user} has no `{header}` header")]
  MissingHeader {
    /// Lowercase header name.
    header: String,
    /// User the request was routed to.
    user: String,
    /// Requested resource.
    resource: String,
  },
  /// One fanout target rejected an item.
  #[error("fanout target #{index} ({target}) failed: {source}")]
  FanoutDelivery {
    /// Position of the target in declaration order.
    index: usize,
    /// Component name of the target.
    target: String,
    /// The target's own failure.
    #[source]
    source: Box<PipelineError>,
  },
  /// A `host:port` string could not be parsed.
  #[error("invalid endpoint `{0}`, expected host:port")]
  InvalidEndpoint(String),
  /// The discovery handshake failed.
  #[error("discovery via {endpoint} failed: {reason}")]
  Discovery {
    /// Handshake endpoint.
    endpoint: Endpoint,
    /// Failure description.
    reason: String,
  },
  /// Invalid or unreadable configuration.
  #[error("configuration error: {0}")]
  Config(String),
  /// Any other component failure.
  #[error("{component} failed: {message}")]
  Stage {
    /// Component name.
    component: String,
    /// Failure description.
    message: String,
  },
}

impl PipelineError {
  /// Wraps an I/O error observed on the channel to `endpoint`.
  pub fn transport(endpoint: Endpoint, source: io::Error) -> Self {
    Self::Transport {
      endpoint,
      source: Arc::new(source),
    }
  }

  /// Whether retrying the failed operation can succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Transport { .. } => true,
      Self::FanoutDelivery { source, .. } => source.is_transient(),
      _ => false,
    }
  }
}
