//! Built-in producers.

/// Producer that tails a remote log server.
pub mod log_source_producer;

pub use log_source_producer::{LogSourceProducer, SourceItem};
