//! # logweave
//!
//! Streaming aggregation of HTTP access logs tailed from several servers.
//!
//! Each log server streams request records over a line channel. logweave
//! reads every server with automatic reconnection, parses the records,
//! interleaves the servers fairly, and keeps per-user statistics over global
//! windows of `window_size` requests. At the end of each window it reports,
//! for every user seen so far:
//!
//! - `requests`: how many requests the user made,
//! - `bytes`: the summed `Content-Length`,
//! - `resources`: every distinct `host + resource` requested,
//! - `ipaddr`: every distinct client address (first `X-Forwarded-For` hop).
//!
//! Records go to one persistent report channel as
//! `"{kind}: {user} {value}\r\n"`.
//!
//! ## Building blocks
//!
//! The pipeline is made of [`Producer`]s, [`Transformer`]s and [`Consumer`]s,
//! each carrying a configuration with an [`ErrorStrategy`]:
//!
//! - [`producers::LogSourceProducer`] tails one server,
//! - [`transformers::RequestParserTransformer`] turns record blocks into
//!   [`Request`]s,
//! - [`transformers::RoundRobinMergeTransformer`] interleaves the servers,
//! - [`consumers::PerUserRouter`] and [`consumers::AggregatorConsumer`] keep
//!   per-user statistics,
//! - [`consumers::ReportConsumer`] writes the report.
//!
//! [`LogPipeline`] wires them together from a [`PipelineConfig`].
//!
//! ```rust,no_run
//! use logweave::{LogPipeline, PipelineConfig, TcpConnector};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), logweave::PipelineError> {
//! let config = PipelineConfig::new(
//!   vec!["logs-1.internal:7001".parse()?, "logs-2.internal:7001".parse()?],
//!   "collector.internal:7000".parse()?,
//! );
//! let pipeline = LogPipeline::new(config, Arc::new(TcpConnector::default()))?;
//! let summary = pipeline.run(CancellationToken::new()).await?;
//! println!("{} requests", summary.requests);
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Per-user statistic aggregators.
pub mod aggregators;
/// Endpoints, transports and CRLF line channels.
pub mod channel;
/// Pipeline configuration.
pub mod config;
/// Consumer trait and configuration.
pub mod consumer;
/// Built-in consumers.
pub mod consumers;
/// Token and server discovery handshake.
pub mod discovery;
/// Error handling types and strategies.
pub mod error;
/// Input side of pipeline components.
pub mod input;
/// Logging setup.
pub mod logging;
/// Output side of pipeline components.
pub mod output;
/// Pipeline assembly and drive loop.
pub mod pipeline;
/// Producer trait and configuration.
pub mod producer;
/// Built-in producers.
pub mod producers;
/// Request records and parsing.
pub mod request;
/// Statistic records.
pub mod stat;
/// Transformer trait and configuration.
pub mod transformer;
/// Built-in transformers.
pub mod transformers;

#[cfg(test)]
mod error_test;

pub use channel::{Connector, Endpoint, LineChannel, TcpConnector, Transport};
pub use config::{LogConfig, LogFormat, LogLevel, MalformedPolicy, NetworkConfig, PipelineConfig};
pub use consumer::{Consumer, ConsumerConfig, DynConsumer};
pub use discovery::{Discovery, handshake};
pub use error::{
  ComponentInfo, ErrorAction, ErrorContext, ErrorStrategy, PipelineError, StreamError,
};
pub use input::Input;
pub use output::Output;
pub use pipeline::{LogPipeline, PipelineSummary};
pub use producer::{Producer, ProducerConfig};
pub use request::{Item, RecordBlock, Request};
pub use stat::{StatKind, StatRecord, StatValue};
pub use transformer::{Transformer, TransformerConfig};
