//! Built-in consumers.
//!
//! The analysis half of the pipeline is a static tree of push consumers:
//!
//! ```text
//! FanoutConsumer
//!  ├─ PerUserRouter ─ AggregatorConsumer<RequestCount>     ─┐
//!  ├─ PerUserRouter ─ AggregatorConsumer<ByteCount>        ─┤
//!  ├─ PerUserRouter ─ AggregatorConsumer<PopularResources> ─┼─ SharedConsumer<ReportConsumer>
//!  └─ PerUserRouter ─ AggregatorConsumer<IpAddresses>      ─┘
//! ```

/// Binds one statistic aggregator to one user.
pub mod aggregator_consumer;
/// Delivers every item to several consumers.
pub mod fanout_consumer;
/// Routes requests to per-user consumers and flushes them every window.
pub mod per_user_router_consumer;
/// Writes statistic records to the report endpoint.
pub mod report_consumer;
/// Cloneable handle to one consumer.
pub mod shared_consumer;
/// Collects items into a `Vec`.
pub mod vec_consumer;

pub use aggregator_consumer::AggregatorConsumer;
pub use fanout_consumer::FanoutConsumer;
pub use per_user_router_consumer::{
  ConsumerFactory, EvictIdle, EvictionPolicy, NeverEvict, PerUserRouter,
};
pub use report_consumer::ReportConsumer;
pub use shared_consumer::SharedConsumer;
pub use vec_consumer::VecConsumer;
