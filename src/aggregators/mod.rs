//! Per-user statistic aggregators.
//!
//! Each aggregator instance belongs to exactly one user. It observes that
//! user's requests between window boundaries and, on flush, emits its
//! statistic records and resets.
//!
//! | aggregator | observes | emits on flush |
//! |---|---|---|
//! | [`RequestCount`] | every request | one `requests` count, even if 0 |
//! | [`ByteCount`] | `Content-Length` | one `bytes` total, even if 0 |
//! | [`PopularResources`] | `Host` + resource | one `resources` record per distinct value |
//! | [`IpAddresses`] | first `X-Forwarded-For` hop | one `ipaddr` record per distinct address |

use crate::error::PipelineError;
use crate::request::Request;
use crate::stat::{StatKind, StatRecord};

mod byte_count;
mod ip_addresses;
mod popular_resources;
mod request_count;

pub use byte_count::ByteCount;
pub use ip_addresses::IpAddresses;
pub use popular_resources::PopularResources;
pub use request_count::RequestCount;

/// Accumulates one statistic for one user between flushes.
pub trait StatAggregator: Send + 'static {
  /// The statistic this aggregator produces.
  fn kind(&self) -> StatKind;

  /// Folds one request into the current window.
  fn observe(&mut self, user: &str, request: &Request) -> Result<(), PipelineError>;

  /// Emits the window's records and resets.
  fn flush(&mut self, user: &str) -> Vec<StatRecord>;
}

/// Creates a fresh aggregator of the given kind.
pub fn for_kind(kind: StatKind) -> Box<dyn StatAggregator> {
  match kind {
    StatKind::Requests => Box::new(RequestCount::default()),
    StatKind::Bytes => Box::new(ByteCount::default()),
    StatKind::Resources => Box::new(PopularResources::default()),
    StatKind::IpAddr => Box::new(IpAddresses::default()),
  }
}

impl StatAggregator for Box<dyn StatAggregator> {
  fn kind(&self) -> StatKind {
    (**self).kind()
  }

  fn observe(&mut self, user: &str, request: &Request) -> Result<(), PipelineError> {
    (**self).observe(user, request)
  }

  fn flush(&mut self, user: &str) -> Vec<StatRecord> {
    (**self).flush(user)
  }
}
