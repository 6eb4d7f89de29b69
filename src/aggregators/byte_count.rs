use super::StatAggregator;
use crate::error::PipelineError;
use crate::request::Request;
use crate::stat::{StatKind, StatRecord};

/// Sums `Content-Length` per window.
///
/// A missing or non-numeric length counts as 0.
#[derive(Debug, Clone, Default)]
pub struct ByteCount {
  total: u64,
}

impl StatAggregator for ByteCount {
  fn kind(&self) -> StatKind {
    StatKind::Bytes
  }

  fn observe(&mut self, _user: &str, request: &Request) -> Result<(), PipelineError> {
    let length = request
      .header("content-length")
      .and_then(|v| v.parse::<u64>().ok())
      .unwrap_or(0);
    self.total = self.total.saturating_add(length);
    Ok(())
  }

  fn flush(&mut self, user: &str) -> Vec<StatRecord> {
    let total = std::mem::take(&mut self.total);
    vec![StatRecord::count(StatKind::Bytes, user, total)]
  }
}
