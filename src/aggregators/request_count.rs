use super::StatAggregator;
use crate::error::PipelineError;
use crate::request::Request;
use crate::stat::{StatKind, StatRecord};

/// Counts requests per window.
#[derive(Debug, Clone, Default)]
pub struct RequestCount {
  count: u64,
}

impl StatAggregator for RequestCount {
  fn kind(&self) -> StatKind {
    StatKind::Requests
  }

  fn observe(&mut self, _user: &str, _request: &Request) -> Result<(), PipelineError> {
    self.count += 1;
    Ok(())
  }

  fn flush(&mut self, user: &str) -> Vec<StatRecord> {
    let count = std::mem::take(&mut self.count);
    vec![StatRecord::count(StatKind::Requests, user, count)]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::aggregators::testing::request;

  #[test]
  fn test_count_resets_after_flush() {
    let get = request("GET / HTTP/1.1", &[]);
    let mut alice = RequestCount::default();
    let mut bob = RequestCount::default();

    alice.observe("a", &get).unwrap();
    alice.observe("a", &get).unwrap();
    bob.observe("b", &get).unwrap();

    assert_eq!(alice.flush("a"), vec![StatRecord::count(StatKind::Requests, "a", 2)]);
    assert_eq!(bob.flush("b"), vec![StatRecord::count(StatKind::Requests, "b", 1)]);
    assert_eq!(alice.flush("a"), vec![StatRecord::count(StatKind::Requests, "a", 0)]);
    assert_eq!(bob.flush("b"), vec![StatRecord::count(StatKind::Requests, "b", 0)]);
  }
}
