use super::StatAggregator;
use crate::error::PipelineError;
use crate::request::Request;
use crate::stat::{StatKind, StatRecord};
use std::collections::BTreeSet;

/// Collects distinct client addresses per window.
///
/// The client is the first comma-separated token of `X-Forwarded-For`, taken
/// as is: it keeps inner whitespace and may be empty. Requests without that
/// header are ignored.
#[derive(Debug, Clone, Default)]
pub struct IpAddresses {
  seen: BTreeSet<String>,
}

impl StatAggregator for IpAddresses {
  fn kind(&self) -> StatKind {
    StatKind::IpAddr
  }

  fn observe(&mut self, _user: &str, request: &Request) -> Result<(), PipelineError> {
    if let Some(forwarded) = request.header("x-forwarded-for") {
      let client = forwarded.split(',').next().unwrap_or_default();
      self.seen.insert(client.to_string());
    }
    Ok(())
  }

  fn flush(&mut self, user: &str) -> Vec<StatRecord> {
    std::mem::take(&mut self.seen)
      .into_iter()
      .map(|address| StatRecord::text(StatKind::IpAddr, user, address))
      .collect()
  }
}
