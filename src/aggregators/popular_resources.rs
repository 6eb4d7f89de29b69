use super::StatAggregator;
use crate::error::PipelineError;
use crate::request::Request;
use crate::stat::{StatKind, StatRecord};
use std::collections::BTreeSet;

/// Collects the distinct `host + resource` values requested per window.
///
/// Every request must carry a `Host` header.
#[derive(Debug, Clone, Default)]
pub struct PopularResources {
  seen: BTreeSet<String>,
}

impl StatAggregator for PopularResources {
  fn kind(&self) -> StatKind {
    StatKind::Resources
  }

  fn observe(&mut self, user: &str, request: &Request) -> Result<(), PipelineError> {
    let host = request
      .header("host")
      .ok_or_else(|| PipelineError::MissingHeader {
        header: "host".to_string(),
        user: user.to_string(),
        resource: request.resource.clone(),
      })?;
    self.seen.insert(format!("{}{}", host, request.resource));
    Ok(())
  }

  fn flush(&mut self, user: &str) -> Vec<StatRecord> {
    std::mem::take(&mut self.seen)
      .into_iter()
      .map(|resource| StatRecord::text(StatKind::Resources, user, resource))
      .collect()
  }
}
