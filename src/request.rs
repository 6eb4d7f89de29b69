//! Record blocks and the requests parsed from them.
//!
//! A log server emits one HTTP-style request per record:
//!
//! ```text
//! GET /index.html HTTP/1.1
//! Host: example.com
//! From: alice
//!
//! ```
//!
//! The source reader groups the non-blank lines of a record into a
//! [`RecordBlock`]; [`parse`] turns a block into a [`Request`].

use crate::channel::Endpoint;
use crate::error::PipelineError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// User key for requests without a `From` header.
pub const UNKNOWN_USER: &str = "<unknown>";

/// The non-blank lines of one record, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBlock {
  /// Server the block was read from.
  pub source: Endpoint,
  /// Trimmed, non-empty lines.
  pub lines: Vec<String>,
  /// Index of the first line that arrived as invalid UTF-8. That line holds
  /// a lossy decoding and the block is rejected by [`parse`].
  pub undecodable: Option<usize>,
}

impl RecordBlock {
  /// Creates a block read from `source`.
  pub fn new(source: Endpoint, lines: Vec<String>) -> Self {
    Self {
      source,
      lines,
      undecodable: None,
    }
  }

  /// Marks line `index` as not valid UTF-8.
  #[must_use]
  pub fn with_undecodable(mut self, index: Option<usize>) -> Self {
    self.undecodable = index;
    self
  }
}

/// A structured request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  /// Request method, e.g. `GET`.
  pub method: String,
  /// Requested resource path.
  pub resource: String,
  /// Protocol token, e.g. `HTTP/1.1`.
  pub protocol: String,
  /// Headers keyed by lowercase name.
  pub headers: HashMap<String, String>,
}

impl Request {
  /// Looks up a header case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  /// The aggregation key: the `From` header, or [`UNKNOWN_USER`].
  pub fn user(&self) -> &str {
    self.header("from").unwrap_or(UNKNOWN_USER)
  }
}

/// Writes the request back in wire form, headers sorted by name.
impl fmt::Display for Request {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{} {} {}", self.method, self.resource, self.protocol)?;
    let mut headers: Vec<_> = self.headers.iter().collect();
    headers.sort();
    for (key, value) in headers {
      writeln!(f, "{}: {}", key, value)?;
    }
    Ok(())
  }
}

/// Parses one record block.
///
/// The first line must split into exactly three whitespace-separated tokens.
/// Every further line must contain a `:`; the key is trimmed and lowercased,
/// the value trimmed. A repeated header keeps its last value. A block holding
/// an undecodable line is malformed.
pub fn parse(block: &RecordBlock) -> Result<Request, PipelineError> {
  let malformed = |reason: &str, line: &str| PipelineError::MalformedRequest {
    origin: block.source.clone(),
    reason: reason.to_string(),
    line: line.to_string(),
  };

  if let Some(index) = block.undecodable {
    let line = block.lines.get(index).map_or("", String::as_str);
    return Err(malformed("line is not valid UTF-8", line));
  }

  let (first, rest) = block
    .lines
    .split_first()
    .ok_or_else(|| malformed("empty record", ""))?;

  let mut tokens = first.split_whitespace();
  let (method, resource, protocol) =
    match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
      (Some(method), Some(resource), Some(protocol), None) => (method, resource, protocol),
      _ => return Err(malformed("request line needs exactly three fields", first)),
    };

  let mut headers = HashMap::with_capacity(rest.len());
  for line in rest {
    let (key, value) = line
      .split_once(':')
      .ok_or_else(|| malformed("header line has no `:` separator", line))?;
    headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
  }

  Ok(Request {
    method: method.to_string(),
    resource: resource.to_string(),
    protocol: protocol.to_string(),
    headers,
  })
}

/// What a per-user aggregator receives: a request, or the end of a window.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
  /// A parsed request routed to this user.
  Request(Arc<Request>),
  /// The current window closed; emit and reset.
  Flush,
}
