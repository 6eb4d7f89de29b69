//! Statistic records emitted by the aggregators.
//!
//! On the wire a record is one line: `"{kind}: {user} {value}"`.

use std::fmt;

/// Which statistic a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKind {
  /// Number of requests in the window.
  Requests,
  /// Sum of `Content-Length` in the window.
  Bytes,
  /// A distinct `host + resource` requested in the window.
  Resources,
  /// A distinct client address seen in the window.
  IpAddr,
}

impl StatKind {
  /// All kinds, in reporting order.
  pub const ALL: [StatKind; 4] = [
    StatKind::Requests,
    StatKind::Bytes,
    StatKind::Resources,
    StatKind::IpAddr,
  ];

  /// Wire name of this kind.
  pub fn as_str(self) -> &'static str {
    match self {
      StatKind::Requests => "requests",
      StatKind::Bytes => "bytes",
      StatKind::Resources => "resources",
      StatKind::IpAddr => "ipaddr",
    }
  }
}

impl fmt::Display for StatKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Value part of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatValue {
  /// Counter value.
  Count(u64),
  /// Set element.
  Text(String),
}

impl fmt::Display for StatValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StatValue::Count(n) => write!(f, "{}", n),
      StatValue::Text(s) => f.write_str(s),
    }
  }
}

/// One emitted statistic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
  /// Statistic kind.
  pub kind: StatKind,
  /// User the statistic belongs to.
  pub user: String,
  /// Statistic value.
  pub value: StatValue,
}

impl StatRecord {
  /// A counter record.
  pub fn count(kind: StatKind, user: impl Into<String>, value: u64) -> Self {
    Self {
      kind,
      user: user.into(),
      value: StatValue::Count(value),
    }
  }

  /// A set-element record.
  pub fn text(kind: StatKind, user: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      kind,
      user: user.into(),
      value: StatValue::Text(value.into()),
    }
  }
}

/// The report line, without terminator.
impl fmt::Display for StatRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {} {}", self.kind, self.user, self.value)
  }
}
