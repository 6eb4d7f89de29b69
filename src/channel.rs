//! Line-oriented text channels to remote endpoints.
//!
//! Every network conversation in the pipeline (log sources, the report sink,
//! discovery) is a [`LineChannel`]: a buffered, bidirectional connection that
//! frames text as CRLF-terminated lines. A channel opened with a token sends it
//! as its very first line.
//!
//! Connections are created through the [`Connector`] trait so that the
//! components owning a channel can reopen it after a failure. [`TcpConnector`]
//! is the production implementation; tests substitute scripted transports.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// A `host:port` pair identifying a remote server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
  /// Host name or address.
  pub host: String,
  /// TCP port.
  pub port: u16,
}

impl Endpoint {
  /// Creates an endpoint from its parts.
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
    }
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

impl FromStr for Endpoint {
  type Err = PipelineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let (host, port) = s
      .rsplit_once(':')
      .ok_or_else(|| PipelineError::InvalidEndpoint(s.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
      return Err(PipelineError::InvalidEndpoint(s.to_string()));
    }
    let port = port
      .parse::<u16>()
      .map_err(|_| PipelineError::InvalidEndpoint(s.to_string()))?;
    Ok(Self::new(host, port))
  }
}

impl TryFrom<String> for Endpoint {
  type Error = PipelineError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Endpoint> for String {
  fn from(endpoint: Endpoint) -> Self {
    endpoint.to_string()
  }
}

/// Byte stream a [`LineChannel`] runs over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Opens transports to endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
  /// Connects to `endpoint`.
  async fn connect(&self, endpoint: &Endpoint) -> io::Result<Box<dyn Transport>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
  connect_timeout: Duration,
}

impl TcpConnector {
  /// Creates a connector that gives up connecting after `connect_timeout`.
  pub fn new(connect_timeout: Duration) -> Self {
    Self { connect_timeout }
  }
}

impl Default for TcpConnector {
  fn default() -> Self {
    Self::new(Duration::from_secs(10))
  }
}

#[async_trait]
impl Connector for TcpConnector {
  async fn connect(&self, endpoint: &Endpoint) -> io::Result<Box<dyn Transport>> {
    let address = (endpoint.host.as_str(), endpoint.port);
    let stream = match timeout(self.connect_timeout, TcpStream::connect(address)).await {
      Ok(result) => result?,
      Err(_) => {
        return Err(io::Error::new(
          io::ErrorKind::TimedOut,
          format!("connecting to {} timed out", endpoint),
        ));
      }
    };
    stream.set_nodelay(true)?;
    Ok(Box::new(stream))
  }
}

/// A buffered CRLF line channel.
pub struct LineChannel {
  endpoint: Endpoint,
  io: BufStream<Box<dyn Transport>>,
}

impl fmt::Debug for LineChannel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LineChannel")
      .field("endpoint", &self.endpoint)
      .finish_non_exhaustive()
  }
}

impl LineChannel {
  /// Opens a channel to `endpoint`, sending `token` as the first line if given.
  pub async fn open(
    connector: &dyn Connector,
    endpoint: &Endpoint,
    token: Option<&str>,
  ) -> io::Result<Self> {
    let transport = connector.connect(endpoint).await?;
    let mut channel = Self {
      endpoint: endpoint.clone(),
      io: BufStream::new(transport),
    };
    if let Some(token) = token {
      channel.write_line(token).await?;
    }
    Ok(channel)
  }

  /// The remote side of this channel.
  pub fn endpoint(&self) -> &Endpoint {
    &self.endpoint
  }

  /// Reads one line as raw bytes without its terminator; `None` at a clean
  /// end of stream.
  ///
  /// A final line that lacks a terminator is still returned.
  pub async fn read_raw_line(&mut self) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    if self.io.read_until(b'\n', &mut line).await? == 0 {
      return Ok(None);
    }
    if line.last() == Some(&b'\n') {
      line.pop();
      if line.last() == Some(&b'\r') {
        line.pop();
      }
    }
    Ok(Some(line))
  }

  /// Reads one UTF-8 line without its terminator; `None` at a clean end of
  /// stream.
  ///
  /// A line that is not valid UTF-8 is consumed and reported as
  /// [`io::ErrorKind::InvalidData`]; the channel stays usable.
  pub async fn read_line(&mut self) -> io::Result<Option<String>> {
    match self.read_raw_line().await? {
      Some(bytes) => String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
      None => Ok(None),
    }
  }

  /// Writes `line` followed by CRLF and flushes.
  pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
    self.io.write_all(line.as_bytes()).await?;
    self.io.write_all(b"\r\n").await?;
    self.io.flush().await
  }

  /// Flushes pending output and shuts down the write half.
  pub async fn shutdown(&mut self) -> io::Result<()> {
    self.io.flush().await?;
    self.io.shutdown().await
  }
}
