//! One-shot handshake that yields the access token and the log servers.
//!
//! The peer sends the token on the first line, then one `host:port` per line,
//! and closes the connection. Blank lines are ignored. Nothing is sent by us.

use crate::channel::{Connector, Endpoint, LineChannel};
use crate::error::PipelineError;

/// Result of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
  /// Token to present on every later connection.
  pub token: String,
  /// Log servers, in the order announced.
  pub servers: Vec<Endpoint>,
}

/// Performs the handshake against `endpoint`. Not retried.
pub async fn handshake(
  connector: &dyn Connector,
  endpoint: &Endpoint,
) -> Result<Discovery, PipelineError> {
  let failed = |reason: String| PipelineError::Discovery {
    endpoint: endpoint.clone(),
    reason,
  };

  let mut channel = LineChannel::open(connector, endpoint, None)
    .await
    .map_err(|e| failed(e.to_string()))?;

  let token = match channel.read_line().await.map_err(|e| failed(e.to_string()))? {
    Some(line) if !line.trim().is_empty() => line.trim().to_string(),
    _ => return Err(failed("no token received".to_string())),
  };

  let mut servers = Vec::new();
  while let Some(line) = channel.read_line().await.map_err(|e| failed(e.to_string()))? {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let server = line
      .parse::<Endpoint>()
      .map_err(|e| failed(format!("bad server entry: {}", e)))?;
    servers.push(server);
  }

  tracing::info!(
    endpoint = %endpoint,
    servers = servers.len(),
    "Discovery complete"
  );
  Ok(Discovery { token, servers })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::testing::{ScriptedConnector, ScriptedTransport, Step};
  use std::io;

  fn endpoint() -> Endpoint {
    Endpoint::new("discovery", 7000)
  }

  #[tokio::test]
  async fn test_token_and_servers() {
    let transport = ScriptedTransport::lines("abc123\r\nlogs-1:7001\r\n\r\nlogs-2:7002\r\n");
    let written = transport.written();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);

    let discovery = handshake(&connector, &endpoint()).await.unwrap();

    assert_eq!(discovery.token, "abc123");
    assert_eq!(
      discovery.servers,
      vec![Endpoint::new("logs-1", 7001), Endpoint::new("logs-2", 7002)]
    );
    assert!(written.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_token_only() {
    let connector = ScriptedConnector::new(vec![Ok(ScriptedTransport::lines("tok\n"))]);
    let discovery = handshake(&connector, &endpoint()).await.unwrap();
    assert_eq!(discovery.token, "tok");
    assert!(discovery.servers.is_empty());
  }

  #[tokio::test]
  async fn test_failures() {
    let refused = ScriptedConnector::new(Vec::new());
    assert!(matches!(
      handshake(&refused, &endpoint()).await,
      Err(PipelineError::Discovery { .. })
    ));

    let silent = ScriptedConnector::new(vec![Ok(ScriptedTransport::lines(""))]);
    assert!(handshake(&silent, &endpoint()).await.is_err());

    let garbage = ScriptedConnector::new(vec![Ok(ScriptedTransport::lines("tok\nnot-an-endpoint\n"))]);
    assert!(handshake(&garbage, &endpoint()).await.is_err());

    let reset = ScriptedConnector::new(vec![Ok(ScriptedTransport::new(vec![
      Step::Data(b"tok\r\nlogs-1:7001\r\n".to_vec()),
      Step::Fail(io::ErrorKind::ConnectionReset),
    ]))]);
    assert!(handshake(&reset, &endpoint()).await.is_err());
  }
}
