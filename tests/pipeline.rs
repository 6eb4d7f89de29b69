use logweave::{
  Endpoint, LogPipeline, MalformedPolicy, PipelineConfig, PipelineError, TcpConnector, handshake,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SERVER_A: &str = "GET /x HTTP/1.1\r\n\
From: alice\r\n\
Host: a.com\r\n\
Content-Length: 10\r\n\
X-Forwarded-For: 1.1.1.1, 2.2.2.2\r\n\
\r\n\
GET /y HTTP/1.1\r\n\
From: bob\r\n\
Host: b.com\r\n\
\r\n";

const SERVER_B: &str = "POST /x HTTP/1.1\r\n\
From: alice\r\n\
Host: a.com\r\n\
Content-Length: 5\r\n\
\r\n\
GET /z HTTP/1.1\r\n\
Host: c.com\r\n\
\r\n";

/// Report for SERVER_A and SERVER_B merged round-robin with a window of 2.
const EXPECTED_REPORT: &str = "secret\r\n\
requests: alice 2\r\n\
bytes: alice 15\r\n\
resources: alice a.com/x\r\n\
ipaddr: alice 1.1.1.1\r\n\
requests: alice 0\r\n\
requests: bob 1\r\n\
requests: <unknown> 1\r\n\
bytes: alice 0\r\n\
bytes: bob 0\r\n\
bytes: <unknown> 0\r\n\
resources: bob b.com/y\r\n\
resources: <unknown> c.com/z\r\n";

async fn listen() -> (TcpListener, Endpoint) {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  (listener, Endpoint::new("127.0.0.1", port))
}

/// Serves `body` to one client and returns the token it presented.
async fn log_server(body: &'static str) -> (Endpoint, JoinHandle<String>) {
  let (listener, endpoint) = listen().await;
  let handle = tokio::spawn(async move {
    let (socket, _) = listener.accept().await.unwrap();
    let (read, mut write) = socket.into_split();
    let mut token = String::new();
    BufReader::new(read).read_line(&mut token).await.unwrap();
    write.write_all(body.as_bytes()).await.unwrap();
    write.shutdown().await.unwrap();
    token.trim_end().to_string()
  });
  (endpoint, handle)
}

/// Collects everything one client writes until it closes.
async fn report_server() -> (Endpoint, JoinHandle<String>) {
  let (listener, endpoint) = listen().await;
  let handle = tokio::spawn(async move {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut report = String::new();
    socket.read_to_string(&mut report).await.unwrap();
    report
  });
  (endpoint, handle)
}

fn config(servers: Vec<Endpoint>, report: Endpoint) -> PipelineConfig {
  PipelineConfig {
    window_size: 2,
    token: Some("secret".to_string()),
    ..PipelineConfig::new(servers, report)
  }
}

async fn run(config: PipelineConfig) -> Result<logweave::PipelineSummary, PipelineError> {
  let pipeline = LogPipeline::new(config, Arc::new(TcpConnector::default()))?;
  tokio::time::timeout(Duration::from_secs(10), pipeline.run(CancellationToken::new()))
    .await
    .expect("pipeline did not finish")
}

#[tokio::test]
async fn test_two_servers_end_to_end() {
  let (a, a_token) = log_server(SERVER_A).await;
  let (b, b_token) = log_server(SERVER_B).await;
  let (report, received) = report_server().await;

  let summary = run(config(vec![a, b], report)).await.unwrap();

  assert_eq!(summary.requests, 4);
  assert_eq!(summary.records_reported, 12);
  assert_eq!(a_token.await.unwrap(), "secret");
  assert_eq!(b_token.await.unwrap(), "secret");
  assert_eq!(received.await.unwrap(), EXPECTED_REPORT);
}

#[tokio::test]
async fn test_prefetch_keeps_report_identical() {
  let (a, _) = log_server(SERVER_A).await;
  let (b, _) = log_server(SERVER_B).await;
  let (report, received) = report_server().await;
  let mut config = config(vec![a, b], report);
  config.prefetch = Some(1);

  run(config).await.unwrap();

  assert_eq!(received.await.unwrap(), EXPECTED_REPORT);
}

#[tokio::test]
async fn test_discovery_then_report_to_same_endpoint() {
  let (a, _) = log_server(SERVER_A).await;
  let (b, _) = log_server(SERVER_B).await;
  let (listener, discovery) = listen().await;
  let announced = format!("secret\r\n{}\r\n{}\r\n", a, b);
  let received = tokio::spawn(async move {
    let (mut handshake_socket, _) = listener.accept().await.unwrap();
    handshake_socket.write_all(announced.as_bytes()).await.unwrap();
    handshake_socket.shutdown().await.unwrap();
    drop(handshake_socket);

    let (mut report_socket, _) = listener.accept().await.unwrap();
    let mut report = String::new();
    report_socket.read_to_string(&mut report).await.unwrap();
    report
  });

  let connector = TcpConnector::default();
  let found = handshake(&connector, &discovery).await.unwrap();
  assert_eq!(found.servers, vec![a, b]);

  let mut config = PipelineConfig {
    window_size: 2,
    discovery: Some(discovery),
    ..PipelineConfig::default()
  };
  config.apply_discovery(found);
  run(config).await.unwrap();

  assert_eq!(received.await.unwrap(), EXPECTED_REPORT);
}

#[tokio::test]
async fn test_malformed_record_stops_pipeline() {
  let (a, _) = log_server("BROKEN\r\n\r\n").await;
  let (report, received) = report_server().await;

  let err = run(config(vec![a], report)).await.unwrap_err();

  assert!(matches!(err, PipelineError::MalformedRequest { .. }));
  received.abort();
}

#[tokio::test]
async fn test_malformed_record_skipped_when_configured() {
  let (a, _) = log_server(
    "GET /a HTTP/1.1\r\nFrom: erin\r\nHost: h\r\n\r\n\
     BROKEN\r\n\r\n\
     GET /b HTTP/1.1\r\nFrom: erin\r\nHost: h\r\n\r\n",
  )
  .await;
  let (report, received) = report_server().await;
  let mut config = config(vec![a], report);
  config.on_malformed = MalformedPolicy::Skip;

  let summary = run(config).await.unwrap();

  assert_eq!(summary.requests, 2);
  assert_eq!(
    received.await.unwrap(),
    "secret\r\nrequests: erin 2\r\nbytes: erin 0\r\nresources: erin h/a\r\nresources: erin h/b\r\n"
  );
}

#[tokio::test]
async fn test_cancellation_ends_run() {
  let (listener, endpoint) = listen().await;
  let _server = tokio::spawn(async move {
    let (mut socket, _) = listener.accept().await.unwrap();
    socket
      .write_all(b"GET / HTTP/1.1\r\nFrom: frank\r\nHost: h\r\n\r\n")
      .await
      .unwrap();
    // keep the stream open until the test ends
    tokio::time::sleep(Duration::from_secs(60)).await;
    drop(socket);
  });
  let (report, _) = report_server().await;
  let mut config = config(vec![endpoint], report);
  config.window_size = 100;

  let pipeline = LogPipeline::new(config, Arc::new(TcpConnector::default())).unwrap();
  let shutdown = CancellationToken::new();
  let trigger = shutdown.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(300)).await;
    trigger.cancel();
  });

  let summary = tokio::time::timeout(Duration::from_secs(10), pipeline.run(shutdown))
    .await
    .expect("cancellation was not observed")
    .unwrap();
  assert_eq!(summary.requests, 1);
  assert_eq!(summary.records_reported, 0);
}

#[tokio::test]
async fn test_unreachable_source_fails_run() {
  let (listener, dead) = listen().await;
  drop(listener);
  let (report, received) = report_server().await;
  let mut config = config(vec![dead.clone()], report);
  config.network.max_reconnects = Some(0);

  let err = run(config).await.unwrap_err();

  match err {
    PipelineError::Transport { endpoint, .. } => assert_eq!(endpoint, dead),
    other => panic!("unexpected error: {other}"),
  }
  received.abort();
}
