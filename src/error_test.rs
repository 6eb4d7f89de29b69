//! # Error Handling Test Suite
//!
//! Covers the policy layer (`ErrorAction`, `ErrorStrategy`, `StreamError`,
//! `ErrorContext`, `ComponentInfo`) and the domain layer (`PipelineError`).

use crate::channel::Endpoint;
use crate::error::{
  ComponentInfo, ErrorAction, ErrorContext, ErrorStrategy, PipelineError, StreamError, StringError,
};
use std::error::Error;
use std::io;

fn stream_error(source: Box<dyn Error + Send + Sync>) -> StreamError<String> {
  StreamError::new(
    source,
    ErrorContext {
      item: Some("GET / HTTP/1.1".to_string()),
      component_name: "parser".to_string(),
      component_type: "RequestParserTransformer".to_string(),
      ..ErrorContext::default()
    },
    ComponentInfo::new("parser".to_string(), "RequestParserTransformer".to_string()),
  )
}

fn transport_error() -> PipelineError {
  PipelineError::transport(
    Endpoint::new("logs", 7001),
    io::Error::from(io::ErrorKind::ConnectionReset),
  )
}

#[test]
fn test_fixed_strategies_decide() {
  let error = stream_error(Box::new(StringError("boom".to_string())));
  assert_eq!(ErrorStrategy::Stop.decide(&error), ErrorAction::Stop);
  assert_eq!(ErrorStrategy::Skip.decide(&error), ErrorAction::Skip);
}

#[test]
fn test_retry_strategy_counts_retries() {
  let strategy = ErrorStrategy::<String>::Retry(2);
  let fresh = stream_error(Box::new(StringError("x".to_string())));

  assert_eq!(strategy.decide(&fresh), ErrorAction::Retry);
  assert_eq!(strategy.decide(&fresh.clone().with_retries(1)), ErrorAction::Retry);
  assert_eq!(strategy.decide(&fresh.clone().with_retries(2)), ErrorAction::Stop);
  assert_eq!(ErrorStrategy::<String>::Retry(0).decide(&fresh), ErrorAction::Stop);
}

#[test]
fn test_custom_strategy_sees_context() {
  let strategy = ErrorStrategy::<String>::new_custom(|error| match error.context.item.as_deref() {
    Some(line) if line.starts_with("GET") => ErrorAction::Skip,
    _ => ErrorAction::Stop,
  });

  let error = stream_error(Box::new(StringError("bad".to_string())));
  assert_eq!(strategy.decide(&error), ErrorAction::Skip);
  assert_eq!(strategy, strategy.clone());
  assert_eq!(format!("{:?}", strategy), "ErrorStrategy::Custom");
}

#[test]
fn test_strategy_equality() {
  assert_eq!(ErrorStrategy::<String>::Retry(3), ErrorStrategy::Retry(3));
  assert_ne!(ErrorStrategy::<String>::Retry(3), ErrorStrategy::Retry(4));
  assert_ne!(ErrorStrategy::<String>::Stop, ErrorStrategy::Skip);
}

#[test]
fn test_stream_error_display_and_source() {
  let error = stream_error(Box::new(StringError("no colon".to_string())));
  assert_eq!(
    error.to_string(),
    "Error in parser (RequestParserTransformer): no colon"
  );
  assert_eq!(error.source().map(|s| s.to_string()).as_deref(), Some("no colon"));
}

#[test]
fn test_stream_error_clone_keeps_pipeline_error() {
  let error = stream_error(Box::new(transport_error())).with_retries(4);
  let cloned = error.clone();

  assert_eq!(cloned.retries, 4);
  assert!(cloned.source.downcast_ref::<PipelineError>().is_some());
  assert_eq!(cloned.context, error.context);
}

#[test]
fn test_into_pipeline_error() {
  let transport = stream_error(Box::new(transport_error())).into_pipeline_error();
  assert!(matches!(transport, PipelineError::Transport { .. }));

  let other = stream_error(Box::new(StringError("odd".to_string()))).into_pipeline_error();
  assert!(matches!(
    other,
    PipelineError::Stage { ref component, ref message } if component == "parser" && message == "odd"
  ));
}

#[test]
fn test_pipeline_error_display() {
  assert_eq!(
    transport_error().to_string(),
    format!(
      "transport failure on logs:7001: {}",
      io::Error::from(io::ErrorKind::ConnectionReset)
    )
  );
  assert_eq!(
    PipelineError::MissingHeader {
      header: "host".to_string(),
      user: "alice".to_string(),
      resource: "/x".to_string(),
    }
    .to_string(),
    "request for /x from alice has no `host` header"
  );
  assert_eq!(
    PipelineError::InvalidEndpoint("nope".to_string()).to_string(),
    "invalid endpoint `nope`, expected host:port"
  );
}

#[test]
fn test_transient_errors() {
  assert!(transport_error().is_transient());
  assert!(
    PipelineError::FanoutDelivery {
      index: 1,
      target: "bytes_router".to_string(),
      source: Box::new(transport_error()),
    }
    .is_transient()
  );
  assert!(!PipelineError::Config("x".to_string()).is_transient());
}

#[test]
fn test_fanout_error_chain() {
  let error = PipelineError::FanoutDelivery {
    index: 0,
    target: "requests_router".to_string(),
    source: Box::new(PipelineError::Config("inner".to_string())),
  };
  let source = error.source().map(|s| s.to_string());
  assert_eq!(source.as_deref(), Some("configuration error: inner"));
}

#[test]
fn test_defaults() {
  let context = ErrorContext::<String>::default();
  assert_eq!(context.item, None);
  assert_eq!(context.component_name, "default");
  assert_eq!(ComponentInfo::default().type_name, "default");
}
