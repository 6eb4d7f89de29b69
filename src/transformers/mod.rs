//! Built-in transformers.

/// Parses record blocks into requests.
pub mod request_parser_transformer;
/// Fair round-robin merge of several streams.
pub mod round_robin_merge_transformer;

pub use request_parser_transformer::RequestParserTransformer;
pub use round_robin_merge_transformer::RoundRobinMergeTransformer;
