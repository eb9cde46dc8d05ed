//! Ingestion source implementations
//!
//! Four source kinds feed the pipeline:
//! - [`log_stream`]: push subscription to decoded chain log events;
//! - [`receipt_poller`]: block-explorer polling over a watched token
//!   list with persisted high-watermarks;
//! - [`alert_feed`]: firehose of pre-filtered large-value transactions;
//! - [`rpc_parser`]: on-demand receipt decoding for supplied tx hashes.

pub mod alert_feed;
pub mod log_stream;
pub mod receipt_poller;
pub mod rpc_parser;

pub use alert_feed::{AlertFeedConfig, AlertFeedSource};
pub use log_stream::{LogStreamConfig, LogStreamSource};
pub use receipt_poller::{ReceiptPollerConfig, ReceiptPollerSource};
pub use rpc_parser::{RpcParserConfig, RpcParserSource};
