//! The Range/Query Service (spec.md §4.5): the `CompactTxStreamer` gRPC
//! server, the prefix filter (§4.6), and the error-to-`Status` mapping (§7).

#![forbid(unsafe_code)]

pub mod error;
pub mod filter;
pub mod proto;
pub mod service;

pub use error::{Error, Result};
pub use proto::{CompactTxStreamer, CompactTxStreamerServer};
pub use service::{BuildInfo, Service};
