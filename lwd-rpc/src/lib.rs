//! Typed JSON-RPC contract against the upstream full node.
//!
//! [`chain::Chain`] is the seam the rest of the workspace depends on; tests
//! substitute [`fake::FakeChain`] for a real node. [`http::HttpChain`] is
//! the production implementation.

#![forbid(unsafe_code)]

pub mod chain;
pub mod error;
pub mod fake;
pub mod http;
pub mod retry;
pub mod types;

pub use chain::{Chain, Pool};
pub use error::{Error, Result};
pub use http::HttpChain;
