//! The Block Ingestor and Mempool Tracker: the two long-running activities
//! that keep the Block Cache and mempool mirror in sync with the upstream node.

#![forbid(unsafe_code)]

pub mod cancel;
pub mod error;
pub mod ingestor;
pub mod mempool;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use ingestor::Ingestor;
pub use mempool::MempoolTracker;
