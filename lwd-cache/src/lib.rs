//! Reorg-safe, checksummed, append-only on-disk cache of compact blocks.
//!
//! [`BlockCache`] is the only component that touches the on-disk `lengths`
//! and `blocks` files; the Ingestor is its sole writer and the Range
//! Streamer its reader.

#![forbid(unsafe_code)]

mod cache;
pub mod error;

pub use cache::BlockCache;
pub use error::{Error, Result};
