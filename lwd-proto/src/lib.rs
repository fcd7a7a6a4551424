//! Compact block wire types and the raw-block -> compact-block codec.
//!
//! This is the foundation every other crate in the workspace builds on: the
//! [`types`] module defines the records that get persisted by the cache and
//! served to wallets, and [`codec::parse`] is the only place raw upstream
//! block bytes get interpreted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(missing_docs)] // lifted selectively in `types`, which documents its own public items

pub mod codec;
mod cursor;
pub mod error;
pub mod txid;
pub mod types;

pub use error::{ParseError, Result};
pub use types::*;
