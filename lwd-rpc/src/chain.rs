//! The typed contract against the upstream full node (spec.md §6).
//!
//! Every RPC the rest of the workspace needs goes through this trait, never
//! through raw JSON — that keeps `lwd-ingest` and `lwd-service` free of
//! upstream wire-format detail, and lets tests substitute an in-memory fake.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    BlockchainInfo, GetInfo, UpstreamSubtreeRoot, UpstreamTreeState, VerboseBlock,
    VerboseTransaction,
};

/// Which shielded pool a subtree-roots request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Sapling,
    Orchard,
}

/// The upstream JSON-RPC surface this service depends on.
///
/// Implemented by [`HttpChain`] against a real node, and by an in-memory
/// fake in tests (see `lwd-ingest`'s and `lwd-service`'s test modules).
#[async_trait]
pub trait Chain: Send + Sync {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo>;
    async fn get_info(&self) -> Result<GetInfo>;
    /// Big-endian display-form hex string, as the node prints it.
    async fn get_best_block_hash(&self) -> Result<String>;
    /// `getblock <height> 1`.
    async fn get_block_verbose(&self, height: u64) -> Result<VerboseBlock>;
    /// `getblock <hash> 0` — raw serialized block bytes.
    async fn get_block_raw(&self, hash: &str) -> Result<Vec<u8>>;
    async fn get_raw_transaction(&self, txid_hex: &str) -> Result<VerboseTransaction>;
    async fn get_raw_mempool(&self) -> Result<Vec<String>>;
    async fn get_address_txids(
        &self,
        address: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<String>>;
    async fn z_gettreestate(&self, height: u64) -> Result<UpstreamTreeState>;
    async fn z_getsubtreesbyindex(
        &self,
        pool: Pool,
        start_index: u64,
        max_entries: u32,
    ) -> Result<Vec<UpstreamSubtreeRoot>>;
    /// Returns the upstream-assigned txid hex on success, or an `Error::Rpc`
    /// carrying the upstream's `-NN:` code/message on rejection.
    async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String>;
}
