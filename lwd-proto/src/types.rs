//! Wire types served to wallet clients and persisted by the Block Cache.
//!
//! These mirror a lightwalletd-style `CompactTxStreamer` service definition.
//! As in the teacher crate, the types are hand-written `prost::Message` impls
//! rather than generated from a `.proto` file via `tonic-build` — the wire
//! format is a stable, external protocol, and skipping the `protoc`
//! build-time dependency keeps the workspace buildable anywhere.

#![allow(missing_docs)]

use prost::Message;

/// A nullifier-only Sapling spend.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct CompactSaplingSpend {
    /// 32-byte nullifier.
    #[prost(bytes = "vec", tag = "1")]
    pub nullifier: Vec<u8>,
}

/// A Sapling output, truncated to what trial decryption needs.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct CompactSaplingOutput {
    #[prost(bytes = "vec", tag = "1")]
    pub note_commitment: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub ephemeral_key: Vec<u8>,
    /// First 52 bytes of the encrypted note ciphertext.
    #[prost(bytes = "vec", tag = "3")]
    pub ciphertext_prefix: Vec<u8>,
}

/// An Orchard action, truncated to what trial decryption needs.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct CompactOrchardAction {
    #[prost(bytes = "vec", tag = "1")]
    pub nullifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub commitment: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ephemeral_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub ciphertext_prefix: Vec<u8>,
}

/// Per-transaction compact record. Only present in a block's `txs` list if
/// the transaction carries at least one shielded element.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct CompactTx {
    /// 0-based position in the full block (transparent-only txs still
    /// consume an index, so this is not necessarily dense).
    #[prost(uint64, tag = "1")]
    pub index: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub spends: Vec<CompactSaplingSpend>,
    #[prost(message, repeated, tag = "4")]
    pub outputs: Vec<CompactSaplingOutput>,
    #[prost(message, repeated, tag = "5")]
    pub actions: Vec<CompactOrchardAction>,
}

impl CompactTx {
    /// A transaction with no shielded elements at all is dropped from a
    /// block's compact `txs` list (spec.md §3: "included only if it has at
    /// least one shielded element").
    pub fn is_shielded(&self) -> bool {
        !self.spends.is_empty() || !self.outputs.is_empty() || !self.actions.is_empty()
    }

    /// Project down to a nullifiers-only view, used by `getBlockRangeNullifiers`.
    pub fn nullifiers_only(&self) -> CompactTx {
        CompactTx {
            index: self.index,
            hash: self.hash.clone(),
            spends: self.spends.clone(),
            outputs: Vec::new(),
            actions: self
                .actions
                .iter()
                .map(|a| CompactOrchardAction {
                    nullifier: a.nullifier.clone(),
                    commitment: Vec::new(),
                    ephemeral_key: Vec::new(),
                    ciphertext_prefix: Vec::new(),
                })
                .collect(),
        }
    }
}

/// Sapling/Orchard commitment tree sizes as of the end of a block.
#[derive(Clone, Copy, Debug, PartialEq, Message)]
pub struct ChainMetadata {
    #[prost(uint32, tag = "1")]
    pub sapling_commitment_tree_size: u32,
    #[prost(uint32, tag = "2")]
    pub orchard_commitment_tree_size: u32,
}

/// The canonical stored-and-served record (spec.md §3 `CompactBlock`).
#[derive(Clone, Debug, PartialEq, Message)]
pub struct CompactBlock {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub prev_hash: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub time: u32,
    #[prost(message, optional, tag = "5")]
    pub chain_metadata: Option<ChainMetadata>,
    #[prost(message, repeated, tag = "6")]
    pub txs: Vec<CompactTx>,
}

/// The all-zero sentinel used when the cache is empty.
pub const ZERO_HASH: [u8; 32] = [0u8; 32];

impl CompactBlock {
    pub fn hash_array(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let n = self.hash.len().min(32);
        out[..n].copy_from_slice(&self.hash[..n]);
        out
    }

    pub fn prev_hash_array(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let n = self.prev_hash.len().min(32);
        out[..n].copy_from_slice(&self.prev_hash[..n]);
        out
    }
}

/// Block identifier by height (hash-based lookup is unsupported, per
/// spec.md §4.5 `block(BlockID)`).
#[derive(Clone, Debug, PartialEq, Message)]
pub struct BlockId {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
}

/// Inclusive block range request.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct BlockRange {
    #[prost(message, optional, tag = "1")]
    pub start: Option<BlockId>,
    #[prost(message, optional, tag = "2")]
    pub end: Option<BlockId>,
}

/// Selector for `getTransaction`.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct TxFilter {
    #[prost(message, optional, tag = "1")]
    pub block: Option<BlockId>,
    #[prost(uint64, tag = "2")]
    pub index: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub hash: Vec<u8>,
}

/// Empty request/response message.
#[derive(Clone, Copy, Debug, PartialEq, Message)]
pub struct Empty {}

/// Full transaction bytes plus the height it was mined at (0 = mempool,
/// `u64::MAX` = mined on a side chain that is no longer the best chain).
#[derive(Clone, Debug, PartialEq, Message)]
pub struct RawTransaction {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub height: u64,
}

/// Height sentinel meaning "mined on a side chain" (spec.md §4.5).
pub const HEIGHT_MINED_ON_SIDE_CHAIN: u64 = u64::MAX;
/// Height sentinel meaning "currently in the mempool".
pub const HEIGHT_MEMPOOL: u64 = 0;

/// Result of `sendTransaction`.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct SendResponse {
    #[prost(int32, tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

/// Server metadata surfaced by `getLightdInfo`.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct LightdInfo {
    #[prost(string, tag = "1")]
    pub version: String,
    #[prost(string, tag = "2")]
    pub vendor: String,
    #[prost(bool, tag = "3")]
    pub taddr_support: bool,
    #[prost(string, tag = "4")]
    pub chain_name: String,
    #[prost(uint64, tag = "5")]
    pub sapling_activation_height: u64,
    #[prost(string, tag = "6")]
    pub consensus_branch_id: String,
    #[prost(uint64, tag = "7")]
    pub block_height: u64,
    #[prost(string, tag = "8")]
    pub git_commit: String,
    #[prost(string, tag = "9")]
    pub branch: String,
    #[prost(string, tag = "10")]
    pub build_date: String,
    #[prost(string, tag = "11")]
    pub build_user: String,
    #[prost(uint64, tag = "12")]
    pub estimated_height: u64,
    #[prost(string, tag = "13")]
    pub zcashd_build: String,
    #[prost(string, tag = "14")]
    pub zcashd_subversion: String,
}

/// Sapling/Orchard commitment tree state at a given block.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct TreeState {
    #[prost(string, tag = "1")]
    pub network: String,
    #[prost(uint64, tag = "2")]
    pub height: u64,
    #[prost(string, tag = "3")]
    pub hash: String,
    #[prost(uint32, tag = "4")]
    pub time: u32,
    #[prost(string, tag = "5")]
    pub sapling_tree: String,
    #[prost(string, tag = "6")]
    pub orchard_tree: String,
}

/// One commitment-subtree root, as returned by `getSubtreeRoots`.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct SubtreeRoot {
    #[prost(bytes = "vec", tag = "1")]
    pub root_hash: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub completing_height: u64,
}

/// Request for `getSubtreeRoots`.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct GetSubtreeRootsArg {
    #[prost(uint64, tag = "1")]
    pub start_index: u64,
    #[prost(enumeration = "ShieldedProtocol", tag = "2")]
    pub shielded_protocol: i32,
    #[prost(uint32, tag = "3")]
    pub max_entries: u32,
}

/// Which shielded pool a subtree-roots request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ShieldedProtocol {
    Sapling = 0,
    Orchard = 1,
}

/// Set of txid prefixes a client already knows about, used to filter
/// `getMempoolTx` (spec.md §4.6).
#[derive(Clone, Debug, PartialEq, Message)]
pub struct Exclude {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub txid: Vec<Vec<u8>>,
}

/// Chain selector (network name), sent on connection-opening RPCs.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct ChainSpec {
    #[prost(string, tag = "1")]
    pub network: String,
}

/// Transparent-address transaction filter.
#[derive(Clone, Debug, PartialEq, Message)]
pub struct TransparentAddressBlockFilter {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(message, optional, tag = "2")]
    pub range: Option<BlockRange>,
}

/// Test-only `ping` request/response (spec.md §6; off by default).
#[derive(Clone, Debug, PartialEq, Message)]
pub struct Duration {
    #[prost(int64, tag = "1")]
    pub interval_us: i64,
}

#[derive(Clone, Debug, PartialEq, Message)]
pub struct PingResponse {
    #[prost(int64, tag = "1")]
    pub entry: i64,
    #[prost(int64, tag = "2")]
    pub exit: i64,
}
