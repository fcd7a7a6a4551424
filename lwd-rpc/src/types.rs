//! Typed shapes for the subset of upstream JSON-RPC responses this service
//! consumes (spec.md §6). Fields the server never reads are omitted rather
//! than modeled; unknown fields are ignored by serde by default.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    pub blocks: u64,
    pub bestblockhash: String,
    #[serde(default)]
    pub upgrades: std::collections::HashMap<String, UpgradeInfo>,
    #[serde(default)]
    pub consensus: Option<ConsensusInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusInfo {
    pub chaintip: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeInfo {
    #[serde(default)]
    pub activationheight: i64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetInfo {
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub subversion: String,
}

/// `getblock <height> 1` — verbose, transaction ids only (not full bodies).
#[derive(Debug, Clone, Deserialize)]
pub struct VerboseBlock {
    pub hash: String,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub tx: Vec<String>,
    #[serde(default)]
    pub trees: Option<Trees>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Trees {
    #[serde(default)]
    pub sapling: Option<TreeSize>,
    #[serde(default)]
    pub orchard: Option<TreeSize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeSize {
    #[serde(default)]
    pub size: u32,
}

/// `getrawtransaction <txid> 1` — fields this server reads.
#[derive(Debug, Clone, Deserialize)]
pub struct VerboseTransaction {
    pub hex: String,
    /// Absent while in the mempool; `-1` when the containing block is no
    /// longer on the best chain.
    #[serde(default)]
    pub height: Option<i64>,
}

/// `z_gettreestate <height>` upstream response.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTreeState {
    pub network: String,
    pub height: u64,
    pub hash: String,
    pub time: u32,
    #[serde(default)]
    pub sapling: Option<UpstreamTreeCommitment>,
    #[serde(default)]
    pub orchard: Option<UpstreamTreeCommitment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTreeCommitment {
    #[serde(default)]
    pub commitments: Option<UpstreamTreeCommitments>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTreeCommitments {
    #[serde(default, rename = "finalState")]
    pub final_state: String,
}

/// One entry from `z_getsubtreesbyindex`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSubtreeRoot {
    pub root: String,
    pub end_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSubtreeRoots {
    #[serde(default)]
    pub subtree_roots: Vec<UpstreamSubtreeRoot>,
}
