//! An in-memory [`Chain`] fake, for `lwd-ingest` and `lwd-service` tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chain::{Chain, Pool};
use crate::error::{Error, Result};
use crate::types::{
    BlockchainInfo, GetInfo, UpstreamSubtreeRoot, UpstreamTreeState, VerboseBlock,
    VerboseTransaction,
};

/// A block the fake chain can serve, keyed by height.
#[derive(Debug, Clone)]
pub struct FakeBlock {
    pub hash: String,
    pub raw: Vec<u8>,
    pub tx: Vec<String>,
    pub sapling_size: u32,
    pub orchard_size: u32,
}

/// A scripted upstream full node. Tests push state in directly rather than
/// going over the wire.
#[derive(Default)]
pub struct FakeChain {
    inner: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    blocks: HashMap<u64, FakeBlock>,
    best_height: u64,
    mempool: Vec<String>,
    transactions: HashMap<String, VerboseTransaction>,
    /// Set to force the next N calls (by method name) to fail.
    fail_next: HashMap<&'static str, u32>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_block(&self, height: u64, block: FakeBlock) {
        let mut inner = self.inner.lock().unwrap();
        inner.blocks.insert(height, block);
        if height > inner.best_height || inner.best_height == 0 {
            inner.best_height = height;
        }
    }

    pub fn set_best_height(&self, height: u64) {
        self.inner.lock().unwrap().best_height = height;
    }

    pub fn remove_block(&self, height: u64) {
        self.inner.lock().unwrap().blocks.remove(&height);
    }

    pub fn push_mempool_tx(&self, txid: String, tx: VerboseTransaction) {
        let mut inner = self.inner.lock().unwrap();
        inner.mempool.push(txid.clone());
        inner.transactions.insert(txid, tx);
    }

    pub fn clear_mempool(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.mempool.clear();
    }

    /// Makes the next `n` calls to `method` fail with a transport error.
    pub fn fail_next(&self, method: &'static str, n: u32) {
        self.inner.lock().unwrap().fail_next.insert(method, n);
    }

    fn maybe_fail(&self, method: &'static str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(remaining) = inner.fail_next.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Protocol(format!("scripted failure for {method}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Chain for FakeChain {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo> {
        self.maybe_fail("getblockchaininfo")?;
        let inner = self.inner.lock().unwrap();
        let hash = inner
            .blocks
            .get(&inner.best_height)
            .map(|b| b.hash.clone())
            .unwrap_or_default();
        Ok(BlockchainInfo {
            chain: "test".into(),
            blocks: inner.best_height,
            bestblockhash: hash,
            upgrades: Default::default(),
            consensus: None,
        })
    }

    async fn get_info(&self) -> Result<GetInfo> {
        self.maybe_fail("getinfo")?;
        Ok(GetInfo {
            build: "fake".into(),
            subversion: "/fake:0.0/".into(),
        })
    }

    async fn get_best_block_hash(&self) -> Result<String> {
        self.maybe_fail("getbestblockhash")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .blocks
            .get(&inner.best_height)
            .map(|b| b.hash.clone())
            .unwrap_or_default())
    }

    async fn get_block_verbose(&self, height: u64) -> Result<VerboseBlock> {
        self.maybe_fail("getblock")?;
        let inner = self.inner.lock().unwrap();
        let block = inner.blocks.get(&height).ok_or(Error::OutOfRange)?;
        Ok(VerboseBlock {
            hash: block.hash.clone(),
            height: Some(height as i64),
            tx: block.tx.clone(),
            trees: Some(crate::types::Trees {
                sapling: Some(crate::types::TreeSize {
                    size: block.sapling_size,
                }),
                orchard: Some(crate::types::TreeSize {
                    size: block.orchard_size,
                }),
            }),
        })
    }

    async fn get_block_raw(&self, hash: &str) -> Result<Vec<u8>> {
        self.maybe_fail("getblock")?;
        let inner = self.inner.lock().unwrap();
        inner
            .blocks
            .values()
            .find(|b| b.hash == hash)
            .map(|b| b.raw.clone())
            .ok_or(Error::OutOfRange)
    }

    async fn get_raw_transaction(&self, txid_hex: &str) -> Result<VerboseTransaction> {
        self.maybe_fail("getrawtransaction")?;
        let inner = self.inner.lock().unwrap();
        inner
            .transactions
            .get(txid_hex)
            .cloned()
            .ok_or_else(|| Error::Rpc {
                code: -5,
                message: "No information available about transaction".into(),
            })
    }

    async fn get_raw_mempool(&self) -> Result<Vec<String>> {
        self.maybe_fail("getrawmempool")?;
        Ok(self.inner.lock().unwrap().mempool.clone())
    }

    async fn get_address_txids(&self, _address: &str, _start: u64, _end: u64) -> Result<Vec<String>> {
        self.maybe_fail("getaddresstxids")?;
        Ok(Vec::new())
    }

    async fn z_gettreestate(&self, height: u64) -> Result<UpstreamTreeState> {
        self.maybe_fail("z_gettreestate")?;
        let inner = self.inner.lock().unwrap();
        let block = inner.blocks.get(&height).ok_or(Error::OutOfRange)?;
        Ok(UpstreamTreeState {
            network: "test".into(),
            height,
            hash: block.hash.clone(),
            time: 0,
            sapling: None,
            orchard: None,
        })
    }

    async fn z_getsubtreesbyindex(
        &self,
        _pool: Pool,
        _start_index: u64,
        _max_entries: u32,
    ) -> Result<Vec<UpstreamSubtreeRoot>> {
        self.maybe_fail("z_getsubtreesbyindex")?;
        Ok(Vec::new())
    }

    async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String> {
        self.maybe_fail("sendrawtransaction")?;
        Ok(format!("{:016x}", fake_txid(raw_hex)))
    }
}

/// A cheap stand-in txid derivation for the fake; real upstream txid
/// semantics are exercised against `lwd-proto`'s txid module, not here.
fn fake_txid(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut h);
    h.finish()
}
