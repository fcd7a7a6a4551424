//! The Range/Query Service (spec.md §4.5): wires the Block Cache, the
//! upstream `Chain`, and the Mempool Tracker into the `CompactTxStreamer`
//! trait.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_stream::try_stream;
use async_trait::async_trait;
use lwd_cache::BlockCache;
use lwd_ingest::MempoolTracker;
use lwd_proto::types::{
    BlockId, BlockRange, ChainMetadata, ChainSpec, CompactBlock, CompactTx, Duration, Empty,
    Exclude, GetSubtreeRootsArg, LightdInfo, PingResponse, RawTransaction, SendResponse,
    ShieldedProtocol, SubtreeRoot, TransparentAddressBlockFilter, TreeState, TxFilter,
    HEIGHT_MEMPOOL, HEIGHT_MINED_ON_SIDE_CHAIN,
};
use lwd_rpc::{Chain, Pool};
use regex::Regex;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::error::{Error, Result};
use crate::filter;
use crate::proto::{BlockStream, CompactTxStream, CompactTxStreamer, RawTxStream, SubtreeRootStream};

const TADDR_TIMEOUT: StdDuration = StdDuration::from_secs(30);

fn taddr_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^t[a-zA-Z0-9]{34}$").expect("static regex is valid"))
}

/// spec.md §4.5 `blockRange` step 2's error mapping for the cache-miss
/// upstream fallback: "block above tip" is `OUT_OF_RANGE`, anything else is
/// `INVALID_ARGUMENT`.
fn fallback_fetch_error(h: u64, e: lwd_rpc::Error) -> Error {
    if e.is_out_of_range() {
        Error::OutOfRange
    } else {
        Error::InvalidArgument(format!("block {h}: {e}"))
    }
}

/// Static process build metadata, composed into `getLightdInfo`.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub chain_name: String,
    pub sapling_activation_height: u64,
    pub git_commit: String,
    pub branch: String,
    pub build_date: String,
    pub build_user: String,
}

/// Implements the served RPC surface over a shared cache, upstream chain
/// client, and mempool tracker. Cloning shares all three.
#[derive(Clone)]
pub struct Service {
    cache: Option<BlockCache>,
    chain: Arc<dyn Chain>,
    mempool: Arc<MempoolTracker>,
    build: BuildInfo,
}

impl Service {
    /// `cache: None` is the `no_cache` configuration (spec.md §6): every
    /// range request falls through to upstream.
    pub fn new(
        cache: Option<BlockCache>,
        chain: Arc<dyn Chain>,
        mempool: Arc<MempoolTracker>,
        build: BuildInfo,
    ) -> Self {
        Self {
            cache,
            chain,
            mempool,
            build,
        }
    }

    fn latest_height(&self) -> Option<u64> {
        match &self.cache {
            Some(c) => {
                let h = c.latest_height();
                if h < 0 {
                    None
                } else {
                    Some(h as u64)
                }
            }
            None => None,
        }
    }

    /// Serves a height from the cache if present, otherwise fetches and
    /// parses it directly from upstream (spec.md §4.5 `blockRange` step 2):
    /// a fetch failure ends the stream with `OUT_OF_RANGE` only when the
    /// failure is "block above tip"; anything else from this fallback path
    /// is `INVALID_ARGUMENT`, not the generic upstream-unavailable mapping
    /// `Error::from(lwd_rpc::Error)` gives every other caller in this file.
    async fn fetch_block(&self, h: u64) -> Result<CompactBlock> {
        if let Some(cache) = &self.cache {
            if let Some(cb) = cache.get(h) {
                return Ok(cb);
            }
        }

        let verbose = self
            .chain
            .get_block_verbose(h)
            .await
            .map_err(|e| fallback_fetch_error(h, e))?;
        let raw = self
            .chain
            .get_block_raw(&verbose.hash)
            .await
            .map_err(|e| fallback_fetch_error(h, e))?;
        let metadata = ChainMetadata {
            sapling_commitment_tree_size: verbose
                .trees
                .as_ref()
                .and_then(|t| t.sapling.as_ref())
                .map(|s| s.size)
                .unwrap_or(0),
            orchard_commitment_tree_size: verbose
                .trees
                .as_ref()
                .and_then(|t| t.orchard.as_ref())
                .map(|s| s.size)
                .unwrap_or(0),
        };
        let (cb, _rest) = lwd_proto::codec::parse(&raw, h, metadata)
            .map_err(|e| Error::Parse(format!("block {h}: {e}")))?;
        Ok(cb)
    }

    async fn block_range_stream(
        &self,
        range: BlockRange,
        nullifiers_only: bool,
    ) -> Result<impl Stream<Item = std::result::Result<CompactBlock, Status>>> {
        let start = range
            .start
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("missing start height".into()))?
            .height;
        let end = range
            .end
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("missing end height".into()))?
            .height;

        let heights: Vec<u64> = if start <= end {
            (start..=end).collect()
        } else {
            (end..=start).rev().collect()
        };

        let this = self.clone();
        Ok(try_stream! {
            for h in heights {
                let cb = this.fetch_block(h).await?;
                if nullifiers_only {
                    let projected = CompactBlock {
                        height: cb.height,
                        hash: cb.hash,
                        prev_hash: cb.prev_hash,
                        time: cb.time,
                        chain_metadata: cb.chain_metadata,
                        txs: cb.txs.iter().map(|t| t.nullifiers_only()).collect(),
                    };
                    yield projected;
                } else {
                    yield cb;
                }
            }
        })
    }
}

#[async_trait]
impl CompactTxStreamer for Service {
    async fn get_latest_block(
        &self,
        _request: Request<ChainSpec>,
    ) -> std::result::Result<Response<BlockId>, Status> {
        match &self.cache {
            Some(cache) => {
                let h = self.latest_height().ok_or(Error::NotReady)?;
                Ok(Response::new(BlockId {
                    height: h,
                    hash: cache.latest_hash().to_vec(),
                }))
            }
            // no_cache mode: there's nothing to be "not ready" about, ask
            // upstream directly.
            None => {
                let info = self
                    .chain
                    .get_blockchain_info()
                    .await
                    .map_err(Error::from)?;
                let mut hash = hex::decode(&info.bestblockhash)
                    .map_err(|e| Error::Parse(format!("best block hash: {e}")))?;
                hash.reverse();
                Ok(Response::new(BlockId {
                    height: info.blocks,
                    hash,
                }))
            }
        }
    }

    async fn get_block(
        &self,
        request: Request<BlockId>,
    ) -> std::result::Result<Response<CompactBlock>, Status> {
        let req = request.into_inner();
        if !req.hash.is_empty() {
            return Err(Error::InvalidArgument("hash-based block lookup is not supported".into()).into());
        }
        let cb = self.fetch_block(req.height).await?;
        Ok(Response::new(cb))
    }

    async fn get_block_nullifiers(
        &self,
        request: Request<BlockId>,
    ) -> std::result::Result<Response<CompactBlock>, Status> {
        let req = request.into_inner();
        if !req.hash.is_empty() {
            return Err(Error::InvalidArgument("hash-based block lookup is not supported".into()).into());
        }
        let cb = self.fetch_block(req.height).await?;
        let projected = CompactBlock {
            height: cb.height,
            hash: cb.hash,
            prev_hash: cb.prev_hash,
            time: cb.time,
            chain_metadata: cb.chain_metadata,
            txs: cb.txs.iter().map(|t| t.nullifiers_only()).collect(),
        };
        Ok(Response::new(projected))
    }

    async fn get_block_range(
        &self,
        request: Request<BlockRange>,
    ) -> std::result::Result<Response<BlockStream>, Status> {
        let stream = self.block_range_stream(request.into_inner(), false).await?;
        let boxed: BlockStream = Box::pin(stream);
        Ok(Response::new(boxed))
    }

    async fn get_block_range_nullifiers(
        &self,
        request: Request<BlockRange>,
    ) -> std::result::Result<Response<BlockStream>, Status> {
        let stream = self.block_range_stream(request.into_inner(), true).await?;
        let boxed: BlockStream = Box::pin(stream);
        Ok(Response::new(boxed))
    }

    async fn get_transaction(
        &self,
        request: Request<TxFilter>,
    ) -> std::result::Result<Response<RawTransaction>, Status> {
        let req = request.into_inner();
        if req.hash.is_empty() {
            return Err(Error::InvalidArgument("transaction lookup requires a txid".into()).into());
        }
        let mut hash = req.hash.clone();
        hash.reverse();
        let txid_hex = hex::encode(&hash);
        let verbose = self
            .chain
            .get_raw_transaction(&txid_hex)
            .await
            .map_err(Error::from)?;
        let data = hex::decode(&verbose.hex)
            .map_err(|e| Error::Parse(format!("transaction hex for {txid_hex}: {e}")))?;
        let height = match verbose.height {
            Some(-1) => HEIGHT_MINED_ON_SIDE_CHAIN,
            Some(h) => h as u64,
            None => HEIGHT_MEMPOOL,
        };
        Ok(Response::new(RawTransaction { data, height }))
    }

    async fn send_transaction(
        &self,
        request: Request<RawTransaction>,
    ) -> std::result::Result<Response<SendResponse>, Status> {
        let raw = request.into_inner();
        let hex_tx = hex::encode(&raw.data);
        match self.chain.send_raw_transaction(&hex_tx).await {
            Ok(txid) => Ok(Response::new(SendResponse {
                error_code: 0,
                error_message: txid,
            })),
            Err(e) => {
                let code = e.leading_code().unwrap_or(-1);
                Ok(Response::new(SendResponse {
                    error_code: code,
                    error_message: e.to_string(),
                }))
            }
        }
    }

    async fn get_taddress_transactions(
        &self,
        request: Request<TransparentAddressBlockFilter>,
    ) -> std::result::Result<Response<RawTxStream>, Status> {
        let req = request.into_inner();
        if !taddr_regex().is_match(&req.address) {
            return Err(Error::InvalidArgument(format!("malformed transparent address: {}", req.address)).into());
        }
        let range = req
            .range
            .ok_or_else(|| Error::InvalidArgument("missing block range".into()))?;
        let start = range.start.map(|b| b.height).unwrap_or(0);
        let end = range.end.map(|b| b.height).unwrap_or(0);

        let this = self.clone();
        let stream = try_stream! {
            let txids = this
                .chain
                .get_address_txids(&req.address, start, end)
                .await
                .map_err(Error::from)?;
            for txid in txids {
                let mut bytes = hex::decode(&txid)
                    .map_err(|e| Error::Parse(format!("address txid hex: {e}")))?;
                bytes.reverse();
                let reversed_hex = hex::encode(&bytes);
                let verbose = this
                    .chain
                    .get_raw_transaction(&reversed_hex)
                    .await
                    .map_err(Error::from)?;
                let data = hex::decode(&verbose.hex)
                    .map_err(|e| Error::Parse(format!("transaction hex for {reversed_hex}: {e}")))?;
                let height = match verbose.height {
                    Some(-1) => HEIGHT_MINED_ON_SIDE_CHAIN,
                    Some(h) => h as u64,
                    None => HEIGHT_MEMPOOL,
                };
                yield RawTransaction { data, height };
            }
        };
        let timed = tokio_stream::StreamExt::timeout(stream, TADDR_TIMEOUT).map(|item| match item {
            Ok(inner) => inner,
            Err(_) => Err(Status::deadline_exceeded("getTaddressTransactions timed out after 30s")),
        });
        let boxed: RawTxStream = Box::pin(timed);
        Ok(Response::new(boxed))
    }

    async fn get_mempool_tx(
        &self,
        request: Request<Exclude>,
    ) -> std::result::Result<Response<CompactTxStream>, Status> {
        let exclude = request.into_inner().txid;
        let snapshot = self.mempool.snapshot().await;

        let mut txids: Vec<Vec<u8>> = snapshot.iter().map(|tx| tx.data.clone()).collect();
        txids.sort();
        let mut exclude = exclude;
        exclude.sort();
        let kept = filter::apply(&txids, &exclude);
        let kept: Vec<Vec<u8>> = kept.into_iter().cloned().collect();

        let stream = try_stream! {
            for txid in kept {
                yield CompactTx {
                    index: 0,
                    hash: txid,
                    spends: Vec::new(),
                    outputs: Vec::new(),
                    actions: Vec::new(),
                };
            }
        };
        let boxed: CompactTxStream = Box::pin(stream);
        Ok(Response::new(boxed))
    }

    async fn get_mempool_stream(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<RawTxStream>, Status> {
        let (tx, rx) = tokio::sync::mpsc::channel::<RawTransaction>(64);
        let mempool = self.mempool.clone();
        tokio::spawn(async move {
            let result = mempool
                .stream_mempool(|raw| {
                    let tx = tx.clone();
                    async move { tx.send(raw).await.map_err(|e| e.to_string()) }
                })
                .await;
            if let Err(e) = result {
                warn!(event = "mempool_stream_failed", error = %e, "mempool stream ended with an error");
            }
        });
        let out = tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok);
        let boxed: RawTxStream = Box::pin(out);
        Ok(Response::new(boxed))
    }

    async fn get_tree_state(
        &self,
        request: Request<BlockId>,
    ) -> std::result::Result<Response<TreeState>, Status> {
        let req = request.into_inner();
        let tree = self
            .chain
            .z_gettreestate(req.height)
            .await
            .map_err(Error::from)?;
        Ok(Response::new(TreeState {
            network: tree.network,
            height: tree.height,
            hash: tree.hash,
            time: tree.time,
            sapling_tree: tree
                .sapling
                .and_then(|s| s.commitments)
                .map(|c| c.final_state)
                .unwrap_or_default(),
            orchard_tree: tree
                .orchard
                .and_then(|s| s.commitments)
                .map(|c| c.final_state)
                .unwrap_or_default(),
        }))
    }

    async fn get_subtree_roots(
        &self,
        request: Request<GetSubtreeRootsArg>,
    ) -> std::result::Result<Response<SubtreeRootStream>, Status> {
        let req = request.into_inner();
        let pool = match ShieldedProtocol::try_from(req.shielded_protocol) {
            Ok(ShieldedProtocol::Sapling) => Pool::Sapling,
            Ok(ShieldedProtocol::Orchard) => Pool::Orchard,
            Err(_) => {
                return Err(Error::InvalidArgument("unknown shielded protocol".into()).into())
            }
        };
        let this = self.clone();
        let stream = try_stream! {
            let roots = this
                .chain
                .z_getsubtreesbyindex(pool, req.start_index, req.max_entries)
                .await
                .map_err(Error::from)?;
            for root in roots {
                let mut root_hash = hex::decode(&root.root)
                    .map_err(|e| Error::Parse(format!("subtree root hex: {e}")))?;
                root_hash.reverse();
                yield SubtreeRoot {
                    root_hash,
                    completing_height: root.end_height,
                };
            }
        };
        let boxed: SubtreeRootStream = Box::pin(stream);
        Ok(Response::new(boxed))
    }

    async fn get_lightd_info(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<LightdInfo>, Status> {
        let info = self
            .chain
            .get_blockchain_info()
            .await
            .map_err(Error::from)?;
        let build = self.chain.get_info().await.map_err(Error::from)?;
        let block_height = self.latest_height().unwrap_or(0);
        Ok(Response::new(LightdInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            vendor: "lwd".to_string(),
            taddr_support: true,
            chain_name: self.build.chain_name.clone(),
            sapling_activation_height: self.build.sapling_activation_height,
            consensus_branch_id: info
                .consensus
                .map(|c| c.chaintip)
                .unwrap_or_default(),
            block_height,
            git_commit: self.build.git_commit.clone(),
            branch: self.build.branch.clone(),
            build_date: self.build.build_date.clone(),
            build_user: self.build.build_user.clone(),
            estimated_height: info.blocks,
            zcashd_build: build.build,
            zcashd_subversion: build.subversion,
        }))
    }

    async fn ping(
        &self,
        request: Request<Duration>,
    ) -> std::result::Result<Response<PingResponse>, Status> {
        let interval_us = request.into_inner().interval_us;
        Ok(Response::new(PingResponse {
            entry: interval_us,
            exit: interval_us,
        }))
    }
}
