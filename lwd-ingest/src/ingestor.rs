//! The Block Ingestor (spec.md §4.3): the cache's single writer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lwd_cache::BlockCache;
use lwd_proto::types::ChainMetadata;
use lwd_rpc::retry::ConsecutiveFailures;
use lwd_rpc::Chain;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::Result;

const IDLE_POLL: Duration = Duration::from_secs(2);
const FETCH_FAILURE_BACKOFF: Duration = Duration::from_secs(8);
const AWAITING_ACTIVATION_BACKOFF: Duration = Duration::from_secs(120);
const IDLE_LOG_INTERVAL: Duration = Duration::from_secs(4);

/// Drives a [`BlockCache`] from the upstream node: polls the tip, detects
/// reorgs, and is the cache's only writer.
pub struct Ingestor {
    chain: Arc<dyn Chain>,
    cache: BlockCache,
    stop: CancelToken,
    consecutive_failures: ConsecutiveFailures,
    last_idle_log: Option<Instant>,
}

impl Ingestor {
    pub fn new(chain: Arc<dyn Chain>, cache: BlockCache, stop: CancelToken) -> Self {
        Self {
            chain,
            cache,
            stop,
            consecutive_failures: ConsecutiveFailures::new(
                lwd_rpc::retry::STEADY_STATE_MAX_CONSECUTIVE_FAILURES,
            ),
            last_idle_log: None,
        }
    }

    /// Runs the ingestion loop. `iterations`, if given, bounds the number of
    /// loop passes — used by tests to drive the state machine deterministically.
    /// Returns `Ok(())` on a clean stop, `Err` if a cache I/O error proved the
    /// on-disk invariant was broken (always fatal, never retried).
    pub async fn run(&mut self, iterations: Option<u64>) -> Result<()> {
        let mut done = 0u64;
        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }
            if let Some(max) = iterations {
                if done >= max {
                    return Ok(());
                }
            }
            self.step().await?;
            done += 1;
        }
    }

    async fn step(&mut self) -> Result<()> {
        let best_hash_display = match self.chain.get_best_block_hash().await {
            Ok(s) => s,
            Err(e) => {
                self.on_fetch_failure(&e)?;
                tokio::time::sleep(FETCH_FAILURE_BACKOFF).await;
                return Ok(());
            }
        };
        let best_hash_wire = match reverse_hex(&best_hash_display) {
            Ok(h) => h,
            Err(_) => {
                warn!(event = "ingest_bad_hash", hash = %best_hash_display, "upstream returned a malformed best-block hash");
                tokio::time::sleep(FETCH_FAILURE_BACKOFF).await;
                return Ok(());
            }
        };
        self.consecutive_failures.record_success();

        let h = self.cache.next_block();
        if best_hash_wire == self.cache.latest_hash() {
            self.cache.flush()?;
            let now = Instant::now();
            if self.last_idle_log.map(|t| now.duration_since(t) >= IDLE_LOG_INTERVAL).unwrap_or(true) {
                info!(event = "ingest_idle", height = self.cache.latest_height(), "cache at tip");
                self.last_idle_log = Some(now);
            }
            tokio::time::sleep(IDLE_POLL).await;
            return Ok(());
        }

        match self.fetch_block(h).await {
            Ok(cb) => {
                self.consecutive_failures.record_success();
                let links = cb.prev_hash_array() == self.cache.latest_hash()
                    || (self.cache.latest_height() < 0 && h == self.cache.first_block());
                if links {
                    self.cache.append(h, &cb)?;
                } else {
                    warn!(event = "ingest_reorg", at_height = h, "prev_hash mismatch, rewinding one block");
                    self.cache.reorg(h - 1)?;
                }
            }
            Err(e) if h == self.cache.first_block() && e.is_out_of_range() => {
                info!(event = "ingest_awaiting_activation", height = h, "upstream has not reached activation height yet");
                tokio::time::sleep(AWAITING_ACTIVATION_BACKOFF).await;
            }
            Err(e) if e.is_out_of_range() => {
                // bestHash already didn't match our tip (we're past the idle
                // check above) and upstream has no block at `h` either: our
                // cached tip itself was orphaned. Rewind and re-probe.
                warn!(event = "ingest_reorg", at_height = h, "next height not found upstream, rewinding one block");
                self.cache.reorg(h - 1)?;
            }
            Err(e) => {
                self.on_fetch_failure(&e)?;
                tokio::time::sleep(FETCH_FAILURE_BACKOFF).await;
            }
        }
        Ok(())
    }

    fn on_fetch_failure(&mut self, e: &lwd_rpc::Error) -> Result<()> {
        let should_terminate = self.consecutive_failures.record_failure();
        warn!(event = "ingest_fetch_failed", error = %e, consecutive = self.consecutive_failures.count(), "upstream fetch failed");
        if should_terminate {
            return Err(crate::error::Error::FatalUpstream(self.consecutive_failures.count()));
        }
        Ok(())
    }

    async fn fetch_block(
        &self,
        h: u64,
    ) -> std::result::Result<lwd_proto::types::CompactBlock, lwd_rpc::Error> {
        let verbose = self.chain.get_block_verbose(h).await?;
        let raw = self.chain.get_block_raw(&verbose.hash).await?;
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
        let (cb, _rest) = lwd_proto::codec::parse(&raw, h, metadata).map_err(|e| {
            lwd_rpc::Error::Protocol(format!("codec error parsing block {h}: {e}"))
        })?;
        Ok(cb)
    }
}

fn reverse_hex(s: &str) -> std::result::Result<[u8; 32], hex::FromHexError> {
    let mut bytes = hex::decode(s)?;
    bytes.reverse();
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    Ok(out)
}
