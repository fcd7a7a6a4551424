//! The Mempool Tracker (spec.md §4.4): mirrors the upstream mempool and
//! streams newly-seen transactions to concurrent callers.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lwd_proto::types::{RawTransaction, HEIGHT_MEMPOOL};
use lwd_rpc::Chain;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const IDLE_SLEEP: Duration = Duration::from_millis(200);

struct State {
    best_block_hash: String,
    seen_txids: HashSet<String>,
    tx_list: Vec<RawTransaction>,
    last_poll_time: Instant,
}

/// Process-wide mempool mirror, guarded by a single mutex (spec.md §3).
pub struct MempoolTracker {
    chain: Arc<dyn Chain>,
    state: Mutex<State>,
}

impl MempoolTracker {
    pub fn new(chain: Arc<dyn Chain>) -> Self {
        Self {
            chain,
            state: Mutex::new(State {
                best_block_hash: String::new(),
                seen_txids: HashSet::new(),
                tx_list: Vec::new(),
                // Force an immediate refresh on first use.
                last_poll_time: Instant::now() - POLL_INTERVAL,
            }),
        }
    }

    /// A one-shot snapshot of the current mempool, for `getMempoolTx`. Rides
    /// the same 2 s poll cadence and shared state as [`Self::stream_mempool`]
    /// (spec.md §3 makes the mempool state process-wide under one mutex).
    pub async fn snapshot(&self) -> Vec<RawTransaction> {
        self.maybe_refresh().await;
        self.state.lock().await.tx_list.clone()
    }

    /// Delivers successive new transactions to `send` until the chain tip
    /// changes, at which point it returns `Ok(())`. Many callers may run
    /// concurrently; each tracks its own cursor into the shared `tx_list`.
    pub async fn stream_mempool<F, Fut>(&self, mut send: F) -> Result<()>
    where
        F: FnMut(RawTransaction) -> Fut,
        Fut: Future<Output = std::result::Result<(), String>>,
    {
        let stay_hash = self.state.lock().await.best_block_hash.clone();
        let mut cursor = 0usize;

        loop {
            self.maybe_refresh().await;

            let to_send = {
                let mut state = self.state.lock().await;
                if state.best_block_hash != stay_hash {
                    return Ok(());
                }
                let slice = state.tx_list[cursor..].to_vec();
                cursor = state.tx_list.len();
                slice
            };

            for tx in to_send {
                send(tx).await.map_err(Error::Send)?;
            }

            tokio::time::sleep(IDLE_SLEEP).await;

            if self.state.lock().await.best_block_hash != stay_hash {
                return Ok(());
            }
        }
    }

    /// Runs the 2 s-gated refresh if due. Holds the state lock for the
    /// duration of the upstream calls it makes — by design only one caller
    /// actually performs the poll per window (spec.md §5).
    async fn maybe_refresh(&self) {
        let mut state = self.state.lock().await;
        if state.last_poll_time.elapsed() < POLL_INTERVAL {
            return;
        }

        let info = match self.chain.get_blockchain_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(event = "mempool_poll_failed", error = %e, "failed to poll upstream tip during mempool refresh");
                state.last_poll_time = Instant::now();
                return;
            }
        };

        if info.bestblockhash != state.best_block_hash {
            state.best_block_hash = info.bestblockhash;
            state.seen_txids.clear();
            state.tx_list.clear();
            state.last_poll_time = Instant::now();
            return;
        }

        let txids = match self.chain.get_raw_mempool().await {
            Ok(txids) => txids,
            Err(e) => {
                warn!(event = "mempool_poll_failed", error = %e, "failed to list upstream mempool");
                state.last_poll_time = Instant::now();
                return;
            }
        };

        for txid in txids {
            if state.seen_txids.contains(&txid) {
                continue;
            }
            state.seen_txids.insert(txid.clone());
            match self.chain.get_raw_transaction(&txid).await {
                Ok(tx) => match hex::decode(&tx.hex) {
                    Ok(data) => state.tx_list.push(RawTransaction {
                        data,
                        height: HEIGHT_MEMPOOL,
                    }),
                    Err(e) => warn!(event = "mempool_tx_bad_hex", txid, error = %e, "skipping malformed mempool tx"),
                },
                Err(e) => {
                    // Non-fatal: the tx may have just been mined or dropped.
                    warn!(event = "mempool_tx_fetch_failed", txid, error = %e, "skipping mempool tx");
                }
            }
        }
        state.last_poll_time = Instant::now();
    }
}
