//! Bounded retry helpers (spec.md §4.7).
//!
//! Two distinct policies, not one generic backoff curve: a handful of
//! "must succeed before the server can start" RPCs get a short, widening
//! fixed schedule; everything in the steady-state ingestion loop instead
//! uses a flat delay with its own consecutive-failure counter (owned by the
//! caller, since the counter spans loop iterations rather than a single
//! call — see [`ConsecutiveFailures`]).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// Attempts after which a startup RPC gives up and the process should exit.
pub const STARTUP_MAX_ATTEMPTS: u32 = 10;

/// Consecutive per-block ingestion failures after which the process should exit.
pub const STEADY_STATE_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Retries `op` up to [`STARTUP_MAX_ATTEMPTS`] times, sleeping
/// `10 + 5 * attempt` seconds between tries, for RPCs the server cannot
/// start without (e.g. the first `getblockchaininfo` call).
pub async fn retry_startup<T, E, F, Fut>(label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= STARTUP_MAX_ATTEMPTS {
                    error!(event = "startup_retry_exhausted", label, attempt, error = %e, "giving up on startup RPC");
                    return Err(e);
                }
                let delay = Duration::from_secs(10 + 5 * attempt as u64);
                warn!(event = "startup_retry", label, attempt, delay_secs = delay.as_secs(), error = %e, "retrying startup RPC");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Tracks consecutive failures across independent calls (e.g. one Ingestor
/// loop iteration per call), separate from any single call's own retries.
#[derive(Debug, Default)]
pub struct ConsecutiveFailures {
    count: u32,
    max: u32,
}

impl ConsecutiveFailures {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    pub fn record_success(&mut self) {
        self.count = 0;
    }

    /// Returns `true` once the caller should terminate the process.
    #[must_use]
    pub fn record_failure(&mut self) -> bool {
        self.count += 1;
        self.count >= self.max
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
