//! Error types for the Ingestor and Mempool Tracker.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O failure from the cache indicates a broken invariant; per
    /// spec.md §4.3 these are always fatal, never retried.
    #[error("fatal cache error: {0}")]
    FatalCache(#[from] lwd_cache::Error),

    /// The `send` callback passed to `stream_mempool` returned an error
    /// (e.g. the client disconnected); propagated to end the stream.
    #[error("mempool stream send failed: {0}")]
    Send(String),

    /// Spec.md §4.7: after this many consecutive upstream failures during
    /// steady-state ingestion, the process terminates rather than retrying
    /// forever.
    #[error("terminating after {0} consecutive upstream failures")]
    FatalUpstream(u32),
}
