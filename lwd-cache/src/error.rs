//! Error types for the block cache.

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by [`crate::BlockCache`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The data directory could not be created or opened for writing.
    #[error("cache directory unusable: {0}")]
    Unwritable(#[source] std::io::Error),

    /// An I/O error on the `lengths` or `blocks` file.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `append` was called with a height other than the current `nextBlock`.
    ///
    /// This is always a caller bug (the Ingestor is the only writer and must
    /// serialize its own appends), not a recoverable condition.
    #[error("append at height {got} but cache expected {expected}")]
    OutOfSequence { expected: u64, got: u64 },

    /// A serialized compact block failed to encode or decode.
    #[error("compact block codec error: {0}")]
    Codec(#[from] prost::DecodeError),
}
