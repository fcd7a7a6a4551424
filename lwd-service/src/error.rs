//! Error taxonomy for the Range/Query Service, and its mapping onto
//! `tonic::Status` codes (spec.md §7).

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An upstream RPC call failed or timed out. Surfaced directly to the
    /// caller rather than retried — retry-until-fatal is the Ingestor's
    /// policy (§4.7), not a per-request one.
    #[error("upstream request failed: {0}")]
    UpstreamTransient(#[source] lwd_rpc::Error),

    /// The requested height is past the upstream tip.
    #[error("requested height is past the chain tip")]
    OutOfRange,

    /// A transaction or block hash the upstream doesn't know about.
    #[error("not found")]
    NotFound,

    /// A block or transaction failed to parse.
    #[error("malformed chain data: {0}")]
    Parse(String),

    /// A bad argument from the client: hash-based block lookup, a malformed
    /// transparent address, `start > end` is fine (reversed, not invalid) but
    /// a negative/overflowing range is not.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The cache is still empty at startup.
    #[error("server not ready: cache is empty")]
    NotReady,
}

impl From<lwd_rpc::Error> for Error {
    fn from(e: lwd_rpc::Error) -> Self {
        if e.is_out_of_range() {
            Error::OutOfRange
        } else if e.is_not_found() {
            Error::NotFound
        } else {
            Error::UpstreamTransient(e)
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(e: Error) -> Self {
        let message = e.to_string();
        match e {
            Error::UpstreamTransient(_) => tonic::Status::unavailable(message),
            Error::OutOfRange => tonic::Status::out_of_range(message),
            Error::NotFound => tonic::Status::not_found(message),
            Error::Parse(_) => tonic::Status::internal(message),
            Error::InvalidArgument(_) => tonic::Status::invalid_argument(message),
            Error::NotReady => tonic::Status::unavailable(message),
        }
    }
}
