//! Error types for the upstream JSON-RPC client.

/// Result type for upstream calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised talking to the upstream full node.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure (connection refused, timeout, TLS, ...).
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream returned a well-formed JSON-RPC error envelope.
    #[error("upstream rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response body was not valid JSON, or not shaped as expected.
    #[error("malformed upstream response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A hex field in a response failed to decode.
    #[error("malformed hex in upstream response: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The upstream reported a block height outside the chain's current range.
    #[error("requested block is above the current tip")]
    OutOfRange,

    /// The response was valid JSON but didn't match the JSON-RPC envelope
    /// shape (neither a `result` nor an `error` field present).
    #[error("upstream protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    /// True for the specific "block height above tip" condition the Range
    /// Streamer needs to distinguish from a generic invalid argument.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Error::OutOfRange)
            || matches!(self, Error::Rpc { message, .. } if message.contains("height out of range") || message.contains("Block height out of range"))
    }

    /// True for the standard zcashd/bitcoind "unknown transaction or block"
    /// condition: `RPC_INVALID_ADDRESS_OR_KEY` (code -5), the code
    /// `getrawtransaction`/`getblock` report for a hash they don't
    /// recognize, as opposed to any other request failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Rpc { code: -5, .. })
    }

    /// Extracts the leading `-NN:` upstream error code from a `sendrawtransaction`
    /// style rejection message, per spec.md's `sendTransaction` contract.
    pub fn leading_code(&self) -> Option<i32> {
        match self {
            Error::Rpc { code, .. } => i32::try_from(*code).ok(),
            _ => None,
        }
    }
}
