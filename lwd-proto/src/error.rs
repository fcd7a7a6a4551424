//! Error types for block/transaction parsing.

/// Result type for the codec module.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors raised while parsing a raw block or transaction into compact form.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    /// Ran out of bytes before a field could be read.
    #[error("truncated input: wanted {wanted} bytes, had {had}")]
    Truncated { wanted: usize, had: usize },

    /// A length-prefixed field declared an impossible size.
    #[error("impossible length field: {0}")]
    ImpossibleLength(String),

    /// The transaction's version-group identifier is not one we understand.
    #[error("unknown version group id: {0:#010x}")]
    UnknownVersionGroup(u32),

    /// Transaction version below 4 without the overwinter flag set.
    #[error("transaction version {0} is pre-overwinter but missing the overwinter flag")]
    MissingOverwinterFlag(i32),

    /// A shielded-pool list exceeded the 2^16 element cap.
    #[error("shielded list exceeds maximum length: {0} elements")]
    ListTooLong(usize),

    /// Catch-all for structurally invalid input.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
