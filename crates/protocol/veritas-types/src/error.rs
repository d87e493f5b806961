//! Error type for malformed values.

use thiserror::Error;

/// Result type alias for type-level validation.
pub type TypesResult<T> = Result<T, TypesError>;

/// Errors raised while parsing or converting Veritas values.
///
/// All variants describe caller input that can never become valid by
/// retrying, so they map to `InvalidInput` at the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TypesError {
    /// Text was not valid base58.
    #[error("invalid base58 in {kind}: {reason}")]
    InvalidBase58 {
        /// What was being parsed ("address", "blockhash", ...)
        kind: &'static str,
        /// Decoder message
        reason: String,
    },

    /// Decoded bytes had the wrong length.
    #[error("invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// What was being parsed
        kind: &'static str,
        /// Required length
        expected: usize,
        /// Decoded length
        actual: usize,
    },

    /// A token amount could not be represented.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Mint decimals exceed what a u64 raw amount can hold.
    #[error("unsupported mint decimals: {0} (max {max})", max = crate::constants::MAX_DECIMALS)]
    UnsupportedDecimals(u8),

    /// A charge identifier was malformed.
    #[error("invalid charge id: {0}")]
    InvalidChargeId(String),
}

impl TypesError {
    /// Create an InvalidAmount error.
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }
}
