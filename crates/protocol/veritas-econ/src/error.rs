//! Pricing error types.

use thiserror::Error;

/// Result type alias for pricing operations.
pub type EconResult<T> = Result<T, EconError>;

/// Errors that can occur while configuring or evaluating prices.
///
/// Estimation itself never fails for well-formed configuration; these
/// variants guard configuration loading and overflow on absurd inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EconError {
    /// Token unit price is zero, so no amount of tokens covers any cost.
    #[error("token price must be greater than zero")]
    ZeroTokenPrice,

    /// Markup below 1x would charge less than the model costs.
    #[error("markup {percent}% is below the 100% minimum")]
    MarkupTooLow {
        /// Configured markup in percent
        percent: u64,
    },

    /// A USD amount could not be converted to nano-USD.
    #[error("invalid USD amount: {0}")]
    InvalidUsd(String),

    /// The configured fallback tier is not in the price table.
    #[error("default model '{0}' has no price entry")]
    UnknownDefaultModel(String),

    /// Intermediate arithmetic exceeded its integer range.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    /// Converting whole tokens to raw units failed.
    #[error(transparent)]
    Amount(#[from] veritas_types::TypesError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            EconError::MarkupTooLow { percent: 50 }.to_string(),
            "markup 50% is below the 100% minimum"
        );
        assert_eq!(
            EconError::Overflow("token count").to_string(),
            "arithmetic overflow computing token count"
        );
    }
}
