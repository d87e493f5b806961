//! Error types for the query layer.
//!
//! `OpsError` is what a failed query reports to its caller. `UpstreamError`
//! describes failures of the language model and search backends, which the
//! orchestrator either absorbs (search) or escalates (generation).

use thiserror::Error;
use veritas_econ::EconError;
use veritas_pay::{ChargeReceipt, PayError};

/// Result type for query operations.
pub type OpsResult<T> = std::result::Result<T, OpsError>;

/// Failure of an external model or search backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Connection failure or timeout.
    #[error("upstream unreachable: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The response could not be decoded.
    #[error("malformed upstream response: {0}")]
    Decode(String),

    /// The backend is missing configuration such as an API key.
    #[error("upstream not configured: {0}")]
    NotConfigured(String),
}

impl UpstreamError {
    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Errors that can occur while answering a query.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum OpsError {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Malformed or empty query.
    #[error("invalid query: {0}")]
    InvalidInput(String),

    // =========================================================================
    // Payment Errors
    // =========================================================================
    /// Charging the user failed; no model call was made.
    #[error(transparent)]
    Payment(#[from] PayError),

    /// The user was charged but the model produced no answer.
    #[error("generation failed after charge {}: {reason}", .charge.charge_id)]
    UpstreamGenerationFailure {
        /// Receipt of the charge that went through
        charge: Box<ChargeReceipt>,
        /// Why generation failed
        reason: String,
    },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// Pricing error.
    #[error("pricing error: {0}")]
    Pricing(#[from] EconError),
}

impl OpsError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        OpsError::InvalidInput(msg.into())
    }

    /// Get a user-friendly suggestion for recovering from this error.
    pub fn suggestion(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "Send a non-empty input and a valid wallet address",
            Self::Payment(e) => e.suggestion(),
            Self::UpstreamGenerationFailure { .. } => {
                "You were charged but no answer was produced; quote the charge id to request a refund"
            }
            Self::Pricing(_) => "The pricing configuration is invalid; contact the operator",
        }
    }

    /// Returns the HTTP status code appropriate for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Payment(e) => e.http_status(),
            Self::UpstreamGenerationFailure { .. } => 502,
            Self::Pricing(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Payment(e) => e.reason_code(),
            Self::UpstreamGenerationFailure { .. } => "upstream_generation_failure",
            Self::Pricing(_) => "pricing_error",
        }
    }

    /// The charge that went through, if this failure happened after one.
    pub fn charge(&self) -> Option<&ChargeReceipt> {
        match self {
            Self::UpstreamGenerationFailure { charge, .. } => Some(charge),
            _ => None,
        }
    }
}
