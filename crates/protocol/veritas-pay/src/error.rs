//! Error types for the payment layer.

use thiserror::Error;
use veritas_settle::LedgerError;
use veritas_types::{ChargeId, RawAmount, TxSignature, TypesError};

use crate::book::ChargeStatus;

/// Result type for payment operations.
pub type PayResult<T> = Result<T, PayError>;

/// Errors that can occur requesting, executing or verifying a payment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayError {
    /// Caller input can never succeed as given.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Payer's token balance is below the required amount.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Raw amount required
        required: RawAmount,
        /// Raw amount held
        available: RawAmount,
    },

    /// The backend delegate is not approved for the required amount.
    #[error("insufficient allowance: required {required}")]
    InsufficientAllowance {
        /// Raw amount required
        required: RawAmount,
        /// Remaining delegated amount, when known
        remaining: Option<RawAmount>,
    },

    /// The transfer confirmed but the burn did not.
    #[error("charge {charge_id} transferred in {transfer_signature} but burn of {burn_amount} failed: {reason}")]
    PartialChargeFailure {
        /// Charge that was transferred
        charge_id: ChargeId,
        /// Signature of the confirmed transfer
        transfer_signature: TxSignature,
        /// Raw amount still to burn
        burn_amount: RawAmount,
        /// Why the burn failed
        reason: String,
    },

    /// The ledger was unreachable or did not answer in time.
    #[error("ledger temporarily unavailable: {0}")]
    NetworkTransient(String),

    /// The charge id has already been used.
    #[error("charge {0} already exists")]
    DuplicateCharge(ChargeId),

    /// No record of the charge id.
    #[error("charge {0} not found")]
    ChargeNotFound(ChargeId),

    /// The charge is not in a state that allows the requested step.
    #[error("charge {charge_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Charge concerned
        charge_id: ChargeId,
        /// State the record is in
        from: ChargeStatus,
        /// State that was requested
        to: ChargeStatus,
    },

    /// Any other ledger failure.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl PayError {
    /// Create an InvalidInput error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Returns a user-friendly suggestion for recovering from this error.
    pub fn suggestion(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "Check the request fields and try again",
            Self::InsufficientFunds { .. } => "Top up your token balance",
            Self::InsufficientAllowance { .. } => {
                "Approve a larger allowance via /api/allowance-request"
            }
            Self::PartialChargeFailure { .. } => {
                "The charge went through; the burn will be retried by an operator"
            }
            Self::NetworkTransient(_) => "Retry in a few seconds",
            Self::DuplicateCharge(_) => "Use a fresh charge id for each query",
            Self::ChargeNotFound(_) => "Check the charge id",
            Self::InvalidTransition { .. } => {
                "Fetch the charge record; another request may already be handling it"
            }
            Self::Ledger(_) => "This is a ledger error; please report it",
        }
    }

    /// Returns true if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkTransient(_))
    }

    /// Returns the HTTP status code appropriate for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::InsufficientFunds { .. } | Self::InsufficientAllowance { .. } => 402,
            Self::ChargeNotFound(_) => 404,
            Self::DuplicateCharge(_) | Self::InvalidTransition { .. } => 409,
            Self::PartialChargeFailure { .. } => 502,
            Self::NetworkTransient(_) => 503,
            Self::Ledger(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InsufficientAllowance { .. } => "insufficient_allowance",
            Self::PartialChargeFailure { .. } => "partial_charge_failure",
            Self::NetworkTransient(_) => "network_transient",
            Self::DuplicateCharge(_) => "duplicate_charge",
            Self::ChargeNotFound(_) => "charge_not_found",
            Self::InvalidTransition { .. } => "invalid_charge_state",
            Self::Ledger(_) => "ledger_error",
        }
    }
}

impl From<LedgerError> for PayError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { have, need } => Self::InsufficientFunds {
                required: need,
                available: have,
            },
            LedgerError::InsufficientAllowance { need } => Self::InsufficientAllowance {
                required: need,
                remaining: None,
            },
            LedgerError::Network(msg) | LedgerError::Timeout(msg) => Self::NetworkTransient(msg),
            other => Self::Ledger(other),
        }
    }
}

impl From<TypesError> for PayError {
    fn from(e: TypesError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}
