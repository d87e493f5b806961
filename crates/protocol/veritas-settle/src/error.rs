//! Error types for the ledger boundary.

use thiserror::Error;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur talking to the token ledger.
///
/// `Network` and `Timeout` are the only transient variants. They differ in
/// what is known about a write: `Network` means the request never reached
/// the ledger, `Timeout` means the outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Source token account holds less than the transfer or burn amount.
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientFunds {
        /// Available raw balance
        have: u64,
        /// Required raw amount
        need: u64,
    },

    /// Delegate authority does not cover the transfer.
    #[error("insufficient delegate allowance: need {need}")]
    InsufficientAllowance {
        /// Required raw amount
        need: u64,
    },

    /// An account the operation depends on does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The ledger rejected the transaction.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// The RPC endpoint returned an error that retrying will not fix.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Transaction bytes could not be built or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network error before the request reached the ledger (retryable).
    #[error("network error: {0}")]
    Network(String),

    /// No answer within the deadline (retryable for reads only).
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Internal error (lock poisoning, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Create a new InsufficientFunds error.
    pub fn insufficient_funds(have: u64, need: u64) -> Self {
        Self::InsufficientFunds { have, need }
    }

    /// Create a new AccountNotFound error.
    pub fn account_not_found(account: impl std::fmt::Display) -> Self {
        Self::AccountNotFound(account.to_string())
    }

    /// Create a new TransactionFailed error.
    pub fn transaction_failed(reason: impl Into<String>) -> Self {
        Self::TransactionFailed(reason.into())
    }

    /// Create a new Rpc error.
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    /// Create a new Encoding error.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a new Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new Timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if a read that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Check if a write that failed with this error may be submitted again.
    ///
    /// Only true when the ledger provably never saw the first submission.
    pub fn is_safe_to_resubmit(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// How far a backend-signed submission got before it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    /// The transaction had not been accepted by the RPC node yet.
    Sending,
    /// The node accepted the transaction; waiting for it to confirm.
    Confirming,
}

impl LedgerError {
    /// Restate an error for the submit phase it happened in.
    ///
    /// Once the node has accepted a transaction it may land at any time, so
    /// a lost connection while confirming is an unknown outcome, never a
    /// `Network` error. Failures the ledger reported about the transaction
    /// itself are kept.
    pub fn in_phase(self, phase: SubmitPhase) -> Self {
        match (phase, self) {
            (SubmitPhase::Sending, err) => err,
            (
                SubmitPhase::Confirming,
                Self::Network(msg) | Self::Rpc(msg) | Self::Encoding(msg) | Self::Internal(msg),
            ) => Self::Timeout(format!("outcome unknown after send: {}", msg)),
            (SubmitPhase::Confirming, err) => err,
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}
