//! Payment-layer message types and configuration.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use veritas_types::constants::{
    DEFAULT_ALLOWANCE_TOKENS, DEFAULT_REQUEST_TOKENS, DEFAULT_VERIFY_WINDOW,
};
use veritas_types::{Address, BurnSplit, ChargeId, RawAmount, TxSignature};

use crate::error::{PayError, PayResult};

// =============================================================================
// Unsigned payloads
// =============================================================================

/// A base64-encoded unsigned transaction, ready for a wallet to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnsignedPayload(String);

impl UnsignedPayload {
    /// Encode wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BASE64.encode(bytes))
    }

    /// The base64 text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to wire bytes.
    pub fn decode(&self) -> PayResult<Vec<u8>> {
        BASE64
            .decode(&self.0)
            .map_err(|e| PayError::invalid_input(format!("invalid payload: {}", e)))
    }
}

/// Result of an allowance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceOutcome {
    /// The delegate already holds at least the requested allowance.
    AlreadyApproved {
        /// Remaining delegated raw amount
        remaining: RawAmount,
    },
    /// The user must sign this approval.
    Transaction(UnsignedPayload),
}

// =============================================================================
// Charge results
// =============================================================================

/// Proof of a completed charge-and-burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeReceipt {
    /// Idempotency key of the charge
    pub charge_id: ChargeId,
    /// Account charged
    pub payer: Address,
    /// Total raw amount transferred
    pub amount: RawAmount,
    /// Fee/burn split of the amount
    pub split: BurnSplit,
    /// Signature of the delegate transfer
    pub transfer_signature: TxSignature,
    /// Signature of the burn; absent when nothing was burned
    pub burn_signature: Option<TxSignature>,
    /// Mint decimals the amounts are expressed in
    pub decimals: u8,
}

/// Outcome of a payment verification scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// A matching transfer was found.
    Verified {
        /// Transaction carrying the transfer
        signature: TxSignature,
        /// Raw amount transferred
        amount: RawAmount,
    },
    /// Nothing in the scan window matched.
    NotFound,
}

impl Verification {
    /// Whether a payment was found.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Payment defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    /// Tokens requested by `tx-request` when the client sends no amount
    pub default_request_tokens: f64,
    /// Tokens approved by `allowance-request` when the client sends no amount
    pub default_allowance_tokens: f64,
    /// Number of recent fee-account signatures the verifier scans
    pub verify_window: usize,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            default_request_tokens: DEFAULT_REQUEST_TOKENS as f64,
            default_allowance_tokens: DEFAULT_ALLOWANCE_TOKENS as f64,
            verify_window: DEFAULT_VERIFY_WINDOW,
        }
    }
}

impl PaymentsConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> PayResult<()> {
        for (name, value) in [
            ("default_request_tokens", self.default_request_tokens),
            ("default_allowance_tokens", self.default_allowance_tokens),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PayError::invalid_input(format!(
                    "payments.{} must be positive",
                    name
                )));
            }
        }
        if self.verify_window == 0 {
            return Err(PayError::invalid_input(
                "payments.verify_window must be at least 1",
            ));
        }
        Ok(())
    }
}
