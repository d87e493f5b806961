//! Data structures for the Veritas charge-and-burn flow.
//!
//! This crate provides the types shared by every Veritas crate. It contains
//! no I/O and no business logic beyond the arithmetic that defines the types
//! themselves (unit conversion and the burn split).
//!
//! # Module Organization
//!
//! - [`address`] - Base58 account addresses, blockhashes and signatures
//! - [`amount`] - Raw/UI token amount conversion
//! - [`charge`] - Charge requests, delegate allowances, burn split
//! - [`transaction`] - Unsigned transaction payloads and parsed transfers
//! - [`constants`] - Protocol constants (burn ratio, defaults, limits)
//! - [`error`] - The error type for invalid inputs
//!
//! # Example
//!
//! ```
//! use veritas_types::{to_raw, BurnSplit};
//!
//! // 66 tokens at 9 decimals
//! let raw = to_raw(66.0, 9).unwrap();
//! assert_eq!(raw, 66_000_000_000);
//!
//! let split = BurnSplit::of(6600);
//! assert_eq!(split.burned, 66);
//! assert_eq!(split.fee_retained, 6534);
//! ```
//!
//! # Type Conventions
//!
//! - Raw token amounts are always `u64` in the smallest unit of the mint
//! - Addresses serialize as base58 strings in JSON
//! - Enums use `#[serde(rename_all = "snake_case")]`

pub mod address;
pub mod amount;
pub mod charge;
pub mod constants;
pub mod error;
pub mod transaction;

pub use address::{Address, Blockhash, TxSignature};
pub use amount::{format_ui_amount, from_raw, parse_ui_amount, to_raw, RawAmount};
pub use charge::{BurnSplit, ChargeId, ChargeRequest, DelegateAllowance, MintInfo};
pub use error::{TypesError, TypesResult};
pub use transaction::{TokenInstruction, TokenTransfer, UnsignedTransaction};

/// Unix timestamp in milliseconds.
pub type Timestamp = u64;

/// Current Unix timestamp in milliseconds.
pub fn current_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
