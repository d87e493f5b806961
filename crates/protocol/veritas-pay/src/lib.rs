//! Payment layer for the Veritas charge-and-burn flow.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  tx-request / allowance   ┌──────────────────┐
//! │  Wallet     │ ←──────────────────────── │ PaymentRequester │
//! │  (client)   │   unsigned transaction    └──────────────────┘
//! │             │
//! │             │  signed transfer          ┌──────────────────┐
//! │             │ ────────► ledger ◄─────── │ PaymentVerifier  │
//! └─────────────┘                           └──────────────────┘
//!
//!  query ──► ChargeExecutor ──► delegate transfer ──► burn 1%
//!                  │
//!                  └──► ChargeBook (idempotency, reconciliation)
//! ```
//!
//! # Components
//!
//! - **[`requester`]**: unsigned transfer and approval transactions
//! - **[`executor`]**: delegate charge followed by the burn
//! - **[`book`]**: charge records keyed by charge id
//! - **[`verifier`]**: history scan for user-signed payments
//! - **[`types`]**: payloads, receipts and configuration
//! - **[`error`]**: error types with HTTP mapping and recovery suggestions
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use veritas_pay::{ChargeBook, ChargeExecutor};
//! use veritas_settle::{Ledger, MintCache, MockLedger, RetryPolicy};
//! use veritas_types::{Address, ChargeRequest};
//!
//! # async fn example() -> veritas_pay::PayResult<()> {
//! let ledger = MockLedger::random(2);
//! let user = Address::random();
//! ledger.fund(&user, 10_000);
//! ledger.approve(&user, &ledger.delegate(), 10_000);
//!
//! let executor = ChargeExecutor::new(
//!     Arc::new(ledger.clone()),
//!     RetryPolicy::default(),
//!     MintCache::new(),
//!     ChargeBook::new(),
//! );
//! let receipt = executor
//!     .charge_and_burn(&ChargeRequest::new(user, 6_600))
//!     .await?;
//! assert_eq!(receipt.split.burned, 66);
//! # Ok(())
//! # }
//! ```

pub mod book;
pub mod error;
pub mod executor;
pub mod requester;
pub mod types;
pub mod verifier;

// Re-export main types
pub use book::{ChargeBook, ChargeRecord, ChargeStatus, ChargeSummary};
pub use error::{PayError, PayResult};
pub use executor::ChargeExecutor;
pub use requester::PaymentRequester;
pub use types::{AllowanceOutcome, ChargeReceipt, PaymentsConfig, UnsignedPayload, Verification};
pub use verifier::PaymentVerifier;
