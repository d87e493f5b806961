//! Token ledger boundary for the Veritas charge-and-burn flow.
//!
//! This crate owns every interaction with the token ledger. Callers above it
//! see the [`Ledger`] trait and never touch RPC types directly.
//!
//! # Architecture
//!
//! ```text
//! veritas-pay                 veritas-settle
//! ┌────────────────┐         ┌─────────────────────────┐
//! │ requester      │ ──────► │ Ledger (trait)          │
//! │ executor       │         │   ├─ MockLedger         │
//! │ verifier       │         │   └─ SolanaLedger       │
//! └────────────────┘         └───────────┬─────────────┘
//!                                        │
//!                                        ▼
//!                            ┌─────────────────────────┐
//!                            │ SPL token program       │
//!                            └─────────────────────────┘
//! ```
//!
//! # Usage
//!
//! The Solana implementation requires the `solana-sdk` feature:
//!
//! ```toml
//! veritas-settle = { path = "...", features = ["solana-sdk"] }
//! ```
//!
//! ```rust,ignore
//! use veritas_settle::{Ledger, LedgerConfig, SolanaLedger};
//!
//! # async fn example(config: LedgerConfig) -> veritas_settle::LedgerResult<()> {
//! let ledger = SolanaLedger::new(&config)?;
//! let info = ledger.mint_info().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Failure semantics
//!
//! Transient failures are `Network` (never reached the ledger) and `Timeout`
//! (outcome unknown). [`RetryPolicy::execute`] retries both for reads;
//! [`RetryPolicy::execute_submit`] retries only `Network`, so a transfer or
//! burn is never submitted twice.

mod config;
mod error;
mod mint_cache;
pub mod mock;
mod retry;
#[cfg(feature = "solana-sdk")]
mod solana;
mod traits;

pub use config::{Commitment, LedgerConfig, LedgerNetwork, RetryConfig};
pub use error::{LedgerError, LedgerResult, SubmitPhase};
pub use mint_cache::MintCache;
pub use mock::{MockLedger, MockOp};
pub use retry::RetryPolicy;
#[cfg(feature = "solana-sdk")]
pub use solana::SolanaLedger;
pub use traits::Ledger;

use std::sync::Arc;

/// Build the ledger selected by `config`.
///
/// The mock network returns a fresh [`MockLedger`] with no balances.
pub fn connect(config: &LedgerConfig) -> LedgerResult<Arc<dyn Ledger>> {
    config.validate()?;
    match config.network {
        LedgerNetwork::Mock => {
            tracing::warn!("Using in-memory mock ledger; no real tokens move");
            Ok(Arc::new(MockLedger::new(
                config.parse_mint()?,
                config.parse_fee_wallet()?,
                config.parse_delegate()?,
                config.mock_decimals,
            )))
        }
        #[cfg(feature = "solana-sdk")]
        _ => Ok(Arc::new(SolanaLedger::new(config)?)),
        #[cfg(not(feature = "solana-sdk"))]
        network => Err(LedgerError::config(format!(
            "network '{}' requires the solana-sdk feature",
            network
        ))),
    }
}
