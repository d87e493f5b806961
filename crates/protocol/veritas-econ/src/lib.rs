//! Query pricing for the Veritas charge-and-burn flow.
//!
//! This crate turns an assembled prompt into the number of application
//! tokens a user must pay before the language model is called:
//!
//! - **Prompt units** ([`units`]): model tokens counted with the model's BPE
//!   tokenizer, with a character estimate for unknown models
//! - **Cost estimation** ([`pricing`]): per-model price table, completion
//!   budget, markup and token price, all in integer nano-USD
//!
//! The burn split itself is a property of the charge and lives in
//! [`veritas_types::BurnSplit`].
//!
//! # Example
//!
//! ```
//! use veritas_econ::{estimate_cost_for_units, PriceTable, PricingConfig};
//!
//! let est = estimate_cost_for_units(500, "gpt-4", &PriceTable::standard(), &PricingConfig::default())
//!     .unwrap();
//! assert_eq!(est.tokens, 6600);
//! assert_eq!(est.usd_charged(), "0.066000");
//! ```
//!
//! # Rounding
//!
//! Every division rounds up, so the number of tokens charged always covers
//! the marked-up model cost. Unknown model ids are priced at the table's
//! default tier (`gpt-4`), never at zero.

pub mod error;
pub mod pricing;
pub mod units;

pub use error::{EconError, EconResult};
pub use pricing::{
    estimate_cost, estimate_cost_for_units, CostEstimate, ModelPrice, PriceEstimator, PriceTable,
    PricingConfig,
};
pub use units::{
    count_prompt_units, estimate_prompt_units, format_usd, nano_to_usd, usd_to_nano, NanoUsd,
};
