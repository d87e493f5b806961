//! Query cost estimation.
//!
//! Converts an assembled prompt into the number of application tokens a user
//! must pay for it:
//!
//! ```text
//! usd    = prompt_units/1000 * prompt_price + completion_budget/1000 * completion_price
//! usd   *= markup
//! tokens = ceil(usd / token_price)
//! ```
//!
//! All arithmetic is integer nano-USD over `u128`, so the result is exact
//! and only rounded once, upward, at the end.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use veritas_types::constants::{
    DEFAULT_COMPLETION_BUDGET, DEFAULT_MARKUP_PERCENT, DEFAULT_MODEL_ID,
    DEFAULT_TOKEN_PRICE_NANO_USD,
};
use veritas_types::RawAmount;

use crate::error::{EconError, EconResult};
use crate::units::{count_prompt_units, format_usd, usd_to_nano, NanoUsd};

/// Units per price quote (prices are per 1K units).
const UNITS_PER_QUOTE: u128 = 1000;

/// Percent denominator for the markup.
const PERCENT: u128 = 100;

/// Per-1K-unit prices for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Nano-USD per 1K prompt units
    pub prompt_per_1k: NanoUsd,
    /// Nano-USD per 1K completion units
    pub completion_per_1k: NanoUsd,
}

impl ModelPrice {
    /// Build from nano-USD prices.
    pub const fn new(prompt_per_1k: NanoUsd, completion_per_1k: NanoUsd) -> Self {
        Self {
            prompt_per_1k,
            completion_per_1k,
        }
    }

    /// Build from USD prices as published by the model vendor.
    pub fn from_usd(prompt_per_1k: f64, completion_per_1k: f64) -> EconResult<Self> {
        Ok(Self {
            prompt_per_1k: usd_to_nano(prompt_per_1k)?,
            completion_per_1k: usd_to_nano(completion_per_1k)?,
        })
    }
}

/// Static model price table with a documented fallback tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTable {
    models: BTreeMap<String, ModelPrice>,
    default_model: String,
}

impl PriceTable {
    /// The published prices for the supported models; `gpt-4` is the default tier.
    pub fn standard() -> Self {
        let mut models = BTreeMap::new();
        models.insert("gpt-4".to_string(), ModelPrice::new(30_000_000, 60_000_000));
        models.insert(
            "gpt-4-32k".to_string(),
            ModelPrice::new(60_000_000, 120_000_000),
        );
        models.insert(
            "gpt-3.5-turbo".to_string(),
            ModelPrice::new(1_500_000, 2_000_000),
        );
        Self {
            models,
            default_model: DEFAULT_MODEL_ID.to_string(),
        }
    }

    /// Add or replace a model price.
    pub fn with_model(mut self, model_id: impl Into<String>, price: ModelPrice) -> Self {
        self.models.insert(model_id.into(), price);
        self
    }

    /// Change the fallback tier. The model must already be in the table.
    pub fn with_default_model(mut self, model_id: impl Into<String>) -> EconResult<Self> {
        let model_id = model_id.into();
        if !self.models.contains_key(&model_id) {
            return Err(EconError::UnknownDefaultModel(model_id));
        }
        self.default_model = model_id;
        Ok(self)
    }

    /// The fallback model id.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Known model ids.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Resolve a model id to its price, falling back to the default tier.
    ///
    /// Returns the id actually priced and whether the fallback was taken.
    pub fn resolve(&self, model_id: &str) -> (&str, ModelPrice, bool) {
        if let Some((id, price)) = self.models.get_key_value(model_id) {
            return (id.as_str(), *price, false);
        }
        let price = self
            .models
            .get(&self.default_model)
            .copied()
            // with_default_model guarantees presence; keep the standard gpt-4 tier otherwise
            .unwrap_or(ModelPrice::new(30_000_000, 60_000_000));
        (self.default_model.as_str(), price, true)
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Pricing knobs that are not per-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Completion units budgeted per query
    pub completion_budget: u64,
    /// Markup in percent (200 = 2x)
    pub markup_percent: u64,
    /// USD price of one whole application token, in nano-USD
    pub token_price_nano_usd: NanoUsd,
}

impl PricingConfig {
    /// Reject configurations that could under-charge or divide by zero.
    pub fn validate(&self) -> EconResult<()> {
        if self.token_price_nano_usd == 0 {
            return Err(EconError::ZeroTokenPrice);
        }
        if self.markup_percent < PERCENT as u64 {
            return Err(EconError::MarkupTooLow {
                percent: self.markup_percent,
            });
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            completion_budget: DEFAULT_COMPLETION_BUDGET,
            markup_percent: DEFAULT_MARKUP_PERCENT,
            token_price_nano_usd: DEFAULT_TOKEN_PRICE_NANO_USD,
        }
    }
}

/// Result of pricing one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Model id that was priced
    pub model: String,
    /// Whether the model id was unknown and the default tier used
    pub used_fallback: bool,
    /// Estimated prompt units
    pub prompt_units: u64,
    /// Budgeted completion units
    pub completion_units: u64,
    /// Raw model cost before markup, rounded up
    pub model_cost_nano_usd: NanoUsd,
    /// Cost after markup, rounded up
    pub charged_nano_usd: NanoUsd,
    /// Whole application tokens required, rounded up
    pub tokens: u64,
}

impl CostEstimate {
    /// Charged USD with six decimals.
    pub fn usd_charged(&self) -> String {
        format_usd(self.charged_nano_usd)
    }

    /// The token count in raw units for a mint with `decimals`.
    pub fn raw_amount(&self, decimals: u8) -> EconResult<RawAmount> {
        if decimals > veritas_types::constants::MAX_DECIMALS {
            return Err(veritas_types::TypesError::UnsupportedDecimals(decimals).into());
        }
        self.tokens
            .checked_mul(10u64.pow(decimals as u32))
            .ok_or(EconError::Overflow("raw token amount"))
    }
}

fn ceil_div(numerator: u128, denominator: u128) -> u128 {
    numerator.div_ceil(denominator)
}

fn narrow(value: u128, what: &'static str) -> EconResult<u64> {
    u64::try_from(value).map_err(|_| EconError::Overflow(what))
}

/// Price a query from an already-counted number of prompt units.
pub fn estimate_cost_for_units(
    prompt_units: u64,
    model_id: &str,
    table: &PriceTable,
    config: &PricingConfig,
) -> EconResult<CostEstimate> {
    config.validate()?;

    let (resolved, price, used_fallback) = table.resolve(model_id);
    if used_fallback {
        warn!(
            requested = model_id,
            fallback = resolved,
            "Unknown model id, pricing with default tier"
        );
    }

    // nano-USD scaled by UNITS_PER_QUOTE
    let scaled_cost = prompt_units as u128 * price.prompt_per_1k as u128
        + config.completion_budget as u128 * price.completion_per_1k as u128;
    let scaled_marked_up = scaled_cost * config.markup_percent as u128;

    let model_cost = ceil_div(scaled_cost, UNITS_PER_QUOTE);
    let charged = ceil_div(scaled_marked_up, UNITS_PER_QUOTE * PERCENT);
    let tokens = ceil_div(
        scaled_marked_up,
        UNITS_PER_QUOTE * PERCENT * config.token_price_nano_usd as u128,
    );

    Ok(CostEstimate {
        model: resolved.to_string(),
        used_fallback,
        prompt_units,
        completion_units: config.completion_budget,
        model_cost_nano_usd: narrow(model_cost, "model cost")?,
        charged_nano_usd: narrow(charged, "charged cost")?,
        tokens: narrow(tokens, "token count")?,
    })
}

/// Price an assembled prompt for `model_id`.
pub fn estimate_cost(
    prompt_text: &str,
    model_id: &str,
    table: &PriceTable,
    config: &PricingConfig,
) -> EconResult<CostEstimate> {
    estimate_cost_for_units(count_prompt_units(prompt_text, model_id), model_id, table, config)
}

/// A price table and config bundled for repeated use.
#[derive(Debug, Clone, Default)]
pub struct PriceEstimator {
    table: PriceTable,
    config: PricingConfig,
}

impl PriceEstimator {
    /// Create an estimator, validating the config up front.
    pub fn new(table: PriceTable, config: PricingConfig) -> EconResult<Self> {
        config.validate()?;
        Ok(Self { table, config })
    }

    /// Price an assembled prompt.
    pub fn estimate(&self, prompt_text: &str, model_id: &str) -> EconResult<CostEstimate> {
        estimate_cost(prompt_text, model_id, &self.table, &self.config)
    }

    /// The price table.
    pub fn table(&self) -> &PriceTable {
        &self.table
    }

    /// The pricing config.
    pub fn config(&self) -> &PricingConfig {
        &self.config
    }
}
