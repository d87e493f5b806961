//! Offline price estimate for a query.

use serde::Serialize;
use veritas_econ::format_usd;
use veritas_ops::{assemble_prompt, Mode};

use crate::config::ServerConfig;
use crate::error::ServerResult;

/// What a query would cost, before any web results are added.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub mode: Mode,
    pub model: String,
    pub used_fallback: bool,
    pub prompt_units: u64,
    pub completion_units: u64,
    pub model_cost_usd: String,
    pub usd_charged: String,
    pub tokens: u64,
}

/// Execute the quote command.
pub fn quote(
    config: &ServerConfig,
    input: &str,
    mode: Mode,
    model: Option<&str>,
    json: bool,
) -> ServerResult<String> {
    let estimator = config.pricing.estimator()?;
    let model = model.unwrap_or(&config.llm.model);
    let estimate = estimator.estimate(&assemble_prompt(mode, &[], input), model)?;

    let quote = Quote {
        mode,
        model: estimate.model.clone(),
        used_fallback: estimate.used_fallback,
        prompt_units: estimate.prompt_units,
        completion_units: estimate.completion_units,
        model_cost_usd: format_usd(estimate.model_cost_nano_usd),
        usd_charged: estimate.usd_charged(),
        tokens: estimate.tokens,
    };

    if json {
        return Ok(serde_json::to_string_pretty(&quote).unwrap_or_default());
    }
    let mut out = format!(
        "Mode:          {}\nModel:         {}{}\nPrompt units:  {}\nBudgeted:      {}\nModel cost:    ${}\nCharged:       ${}\nTokens:        {}",
        quote.mode,
        quote.model,
        if quote.used_fallback { " (default pricing)" } else { "" },
        quote.prompt_units,
        quote.completion_units,
        quote.model_cost_usd,
        quote.usd_charged,
        quote.tokens,
    );
    out.push_str("\nWeb search adds its results to the prompt and raises the price.");
    Ok(out)
}
