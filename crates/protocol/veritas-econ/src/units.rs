//! Prompt unit counting and USD helpers.
//!
//! Prompt units are model tokens. Models tiktoken knows are counted with
//! their BPE encoding; anything else falls back to a character estimate.

use std::sync::OnceLock;

use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::{cl100k_base, o200k_base, p50k_base, r50k_base, CoreBPE};
use tracing::debug;
use veritas_types::constants::NANO_USD_PER_USD;

use crate::error::{EconError, EconResult};

/// Price in billionths of a US dollar.
pub type NanoUsd = u64;

/// Characters per prompt unit used by the fallback estimate.
pub const CHARS_PER_UNIT: usize = 4;

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static P50K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static R50K: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// The BPE encoding for `model_id`, loaded once per encoding.
fn encoding_for_model(model_id: &str) -> Option<&'static CoreBPE> {
    let (slot, load): (&'static OnceLock<Option<CoreBPE>>, fn() -> Option<CoreBPE>) =
        match get_tokenizer(model_id)? {
            Tokenizer::Cl100kBase => (&CL100K, || cl100k_base().ok()),
            Tokenizer::O200kBase => (&O200K, || o200k_base().ok()),
            Tokenizer::P50kBase | Tokenizer::P50kEdit => (&P50K, || p50k_base().ok()),
            Tokenizer::R50kBase | Tokenizer::Gpt2 => (&R50K, || r50k_base().ok()),
            #[allow(unreachable_patterns)]
            _ => return None,
        };
    slot.get_or_init(load).as_ref()
}

/// Count the prompt units (model tokens) `text` occupies for `model_id`.
///
/// Uses the model's tokenizer when tiktoken knows it, otherwise
/// [`estimate_prompt_units`].
pub fn count_prompt_units(text: &str, model_id: &str) -> u64 {
    match encoding_for_model(model_id) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
        None => {
            debug!(model = model_id, "No tokenizer for model, estimating prompt units");
            estimate_prompt_units(text)
        }
    }
}

/// Estimate how many prompt units a text occupies without a tokenizer.
///
/// ceil(chars / 4). Close to what BPE tokenizers produce for English prose.
pub fn estimate_prompt_units(text: &str) -> u64 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_UNIT) as u64
}

/// Convert a USD amount to nano-USD, rounding to the nearest unit.
pub fn usd_to_nano(usd: f64) -> EconResult<NanoUsd> {
    if !usd.is_finite() || usd < 0.0 {
        return Err(EconError::InvalidUsd(format!(
            "{} is not a non-negative finite number",
            usd
        )));
    }
    let nano = (usd * NANO_USD_PER_USD as f64).round();
    if nano >= u64::MAX as f64 {
        return Err(EconError::InvalidUsd(format!("{} is too large", usd)));
    }
    Ok(nano as u64)
}

/// Convert nano-USD to a floating USD amount for display.
pub fn nano_to_usd(nano: NanoUsd) -> f64 {
    nano as f64 / NANO_USD_PER_USD as f64
}

/// Format nano-USD with six decimal places, rounded half up.
pub fn format_usd(nano: NanoUsd) -> String {
    let micro = nano / 1000 + u64::from(nano % 1000 >= 500);
    format!("{}.{:06}", micro / 1_000_000, micro % 1_000_000)
}
