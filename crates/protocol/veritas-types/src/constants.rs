//! Protocol constants.
//!
//! Economic ratios, limits and operator-facing defaults. Values that an
//! operator may tune are only defaults here; the server config overrides them.

// =============================================================================
// Burn
// =============================================================================

/// The burned share of each charge is `floor(total / BURN_DIVISOR)` (1%).
pub const BURN_DIVISOR: u64 = 100;

// =============================================================================
// Amounts
// =============================================================================

/// Largest mint decimals a u64 raw amount can hold (10^19 < 2^64).
pub const MAX_DECIMALS: u8 = 19;

/// Default token amount requested by `tx-request` when the client omits one.
pub const DEFAULT_REQUEST_TOKENS: u64 = 100;

/// Default delegate allowance requested by `allowance-request` (whole tokens).
pub const DEFAULT_ALLOWANCE_TOKENS: u64 = 1000;

// =============================================================================
// Pricing
// =============================================================================

/// Nano-USD per USD.
pub const NANO_USD_PER_USD: u64 = 1_000_000_000;

/// Completion units budgeted for every query.
pub const DEFAULT_COMPLETION_BUDGET: u64 = 300;

/// Markup applied to the model cost, in percent (200 = 2x).
pub const DEFAULT_MARKUP_PERCENT: u64 = 200;

/// Default USD price of one whole token, in nano-USD ($0.00001).
pub const DEFAULT_TOKEN_PRICE_NANO_USD: u64 = 10_000;

/// Default model tier used for unknown model ids.
pub const DEFAULT_MODEL_ID: &str = "gpt-4";

// =============================================================================
// Verification and search
// =============================================================================

/// How many recent fee-collector signatures the verifier scans.
pub const DEFAULT_VERIFY_WINDOW: usize = 10;

/// Maximum number of consumed signatures remembered by the verifier.
pub const MAX_SEEN_SIGNATURES: usize = 10_000;

/// Maximum number of web results folded into a prompt.
pub const MAX_SEARCH_RESULTS: usize = 5;

// =============================================================================
// Encoding
// =============================================================================

/// Length of an account address or blockhash in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of a transaction signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of a charge id in bytes (hex encoded on the wire).
pub const CHARGE_ID_LENGTH: usize = 16;
