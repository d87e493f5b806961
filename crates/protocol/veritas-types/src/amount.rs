//! Token amount conversion.
//!
//! The ledger only understands raw units (the smallest indivisible unit of a
//! mint). Humans and the pricing layer speak whole tokens. Conversion always
//! takes the decimals reported by the mint; nothing here assumes 9.

use crate::constants::MAX_DECIMALS;
use crate::error::{TypesError, TypesResult};

/// Amount in the smallest unit of a mint.
pub type RawAmount = u64;

fn check_decimals(decimals: u8) -> TypesResult<u64> {
    if decimals > MAX_DECIMALS {
        return Err(TypesError::UnsupportedDecimals(decimals));
    }
    Ok(10u64.pow(decimals as u32))
}

/// Convert a whole-token amount into raw units, rounding to the nearest unit.
///
/// Rejects negative, non-finite and out-of-range values.
pub fn to_raw(ui_amount: f64, decimals: u8) -> TypesResult<RawAmount> {
    let scale = check_decimals(decimals)?;
    if !ui_amount.is_finite() || ui_amount < 0.0 {
        return Err(TypesError::invalid_amount(format!(
            "{} is not a non-negative finite number",
            ui_amount
        )));
    }
    let scaled = (ui_amount * scale as f64).round();
    if scaled >= u64::MAX as f64 {
        return Err(TypesError::invalid_amount(format!(
            "{} tokens overflows raw units at {} decimals",
            ui_amount, decimals
        )));
    }
    Ok(scaled as u64)
}

/// Convert raw units into a whole-token amount.
pub fn from_raw(raw: RawAmount, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Parse a decimal string ("12", "0.5", "1.000000001") into raw units exactly.
///
/// Unlike [`to_raw`] this never goes through floating point. More fractional
/// digits than the mint supports is an error unless they are all zeros.
pub fn parse_ui_amount(text: &str, decimals: u8) -> TypesResult<RawAmount> {
    let scale = check_decimals(decimals)?;
    let text = text.trim();
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(TypesError::invalid_amount("empty amount"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(TypesError::invalid_amount(format!("'{}' is not a decimal number", text)));
    }

    let whole_units: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| TypesError::invalid_amount(format!("'{}' is too large", text)))?
    };

    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(TypesError::invalid_amount(format!(
            "'{}' has more than {} fractional digits",
            text, decimals
        )));
    }
    let frac_units: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded
            .parse()
            .map_err(|_| TypesError::invalid_amount(format!("'{}' is too large", text)))?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| TypesError::invalid_amount(format!("'{}' overflows raw units", text)))
}

/// Format raw units as a whole-token decimal string without trailing zeros.
pub fn format_ui_amount(raw: RawAmount, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let digits = format!("{:0>width$}", raw, width = decimals as usize + 1);
    let (whole, frac) = digits.split_at(digits.len() - decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}
