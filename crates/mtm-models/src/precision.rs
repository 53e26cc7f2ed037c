//! # Decimal Precision Contexts
//!
//! Prices travel as [`Decimal`] values with two fixed precision contexts:
//! - **Internal**: 13 significant digits, used for simulated prices and for the
//!   intermediate terms of the option formula.
//! - **External**: 10 significant digits, applied once to a reported option price.
//!
//! Both contexts round half away from zero (half-up on magnitudes).

use rust_decimal::prelude::*;

/// Significant digits kept by intermediate price computations.
pub const INTERNAL_SIGNIFICANT_DIGITS: u32 = 13;

/// Significant digits of prices reported by the option pricer.
pub const EXTERNAL_SIGNIFICANT_DIGITS: u32 = 10;

const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Rounds to the internal context.
pub fn round_internal(value: Decimal) -> Decimal {
    round_significant(value, INTERNAL_SIGNIFICANT_DIGITS)
}

/// Rounds to the external (reported) context.
pub fn round_external(value: Decimal) -> Decimal {
    round_significant(value, EXTERNAL_SIGNIFICANT_DIGITS)
}

/// Converts a finite `f64` into a decimal in the internal context.
///
/// Returns `None` for NaN, infinities and magnitudes beyond the decimal range.
pub fn internal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(round_internal)
}

fn round_significant(value: Decimal, digits: u32) -> Decimal {
    // None only for digits == 0, which the constants above rule out
    value.round_sf_with_strategy(digits, ROUNDING).unwrap_or(value)
}
