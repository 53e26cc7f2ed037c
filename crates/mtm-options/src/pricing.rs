//! # Options Pricing Module
//!
//! Black-Scholes valuation of European options with a sampled normal CDF.
//!
//! ## Description
//! [`OptionPricer`] evaluates the analytical Black-Scholes-Merton solution for calls
//! and puts. The cumulative distribution Φ is not approximated with an error
//! function; it is read from a [`DistributionSampler`], so the pricing accuracy is
//! governed by the sampler's sample count.
//!
//! The spot-scaled and strike-scaled terms are each carried at the internal decimal
//! precision and the final difference is rounded once to the external precision, so
//! rounding error does not compound across the two terms.
//!
//! ## References
//! - Black, F., & Scholes, M. (1973). The Pricing of Options and Corporate Liabilities.
//!   Journal of Political Economy, 81(3), 637-654.
//! - IEEE Std 1016-2009: Software Design Descriptions
//!
//! ## Module Structure
//! - [`OptionPricer::price`] - Price an option as of a date
//! - [`OptionPricer::price_for_years`] - Price with an explicit time to maturity

use std::sync::Arc;

use chrono::NaiveDate;
use mtm_models::precision::{internal_from_f64, round_external, round_internal};
use mtm_models::{Equity, EuropeanOption, OptionType, ValuationError};
use rust_decimal::prelude::*;

use crate::sampler::DistributionSampler;

/// Continuously compounded risk-free rate used unless overridden (2%).
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Day count basis for time to maturity.
const DAYS_PER_YEAR: f64 = 365.0;

/// Calculates d₁ and d₂ parameters for Black-Scholes formula.
///
/// # Description
/// - d₁ = [ln(S/K) + (r + σ²/2)T] / (σ√T)
/// - d₂ = d₁ - σ√T
fn d1_d2(spot: f64, strike: f64, time: f64, rate: f64, volatility: f64) -> (f64, f64) {
    let d1 = ((spot / strike).ln() + (rate + volatility * volatility / 2.0) * time)
        / (volatility * time.sqrt());
    let d2 = d1 - volatility * time.sqrt();
    (d1, d2)
}

/// European option pricer sharing one immutable sampler.
///
/// # Fields
/// * `sampler` - Estimator of Φ, shared across pricing calls
/// * `risk_free_rate` - Continuously compounded rate r
#[derive(Debug, Clone)]
pub struct OptionPricer {
    sampler: Arc<DistributionSampler>,
    risk_free_rate: f64,
}

impl OptionPricer {
    pub fn new(sampler: Arc<DistributionSampler>) -> Self {
        Self {
            sampler,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
        }
    }

    pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
        self.risk_free_rate = risk_free_rate;
        self
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    /// Prices `option` as of `as_of` given the underlying's spot price.
    ///
    /// # Parameters
    /// * `option` - Contract to value
    /// * `underlying` - Reference data of the option's underlying; supplies σ
    /// * `as_of` - Valuation date; time to maturity is `days(as_of → maturity) / 365`
    /// * `spot` - Current underlying price S
    ///
    /// # Returns
    /// Premium rounded to the external precision, or
    /// * [`ValuationError::Matured`] if `as_of` is on or after maturity
    /// * [`ValuationError::DegenerateInput`] if σ is zero, the spot is not positive, or
    ///   the formula is not finite
    /// * [`ValuationError::Configuration`] if `underlying` is not the option's underlying
    pub fn price(
        &self,
        option: &EuropeanOption,
        underlying: &Equity,
        as_of: NaiveDate,
        spot: Decimal,
    ) -> Result<Decimal, ValuationError> {
        if underlying.ticker() != option.underlying() {
            return Err(ValuationError::Configuration(format!(
                "{} is written on {}, not {}",
                option.ticker(),
                option.underlying(),
                underlying.ticker()
            )));
        }

        let days_to_maturity = (option.maturity() - as_of).num_days();
        let years_to_maturity = days_to_maturity as f64 / DAYS_PER_YEAR;
        if years_to_maturity <= 0.0 {
            return Err(ValuationError::Matured {
                ticker: option.ticker().to_string(),
                maturity: option.maturity(),
                as_of,
            });
        }

        self.price_for_years(
            option.ticker(),
            option.option_type(),
            spot,
            option.strike(),
            underlying.annualized_std_dev(),
            years_to_maturity,
        )
    }

    /// Prices an option from raw inputs.
    ///
    /// # Description
    /// - Call: C = S·Φ(d₁) - K·e^(-rT)·Φ(d₂)
    /// - Put:  P = K·e^(-rT)·Φ(-d₂) - S·Φ(-d₁)
    ///
    /// # Parameters
    /// * `ticker` - Used in error messages only
    /// * `spot` - Underlying price S, must be positive
    /// * `strike` - Strike price K
    /// * `volatility` - Annualized volatility σ, must be positive
    /// * `years_to_maturity` - Time T in years, must be positive
    pub fn price_for_years(
        &self,
        ticker: &str,
        option_type: OptionType,
        spot: Decimal,
        strike: Decimal,
        volatility: f64,
        years_to_maturity: f64,
    ) -> Result<Decimal, ValuationError> {
        let degenerate = |reason: &str| ValuationError::DegenerateInput {
            ticker: ticker.to_string(),
            reason: reason.to_string(),
        };

        if years_to_maturity <= 0.0 {
            return Err(degenerate("time to maturity must be positive"));
        }
        if volatility <= 0.0 {
            return Err(degenerate("volatility must be positive"));
        }
        let spot_f = spot
            .to_f64()
            .filter(|s| *s > 0.0)
            .ok_or_else(|| degenerate("spot price must be positive"))?;
        let strike_f = strike
            .to_f64()
            .filter(|k| *k > 0.0)
            .ok_or_else(|| degenerate("strike must be positive"))?;

        let rate = self.risk_free_rate;
        let (d1, d2) = d1_d2(spot_f, strike_f, years_to_maturity, rate, volatility);
        if !d1.is_finite() || !d2.is_finite() {
            return Err(degenerate("d1/d2 are not finite"));
        }
        let discount = (-rate * years_to_maturity).exp();

        // Signed weights so both rights reduce to S·w_s - K·w_k
        let (spot_weight, strike_weight) = match option_type {
            OptionType::Call => (
                self.sampler.odds_less_than(d1),
                discount * self.sampler.odds_less_than(d2),
            ),
            OptionType::Put => (
                -self.sampler.odds_less_than(-d1),
                -discount * self.sampler.odds_less_than(-d2),
            ),
        };

        let spot_term = scaled_term(spot, spot_weight)
            .ok_or_else(|| ValuationError::Overflow(format!("spot term of {}", ticker)))?;
        let strike_term = scaled_term(strike, strike_weight)
            .ok_or_else(|| ValuationError::Overflow(format!("strike term of {}", ticker)))?;
        let premium = spot_term
            .checked_sub(strike_term)
            .ok_or_else(|| ValuationError::Overflow(format!("premium of {}", ticker)))?;

        Ok(round_external(premium))
    }
}

/// `amount · weight` at internal precision.
fn scaled_term(amount: Decimal, weight: f64) -> Option<Decimal> {
    let weight = internal_from_f64(weight)?;
    amount.checked_mul(weight).map(round_internal)
}
