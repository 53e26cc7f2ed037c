//! # Instrument Reference Data
//!
//! Formal definition of the instruments a portfolio may hold.
//!
//! ## Description
//! An [`Instrument`] is either an [`Equity`], which carries the drift and volatility
//! parameters used by the price simulator, or a European option on an equity.
//! Options reference their underlying by ticker; the scheduler resolves the
//! underlying through the same reference data cache as every other ticker.
//!
//! All constructors validate their inputs, so any instance that exists is
//! internally consistent.
//!
//! ## References
//! - IEEE Std 1016-2009: Software Design Descriptions

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;

/// Classification of the option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Right to buy.
    Call,
    /// Right to sell.
    Put,
}

impl OptionType {
    /// Single-letter suffix used in option tickers (e.g. `AMZN-MAR-2022-3000-C`).
    pub fn symbol_suffix(&self) -> &'static str {
        match self {
            OptionType::Call => "C",
            OptionType::Put => "P",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol_suffix())
    }
}

/// A stock-like instrument whose price follows a Brownian motion.
///
/// # Fields
/// * `ticker` - Market identifier (e.g., "AAPL")
/// * `expected_return` - Expected annual return, range [0, 1]
/// * `annualized_std_dev` - Annualized standard deviation of returns, range [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equity {
    ticker: String,
    expected_return: f64,
    annualized_std_dev: f64,
}

impl Equity {
    /// Builds a validated equity.
    ///
    /// # Returns
    /// [`ValuationError::Configuration`] if the ticker is empty or either parameter lies
    /// outside [0, 1] (NaN included).
    pub fn new(
        ticker: impl Into<String>,
        expected_return: f64,
        annualized_std_dev: f64,
    ) -> Result<Self, ValuationError> {
        let ticker = require_ticker(ticker.into(), "equity")?;
        if !(0.0..=1.0).contains(&expected_return) {
            return Err(ValuationError::Configuration(format!(
                "expected return of {} must lie in [0, 1], got {}",
                ticker, expected_return
            )));
        }
        if !(0.0..=1.0).contains(&annualized_std_dev) {
            return Err(ValuationError::Configuration(format!(
                "annualized standard deviation of {} must lie in [0, 1], got {}",
                ticker, annualized_std_dev
            )));
        }
        Ok(Self {
            ticker,
            expected_return,
            annualized_std_dev,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn expected_return(&self) -> f64 {
        self.expected_return
    }

    pub fn annualized_std_dev(&self) -> f64 {
        self.annualized_std_dev
    }
}

/// European option, exercisable only at maturity.
///
/// # Fields
/// * `ticker` - Option identifier
/// * `underlying` - Ticker of the underlying equity
/// * `strike` - Exercise price, strictly positive
/// * `maturity` - Expiration date
/// * `option_type` - Call or Put
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EuropeanOption {
    ticker: String,
    underlying: String,
    strike: Decimal,
    maturity: NaiveDate,
    option_type: OptionType,
}

impl EuropeanOption {
    pub fn new(
        ticker: impl Into<String>,
        underlying: impl Into<String>,
        strike: Decimal,
        maturity: NaiveDate,
        option_type: OptionType,
    ) -> Result<Self, ValuationError> {
        let ticker = require_ticker(ticker.into(), "option")?;
        let underlying = require_ticker(underlying.into(), "underlying")?;
        if strike <= Decimal::ZERO {
            return Err(ValuationError::Configuration(format!(
                "strike of {} must be positive, got {}",
                ticker, strike
            )));
        }
        Ok(Self {
            ticker,
            underlying,
            strike,
            maturity,
            option_type,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn underlying(&self) -> &str {
        &self.underlying
    }

    pub fn strike(&self) -> Decimal {
        self.strike
    }

    pub fn maturity(&self) -> NaiveDate {
        self.maturity
    }

    pub fn option_type(&self) -> OptionType {
        self.option_type
    }
}

/// Any instrument that can appear in a position list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Instrument {
    Equity(Equity),
    Option(EuropeanOption),
}

impl Instrument {
    pub fn ticker(&self) -> &str {
        match self {
            Instrument::Equity(equity) => equity.ticker(),
            Instrument::Option(option) => option.ticker(),
        }
    }

    /// Ticker of the equity whose price drives this instrument: itself for an equity,
    /// the underlying for an option.
    pub fn pricing_equity(&self) -> &str {
        match self {
            Instrument::Equity(equity) => equity.ticker(),
            Instrument::Option(option) => option.underlying(),
        }
    }

    pub fn as_equity(&self) -> Option<&Equity> {
        match self {
            Instrument::Equity(equity) => Some(equity),
            Instrument::Option(_) => None,
        }
    }
}

impl From<Equity> for Instrument {
    fn from(equity: Equity) -> Self {
        Instrument::Equity(equity)
    }
}

impl From<EuropeanOption> for Instrument {
    fn from(option: EuropeanOption) -> Self {
        Instrument::Option(option)
    }
}

fn require_ticker(ticker: String, what: &str) -> Result<String, ValuationError> {
    if ticker.trim().is_empty() {
        return Err(ValuationError::Configuration(format!("{} ticker must not be empty", what)));
    }
    Ok(ticker)
}
