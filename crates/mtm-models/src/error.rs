//! Error taxonomy shared by every valuation stage.

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Failures raised while building instruments or valuing a portfolio.
///
/// # Variants
/// * `Configuration` - Invalid instrument or service parameters, fatal at construction
/// * `UnknownTicker` - Ticker cannot be resolved or priced, aborts the current cycle
/// * `TimeRegression` - A price was requested for a timestamp before the last one
/// * `Matured` - Option priced on or after its maturity date
/// * `DegenerateInput` - Pricing formula would divide by zero or produce non-finite values
/// * `Overflow` - Decimal arithmetic left the representable range
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("unknown ticker {0}")]
    UnknownTicker(String),

    #[error("time regression for {ticker}: last priced at {last}, requested {requested}")]
    TimeRegression {
        ticker: String,
        last: NaiveDateTime,
        requested: NaiveDateTime,
    },

    #[error("option {ticker} matured on {maturity}, cannot price as of {as_of}")]
    Matured {
        ticker: String,
        maturity: NaiveDate,
        as_of: NaiveDate,
    },

    #[error("degenerate pricing input for {ticker}: {reason}")]
    DegenerateInput { ticker: String, reason: String },

    #[error("decimal overflow while computing {0}")]
    Overflow(String),
}
