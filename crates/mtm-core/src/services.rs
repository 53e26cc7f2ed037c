//! # Collaborator Interfaces
//!
//! Contracts between the valuation core and the systems around it.
//!
//! ## Description
//! All calls are synchronous and expected to be fast; the scheduler invokes them from
//! its own task and never concurrently. Storage, file loading and live market access
//! live behind these traits.

use chrono::NaiveDateTime;
use mtm_models::{Instrument, Position, ValuationError};
use rust_decimal::Decimal;

use crate::fanout::SubscriberId;

/// Supplies the open positions for a point in (simulated) time.
pub trait PositionSource: Send {
    /// Ordered position list; an empty list is valid.
    fn positions(&self, timestamp: NaiveDateTime) -> Result<Vec<Position>, ValuationError>;
}

/// Looks up instrument reference data by ticker.
pub trait ReferenceDataResolver: Send {
    /// Returns [`ValuationError::UnknownTicker`] for tickers it does not know.
    fn resolve(&self, ticker: &str) -> Result<Instrument, ValuationError>;
}

/// Source of equity prices.
///
/// Takes `&mut self`: implementations may advance internal state per call, and time
/// must not regress for a given ticker.
pub trait MarketPriceService: Send {
    fn price(&mut self, ticker: &str, timestamp: NaiveDateTime) -> Result<Decimal, ValuationError>;
}

/// Receives fan-out policy events. Fire and forget.
pub trait ObservabilitySink: Send + Sync {
    /// A snapshot was dropped because the subscriber's queue was full.
    fn record_drop(&self, subscriber: SubscriberId, label: &str);
}
