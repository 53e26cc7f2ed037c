//! # Portfolio Snapshot
//!
//! One fully priced view of the portfolio at a simulated timestamp.
//!
//! ## Description
//! A [`Snapshot`] is built once per valuation cycle and then shared, never copied,
//! by every subscriber queue (`Arc<Snapshot>`). Construction is the only place the
//! total is computed, so `total_value == Σ extended_value` holds for every instance.
//!
//! Extended values multiply a decimal unit price by an integer quantity, which keeps
//! the unit price's scale. `Decimal` arithmetic silently gives up fractional digits
//! once the 96-bit mantissa is exhausted, so every product and partial sum is checked
//! to keep the widest scale of its operands; otherwise construction fails with
//! [`ValuationError::Overflow`].

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ValuationError;
use crate::position::Position;

/// A position together with its unit price and extended (quantity-weighted) value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    position: Position,
    unit_price: Decimal,
    extended_value: Decimal,
}

impl SnapshotEntry {
    pub fn new(position: Position, unit_price: Decimal) -> Result<Self, ValuationError> {
        let extended_value = unit_price
            .checked_mul(Decimal::from(position.quantity()))
            .filter(|value| value.scale() >= unit_price.scale())
            .ok_or_else(|| ValuationError::Overflow(format!("value of {}", position.ticker())))?;
        Ok(Self {
            position,
            unit_price,
            extended_value,
        })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn extended_value(&self) -> Decimal {
        self.extended_value
    }
}

/// Equity price observed during the cycle, whether held directly or as an underlying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquityPriceUpdate {
    pub ticker: String,
    pub price: Decimal,
}

/// Immutable portfolio valuation.
///
/// # Fields
/// * `timestamp` - Simulated time the valuation applies to
/// * `entries` - One entry per position, in position-source order
/// * `equity_prices` - Every equity priced in the cycle, sorted by ticker
/// * `total_value` - Sum of all extended values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    timestamp: NaiveDateTime,
    entries: Vec<SnapshotEntry>,
    equity_prices: Vec<EquityPriceUpdate>,
    total_value: Decimal,
}

impl Snapshot {
    pub fn new(
        timestamp: NaiveDateTime,
        entries: Vec<SnapshotEntry>,
        mut equity_prices: Vec<EquityPriceUpdate>,
    ) -> Result<Self, ValuationError> {
        let total_value = entries.iter().try_fold(Decimal::ZERO, |acc, entry| {
            acc.checked_add(entry.extended_value)
                .filter(|sum| sum.scale() >= acc.scale().max(entry.extended_value.scale()))
                .ok_or_else(|| ValuationError::Overflow("portfolio total".to_string()))
        })?;
        equity_prices.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(Self {
            timestamp,
            entries,
            equity_prices,
            total_value,
        })
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn equity_prices(&self) -> &[EquityPriceUpdate] {
        &self.equity_prices
    }

    pub fn total_value(&self) -> Decimal {
        self.total_value
    }

    /// Looks up the entry for a ticker, if held.
    pub fn entry(&self, ticker: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.position.ticker() == ticker)
    }
}
