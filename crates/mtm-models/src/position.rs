//! Open positions as reported by a position source.

use serde::{Deserialize, Serialize};

/// A signed holding of one instrument.
///
/// # Fields
/// * `ticker` - Instrument identifier, resolved through reference data
/// * `quantity` - Units held; negative for short positions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    ticker: String,
    quantity: i64,
}

impl Position {
    pub fn new(ticker: impl Into<String>, quantity: i64) -> Self {
        Self {
            ticker: ticker.into(),
            quantity,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }
}
