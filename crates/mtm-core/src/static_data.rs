//! In-memory collaborators for demos and tests.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use mtm_models::{Instrument, Position, ValuationError};

use crate::services::{PositionSource, ReferenceDataResolver};

/// Returns the same positions for every timestamp.
#[derive(Debug, Clone, Default)]
pub struct StaticPositionSource {
    positions: Vec<Position>,
}

impl StaticPositionSource {
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions }
    }
}

impl PositionSource for StaticPositionSource {
    fn positions(&self, _timestamp: NaiveDateTime) -> Result<Vec<Position>, ValuationError> {
        Ok(self.positions.clone())
    }
}

/// Reference data held in a ticker-keyed map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceData {
    instruments: HashMap<String, Instrument>,
}

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an instrument, keyed by its own ticker.
    pub fn insert(&mut self, instrument: impl Into<Instrument>) {
        let instrument = instrument.into();
        self.instruments.insert(instrument.ticker().to_string(), instrument);
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl FromIterator<Instrument> for InMemoryReferenceData {
    fn from_iter<I: IntoIterator<Item = Instrument>>(iter: I) -> Self {
        let mut data = Self::new();
        for instrument in iter {
            data.insert(instrument);
        }
        data
    }
}

impl ReferenceDataResolver for InMemoryReferenceData {
    fn resolve(&self, ticker: &str) -> Result<Instrument, ValuationError> {
        self.instruments
            .get(ticker)
            .cloned()
            .ok_or_else(|| ValuationError::UnknownTicker(ticker.to_string()))
    }
}
