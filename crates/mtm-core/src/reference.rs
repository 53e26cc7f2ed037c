//! # Reference Data Cache
//!
//! Lifetime cache in front of a [`ReferenceDataResolver`].
//!
//! ## Description
//! Reference data is treated as immutable and the instrument universe as small, so
//! every successfully resolved instrument is kept in memory for the life of the
//! service and each ticker reaches the resolver at most once. Failed lookups are not
//! cached; the next cycle asks again.
//!
//! Owned by the scheduler task, which is the only caller, so no locking is needed.

use std::collections::HashMap;

use mtm_models::{Equity, Instrument, ValuationError};
use tracing::debug;

use crate::services::ReferenceDataResolver;

pub struct CachingReferenceData {
    resolver: Box<dyn ReferenceDataResolver>,
    cache: HashMap<String, Instrument>,
}

impl CachingReferenceData {
    pub fn new(resolver: Box<dyn ReferenceDataResolver>) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
        }
    }

    /// Resolves `ticker`, consulting the resolver only on the first request.
    pub fn instrument(&mut self, ticker: &str) -> Result<&Instrument, ValuationError> {
        if !self.cache.contains_key(ticker) {
            let instrument = self.resolver.resolve(ticker)?;
            debug!("[REFDATA] cached {} ({} instruments)", ticker, self.cache.len() + 1);
            self.cache.insert(ticker.to_string(), instrument);
        }
        self.cache
            .get(ticker)
            .ok_or_else(|| ValuationError::UnknownTicker(ticker.to_string()))
    }

    /// Resolves `ticker` and requires it to be an equity.
    pub fn equity(&mut self, ticker: &str) -> Result<Equity, ValuationError> {
        match self.instrument(ticker)? {
            Instrument::Equity(equity) => Ok(equity.clone()),
            Instrument::Option(_) => Err(ValuationError::Configuration(format!(
                "{} is an option, expected an equity",
                ticker
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
