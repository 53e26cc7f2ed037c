//! # Equity Price Simulator
//!
//! Brownian-motion market data over simulated time.
//!
//! ## Description
//! Each registered equity starts from an initial price at a begin timestamp. A
//! request for a later timestamp advances the price by
//!
//! ```text
//! multiplier = μ·Δt/P + σ·z·√(Δt/P)        z ~ N(0, 1), P = twelve weeks
//! price'     = price · (1 + multiplier)
//! ```
//!
//! where Δt is the simulated time elapsed since the ticker's last price. Draws that
//! would make the price non-positive are rejected and redrawn (rejection sampling,
//! not a clamp), which keeps the shape of the distribution on the truncated support.
//!
//! Time may not move backward for a ticker. Requesting the last timestamp again
//! returns the last price unchanged.
//!
//! ## Concurrency
//! Not shareable: `next_price` takes `&mut self` and the scheduler task is its only
//! caller.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use mtm_models::precision::{internal_from_f64, round_internal};
use mtm_models::{Equity, ValuationError};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::services::MarketPriceService;

/// Reference interval the annualized parameters are scaled against, in seconds.
const TWELVE_WEEKS_SECONDS: f64 = 3600.0 * 24.0 * 7.0 * 12.0;

/// Upper bound on rejected draws before a step is reported as degenerate.
const MAX_REDRAWS: u32 = 10_000;

#[derive(Debug, Clone)]
struct PriceState {
    equity: Equity,
    price: Decimal,
    timestamp: NaiveDateTime,
}

pub struct EquityPriceSimulator<R = Pcg64> {
    states: HashMap<String, PriceState>,
    rng: R,
}

impl EquityPriceSimulator<Pcg64> {
    /// Simulator backed by a [`Pcg64`] seeded with `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::new(Pcg64::seed_from_u64(seed))
    }
}

impl<R: Rng> EquityPriceSimulator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            states: HashMap::new(),
            rng,
        }
    }

    /// Registers `equity` with its price at `as_of`.
    ///
    /// # Returns
    /// [`ValuationError::Configuration`] if the initial price is not positive.
    pub fn insert(
        &mut self,
        equity: Equity,
        initial_price: Decimal,
        as_of: NaiveDateTime,
    ) -> Result<(), ValuationError> {
        if initial_price <= Decimal::ZERO {
            return Err(ValuationError::Configuration(format!(
                "initial price of {} must be positive, got {}",
                equity.ticker(),
                initial_price
            )));
        }
        self.states.insert(
            equity.ticker().to_string(),
            PriceState {
                equity,
                price: initial_price,
                timestamp: as_of,
            },
        );
        Ok(())
    }

    /// Last simulated `(price, timestamp)` for `ticker`.
    pub fn last_price(&self, ticker: &str) -> Option<(Decimal, NaiveDateTime)> {
        self.states.get(ticker).map(|s| (s.price, s.timestamp))
    }

    /// Advances `ticker` to `target` and returns the new price.
    ///
    /// # Returns
    /// * [`ValuationError::UnknownTicker`] if the equity was never registered
    /// * [`ValuationError::TimeRegression`] if `target` precedes the last timestamp
    pub fn next_price(&mut self, ticker: &str, target: NaiveDateTime) -> Result<Decimal, ValuationError> {
        let state = self
            .states
            .get_mut(ticker)
            .ok_or_else(|| ValuationError::UnknownTicker(ticker.to_string()))?;

        if target < state.timestamp {
            return Err(ValuationError::TimeRegression {
                ticker: ticker.to_string(),
                last: state.timestamp,
                requested: target,
            });
        }
        let delta_millis = (target - state.timestamp).num_milliseconds();
        if delta_millis == 0 {
            // sub-millisecond steps keep the price but still move the clock
            state.timestamp = target;
            return Ok(state.price);
        }

        let elapsed = delta_millis as f64 / 1000.0 / TWELVE_WEEKS_SECONDS;
        let drift = state.equity.expected_return() * elapsed;
        let diffusion = state.equity.annualized_std_dev() * elapsed.sqrt();

        let mut redraws = 0;
        let next = loop {
            let z: f64 = self.rng.sample(StandardNormal);
            let multiplier = drift + diffusion * z;
            if multiplier >= -1.0 {
                // the growth factor is rounded too, so re-check positivity after rounding
                let candidate = internal_from_f64(1.0 + multiplier)
                    .and_then(|growth| state.price.checked_mul(growth))
                    .map(round_internal)
                    .filter(|price| *price > Decimal::ZERO);
                if let Some(price) = candidate {
                    break price;
                }
            }
            redraws += 1;
            if redraws >= MAX_REDRAWS {
                warn!("[SIMULATOR] {} rejected {} consecutive draws", ticker, redraws);
                return Err(ValuationError::DegenerateInput {
                    ticker: ticker.to_string(),
                    reason: format!("no positive price after {} draws", redraws),
                });
            }
        };

        if redraws > 0 {
            debug!("[SIMULATOR] {} redrew {} times over {} ms", ticker, redraws, delta_millis);
        }
        state.price = next;
        state.timestamp = target;
        Ok(next)
    }
}

impl<R: Rng + Send> MarketPriceService for EquityPriceSimulator<R> {
    fn price(&mut self, ticker: &str, timestamp: NaiveDateTime) -> Result<Decimal, ValuationError> {
        self.next_price(ticker, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal_macros::dec;

    const MAX_ITERATIONS: usize = 10_000;

    fn begin() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn simulator_with(seed: u64, equities: &[(&str, f64, f64)]) -> EquityPriceSimulator {
        let mut simulator = EquityPriceSimulator::seeded(seed);
        for (ticker, mu, sigma) in equities {
            simulator
                .insert(Equity::new(*ticker, *mu, *sigma).unwrap(), dec!(100), begin())
                .unwrap();
        }
        simulator
    }

    #[test]
    fn test_same_timestamp_returns_last_price() {
        let mut simulator = simulator_with(1, &[("AAPL", 0.4, 0.2)]);
        assert_eq!(simulator.next_price("AAPL", begin()).unwrap(), dec!(100));

        let later = begin() + Duration::seconds(2);
        let moved = simulator.next_price("AAPL", later).unwrap();
        assert_eq!(simulator.next_price("AAPL", later).unwrap(), moved);
        assert_eq!(simulator.last_price("AAPL"), Some((moved, later)));
    }

    #[test]
    fn test_time_regression_rejected() {
        let mut simulator = simulator_with(2, &[("AAPL", 0.4, 0.2)]);
        simulator.next_price("AAPL", begin() + Duration::hours(1)).unwrap();
        let result = simulator.next_price("AAPL", begin());
        assert!(matches!(result, Err(ValuationError::TimeRegression { .. })));
    }

    #[test]
    fn test_sub_millisecond_step_moves_clock() {
        let mut simulator = simulator_with(11, &[("AAPL", 0.4, 0.2)]);
        let later = begin() + Duration::microseconds(800);
        assert_eq!(simulator.next_price("AAPL", later).unwrap(), dec!(100));
        assert_eq!(simulator.last_price("AAPL"), Some((dec!(100), later)));

        let between = begin() + Duration::microseconds(400);
        assert!(matches!(
            simulator.next_price("AAPL", between),
            Err(ValuationError::TimeRegression { .. })
        ));
    }

    #[test]
    fn test_unknown_ticker_rejected() {
        let mut simulator = simulator_with(3, &[]);
        assert!(matches!(
            simulator.next_price("NOPE", begin()),
            Err(ValuationError::UnknownTicker(_))
        ));
    }

    #[test]
    fn test_prices_stay_positive_under_extreme_volatility() {
        let mut simulator = simulator_with(4, &[("RKLB", 0.0, 1.0)]);
        let mut ts = begin();
        for _ in 0..25 {
            ts += Duration::weeks(12);
            let price = simulator.next_price("RKLB", ts).unwrap();
            assert!(price > Decimal::ZERO, "non-positive price {}", price);
        }
    }

    #[test]
    fn test_new_price_keeps_internal_precision() {
        let mut simulator = simulator_with(5, &[("TSLA", 0.2, 0.5)]);
        let price = simulator.next_price("TSLA", begin() + Duration::days(1)).unwrap();
        assert_eq!(price, round_internal(price));
    }

    #[test]
    fn test_higher_return_eventually_outprices() {
        // the higher-drift equity overtakes after at least ten steps
        let mut simulator = simulator_with(6, &[("LOW", 0.3, 0.5), ("HIGH", 0.7, 0.5)]);
        let mut ts = begin();
        let mut iterations = 0;
        loop {
            ts += Duration::days(1);
            let low = simulator.next_price("LOW", ts).unwrap();
            let high = simulator.next_price("HIGH", ts).unwrap();
            iterations += 1;
            if iterations >= 10 && high >= low {
                break;
            }
            assert!(iterations < MAX_ITERATIONS, "high-return equity never caught up");
        }
    }

    #[test]
    fn test_longer_intervals_grow_more() {
        let mut short = simulator_with(7, &[("EQ", 0.9, 0.01)]);
        let mut long = simulator_with(8, &[("EQ", 0.9, 0.01)]);
        let (mut short_ts, mut long_ts) = (begin(), begin());
        for _ in 0..50 {
            short_ts += Duration::milliseconds(10);
            long_ts += Duration::days(1);
            short.next_price("EQ", short_ts).unwrap();
            long.next_price("EQ", long_ts).unwrap();
        }
        let (short_price, _) = short.last_price("EQ").unwrap();
        let (long_price, _) = long.last_price("EQ").unwrap();
        assert!(short_price < long_price, "{} should be below {}", short_price, long_price);
    }

    #[test]
    fn test_zero_volatility_is_pure_drift() {
        let mut simulator = simulator_with(9, &[("BOND", 0.5, 0.0)]);
        let price = simulator
            .next_price("BOND", begin() + Duration::seconds(TWELVE_WEEKS_SECONDS as i64))
            .unwrap();
        assert_eq!(price, dec!(150));
    }

    #[test]
    fn test_non_positive_initial_price_rejected() {
        let mut simulator = EquityPriceSimulator::seeded(10);
        let equity = Equity::new("AAPL", 0.4, 0.2).unwrap();
        assert!(simulator.insert(equity, Decimal::ZERO, begin()).is_err());
    }
}
