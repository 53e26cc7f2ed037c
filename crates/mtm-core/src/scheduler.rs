//! # Valuation Scheduler
//!
//! Periodic mark-to-market of the portfolio over simulated time.
//!
//! ## Description
//! A single task owns every collaborator and runs one cycle per tick:
//! 1. Skip entirely while nobody is subscribed.
//! 2. Fetch positions, deduplicate tickers and resolve them through the lifetime
//!    reference cache, splitting equities from options. Option underlyings are
//!    resolved through the same cache.
//! 3. Price each distinct equity exactly once, then each option from its
//!    underlying's price.
//! 4. Build the [`Snapshot`] and hand it to the fan-out.
//!
//! Any failure aborts the cycle with nothing published; the next tick starts from
//! fresh inputs. Between cycles the task sleeps a real-time interval and advances the
//! simulated clock by a fixed step.
//!
//! ## Lifecycle
//! `Running → Stopped`. The stop token is observed at iteration boundaries only, so
//! an in-flight cycle always completes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use metrics::{counter, gauge};
use mtm_models::{Equity, EquityPriceUpdate, EuropeanOption, Instrument, Snapshot, SnapshotEntry, ValuationError};
use mtm_options::OptionPricer;
use rust_decimal::prelude::*;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::fanout::SubscriberFanout;
use crate::observability::{CYCLES_TOTAL, PORTFOLIO_VALUE};
use crate::reference::CachingReferenceData;
use crate::services::{MarketPriceService, PositionSource, ReferenceDataResolver};

/// Timing of the valuation loop.
///
/// # Fields
/// * `simulated_step` - Simulated time added to the clock after each cycle
/// * `real_interval` - Wall-clock pause between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub simulated_step: chrono::Duration,
    pub real_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            simulated_step: chrono::Duration::milliseconds(2_000),
            real_interval: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler task terminated abnormally: {0}")]
    Terminated(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

pub struct ValuationScheduler {
    config: SchedulerConfig,
    positions: Box<dyn PositionSource>,
    reference: CachingReferenceData,
    market: Box<dyn MarketPriceService>,
    pricer: OptionPricer,
    fanout: SubscriberFanout,
}

impl ValuationScheduler {
    pub fn new(
        config: SchedulerConfig,
        positions: Box<dyn PositionSource>,
        resolver: Box<dyn ReferenceDataResolver>,
        market: Box<dyn MarketPriceService>,
        pricer: OptionPricer,
        fanout: SubscriberFanout,
    ) -> Self {
        Self {
            config,
            positions,
            reference: CachingReferenceData::new(resolver),
            market,
            pricer,
            fanout,
        }
    }

    /// Runs one valuation cycle at `timestamp`.
    ///
    /// # Returns
    /// * `Ok(None)` - No subscribers; no collaborator was called
    /// * `Ok(Some(snapshot))` - Snapshot built and published
    /// * `Err(_)` - Cycle aborted, nothing published
    pub fn run_cycle(&mut self, timestamp: NaiveDateTime) -> Result<Option<Arc<Snapshot>>, ValuationError> {
        if self.fanout.is_empty() {
            debug!("[SCHEDULER] no subscribers yet, skipping {}", timestamp);
            return Ok(None);
        }

        let positions = self.positions.positions(timestamp)?;
        let tickers: BTreeSet<&str> = positions.iter().map(|p| p.ticker()).collect();

        let mut equities: BTreeMap<String, Equity> = BTreeMap::new();
        let mut options: BTreeMap<String, EuropeanOption> = BTreeMap::new();
        for ticker in tickers {
            match self.reference.instrument(ticker)? {
                Instrument::Equity(equity) => {
                    equities.insert(ticker.to_string(), equity.clone());
                }
                Instrument::Option(option) => {
                    options.insert(ticker.to_string(), option.clone());
                }
            }
        }
        for option in options.values() {
            if !equities.contains_key(option.underlying()) {
                let underlying = self.reference.equity(option.underlying())?;
                equities.insert(option.underlying().to_string(), underlying);
            }
        }

        let mut equity_prices: BTreeMap<String, Decimal> = BTreeMap::new();
        for ticker in equities.keys() {
            let price = self.market.price(ticker, timestamp)?;
            equity_prices.insert(ticker.clone(), price);
        }

        let as_of = timestamp.date();
        let mut option_prices: BTreeMap<String, Decimal> = BTreeMap::new();
        for (ticker, option) in &options {
            let missing = || ValuationError::UnknownTicker(option.underlying().to_string());
            let underlying = equities.get(option.underlying()).ok_or_else(missing)?;
            let spot = *equity_prices.get(option.underlying()).ok_or_else(missing)?;
            let premium = self.pricer.price(option, underlying, as_of, spot)?;
            option_prices.insert(ticker.clone(), premium);
        }

        let entries = positions
            .into_iter()
            .map(|position| {
                let unit_price = equity_prices
                    .get(position.ticker())
                    .or_else(|| option_prices.get(position.ticker()))
                    .copied()
                    .ok_or_else(|| ValuationError::UnknownTicker(position.ticker().to_string()))?;
                SnapshotEntry::new(position, unit_price)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let updates = equity_prices
            .into_iter()
            .map(|(ticker, price)| EquityPriceUpdate { ticker, price })
            .collect();
        let snapshot = Arc::new(Snapshot::new(timestamp, entries, updates)?);

        let report = self.fanout.publish(Arc::clone(&snapshot));
        debug!(
            "[SCHEDULER] {} valued at {} ({} delivered, {} dropped, {} pruned)",
            timestamp,
            snapshot.total_value(),
            report.delivered,
            report.dropped,
            report.pruned
        );
        gauge!(PORTFOLIO_VALUE).set(snapshot.total_value().to_f64().unwrap_or(f64::NAN));

        Ok(Some(snapshot))
    }

    /// Runs cycles from `start` until `stop` is cancelled.
    pub async fn run(mut self, start: NaiveDateTime, stop: CancellationToken) {
        info!(
            "[SCHEDULER] started at {} (step {} ms, interval {:?})",
            start,
            self.config.simulated_step.num_milliseconds(),
            self.config.real_interval
        );

        let mut timestamp = start;
        while !stop.is_cancelled() {
            match self.run_cycle(timestamp) {
                Ok(Some(_)) => counter!(CYCLES_TOTAL, "result" => "ok").increment(1),
                Ok(None) => {}
                Err(e) => {
                    error!("[SCHEDULER] cycle at {} failed: {}", timestamp, e);
                    counter!(CYCLES_TOTAL, "result" => "error").increment(1);
                }
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.config.real_interval) => {}
            }

            match timestamp.checked_add_signed(self.config.simulated_step) {
                Some(next) => timestamp = next,
                None => {
                    error!("[SCHEDULER] simulated clock overflowed after {}", timestamp);
                    break;
                }
            }
        }

        info!("[SCHEDULER] service terminated at {}", timestamp);
    }

    /// Moves the scheduler onto its own tokio task. Must be called inside a runtime.
    pub fn spawn(self, start: NaiveDateTime) -> SchedulerHandle {
        let stop = CancellationToken::new();
        let task = tokio::spawn(self.run(start, stop.clone()));
        SchedulerHandle { stop, task }
    }
}

/// Control handle of a spawned scheduler.
pub struct SchedulerHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Requests a stop at the next iteration boundary.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn state(&self) -> SchedulerState {
        if self.task.is_finished() {
            SchedulerState::Stopped
        } else {
            SchedulerState::Running
        }
    }

    /// Waits for the task to end.
    ///
    /// # Returns
    /// [`SchedulerError::Terminated`] if the task panicked or was aborted.
    pub async fn join(self) -> Result<(), SchedulerError> {
        self.task.await.map_err(|e| SchedulerError::Terminated(e.to_string()))
    }

    pub async fn shutdown(self) -> Result<(), SchedulerError> {
        self.stop();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::SubscriberHandle;
    use crate::static_data::{InMemoryReferenceData, StaticPositionSource};
    use chrono::NaiveDate;
    use mtm_models::{OptionType, Position};
    use mtm_options::DistributionSampler;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Calls {
        positions: Arc<AtomicUsize>,
        resolves: Arc<AtomicUsize>,
        prices: Arc<Mutex<Vec<String>>>,
    }

    struct CountingPositions {
        inner: StaticPositionSource,
        calls: Calls,
    }

    impl PositionSource for CountingPositions {
        fn positions(&self, timestamp: NaiveDateTime) -> Result<Vec<Position>, ValuationError> {
            self.calls.positions.fetch_add(1, Ordering::SeqCst);
            self.inner.positions(timestamp)
        }
    }

    struct CountingResolver {
        inner: InMemoryReferenceData,
        calls: Calls,
    }

    impl ReferenceDataResolver for CountingResolver {
        fn resolve(&self, ticker: &str) -> Result<Instrument, ValuationError> {
            self.calls.resolves.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(ticker)
        }
    }

    struct FixedMarket {
        prices: HashMap<String, Decimal>,
        calls: Calls,
    }

    impl MarketPriceService for FixedMarket {
        fn price(&mut self, ticker: &str, _timestamp: NaiveDateTime) -> Result<Decimal, ValuationError> {
            self.calls.prices.lock().unwrap().push(ticker.to_string());
            self.prices
                .get(ticker)
                .copied()
                .ok_or_else(|| ValuationError::UnknownTicker(ticker.to_string()))
        }
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn pricer() -> OptionPricer {
        OptionPricer::new(Arc::new(DistributionSampler::seeded(10_000, 7).unwrap()))
    }

    fn rklb_call() -> EuropeanOption {
        EuropeanOption::new(
            "RKLB-JUN-2022-12-C",
            "RKLB",
            dec!(12),
            NaiveDate::from_ymd_opt(2022, 6, 17).unwrap(),
            OptionType::Call,
        )
        .unwrap()
    }

    fn reference_data() -> InMemoryReferenceData {
        let mut data = InMemoryReferenceData::new();
        data.insert(Equity::new("AAPL", 0.4, 0.2).unwrap());
        data.insert(Equity::new("TSLA", 0.2, 0.5).unwrap());
        data.insert(Equity::new("RKLB", 0.1, 0.8).unwrap());
        data.insert(rklb_call());
        data.insert(
            EuropeanOption::new(
                "RKLB-JAN-2021-12-P",
                "RKLB",
                dec!(12),
                NaiveDate::from_ymd_opt(2021, 1, 15).unwrap(),
                OptionType::Put,
            )
            .unwrap(),
        );
        data
    }

    fn scheduler(positions: Vec<Position>, fanout: SubscriberFanout, calls: &Calls) -> ValuationScheduler {
        let prices = [("AAPL", dec!(100)), ("TSLA", dec!(1000)), ("RKLB", dec!(10))]
            .into_iter()
            .map(|(t, p)| (t.to_string(), p))
            .collect();
        ValuationScheduler::new(
            SchedulerConfig::default(),
            Box::new(CountingPositions {
                inner: StaticPositionSource::new(positions),
                calls: calls.clone(),
            }),
            Box::new(CountingResolver {
                inner: reference_data(),
                calls: calls.clone(),
            }),
            Box::new(FixedMarket {
                prices,
                calls: calls.clone(),
            }),
            pricer(),
            fanout,
        )
    }

    fn portfolio() -> Vec<Position> {
        vec![
            Position::new("AAPL", -100),
            Position::new("TSLA", 15),
            Position::new("RKLB-JUN-2022-12-C", 10),
        ]
    }

    fn subscribe(fanout: &SubscriberFanout, label: &str) -> SubscriberHandle {
        fanout.register(label, 8).unwrap()
    }

    #[test]
    fn test_idle_cycle_calls_no_collaborator() {
        let calls = Calls::default();
        let mut scheduler = scheduler(portfolio(), SubscriberFanout::with_metrics(), &calls);

        assert!(scheduler.run_cycle(start()).unwrap().is_none());
        assert_eq!(calls.positions.load(Ordering::SeqCst), 0);
        assert_eq!(calls.resolves.load(Ordering::SeqCst), 0);
        assert!(calls.prices.lock().unwrap().is_empty());
    }

    #[test]
    fn test_portfolio_total_and_shared_snapshot() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        let mut first = subscribe(&fanout, "first");
        let mut second = subscribe(&fanout, "second");
        let mut scheduler = scheduler(portfolio(), fanout, &calls);

        let snapshot = scheduler.run_cycle(start()).unwrap().unwrap();

        let rklb = Equity::new("RKLB", 0.1, 0.8).unwrap();
        let option_price = pricer().price(&rklb_call(), &rklb, start().date(), dec!(10)).unwrap();
        let expected = dec!(-100) * dec!(100) + dec!(15) * dec!(1000) + dec!(10) * option_price;
        assert_eq!(snapshot.total_value(), expected);
        assert_eq!(snapshot.entry("RKLB-JUN-2022-12-C").unwrap().unit_price(), option_price);

        let tickers: Vec<&str> = snapshot.equity_prices().iter().map(|u| u.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "RKLB", "TSLA"]);

        let a = first.try_next().unwrap().unwrap();
        let b = second.try_next().unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &snapshot));
    }

    #[test]
    fn test_shared_underlying_priced_once() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        let _sub = subscribe(&fanout, "only");
        let positions = vec![
            Position::new("RKLB", 5),
            Position::new("RKLB-JUN-2022-12-C", 1),
            Position::new("RKLB", -2),
        ];
        let mut scheduler = scheduler(positions, fanout, &calls);

        scheduler.run_cycle(start()).unwrap().unwrap();
        assert_eq!(calls.prices.lock().unwrap().as_slice(), &["RKLB".to_string()]);

        // second cycle resolves nothing new
        let resolves = calls.resolves.load(Ordering::SeqCst);
        scheduler.run_cycle(start()).unwrap().unwrap();
        assert_eq!(calls.resolves.load(Ordering::SeqCst), resolves);
    }

    #[test]
    fn test_unknown_ticker_publishes_nothing() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        let mut sub = subscribe(&fanout, "only");
        let mut scheduler = scheduler(vec![Position::new("AAPL", 1), Position::new("NOPE", 1)], fanout, &calls);

        assert!(matches!(scheduler.run_cycle(start()), Err(ValuationError::UnknownTicker(_))));
        assert!(sub.try_next().unwrap().is_none());
    }

    #[test]
    fn test_matured_option_fails_cycle() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        let mut sub = subscribe(&fanout, "only");
        let mut scheduler = scheduler(vec![Position::new("RKLB-JAN-2021-12-P", 1)], fanout, &calls);

        assert!(matches!(scheduler.run_cycle(start()), Err(ValuationError::Matured { .. })));
        assert!(sub.try_next().unwrap().is_none());
    }

    #[test]
    fn test_empty_portfolio_publishes_zero_total() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        let _sub = subscribe(&fanout, "only");
        let mut scheduler = scheduler(Vec::new(), fanout, &calls);

        let snapshot = scheduler.run_cycle(start()).unwrap().unwrap();
        assert_eq!(snapshot.total_value(), Decimal::ZERO);
        assert!(snapshot.entries().is_empty());
    }

    #[tokio::test]
    async fn test_loop_advances_simulated_clock() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        let mut sub = subscribe(&fanout, "loop");
        let mut scheduler = scheduler(portfolio(), fanout, &calls);
        scheduler.config = SchedulerConfig {
            simulated_step: chrono::Duration::seconds(30),
            real_interval: Duration::from_millis(5),
        };

        let handle = scheduler.spawn(start());
        let mut timestamps = Vec::new();
        for _ in 0..3 {
            timestamps.push(sub.wait_for_next().await.unwrap().timestamp());
        }
        assert_eq!(handle.state(), SchedulerState::Running);
        handle.shutdown().await.unwrap();

        assert_eq!(
            timestamps,
            vec![
                start(),
                start() + chrono::Duration::seconds(30),
                start() + chrono::Duration::seconds(60)
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_request_stops_the_loop() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        let mut sub = subscribe(&fanout, "stopper");
        let mut scheduler = scheduler(portfolio(), fanout, &calls);
        scheduler.config.real_interval = Duration::from_millis(5);

        let handle = scheduler.spawn(start());
        sub.wait_for_next().await.unwrap();
        assert_eq!(handle.state(), SchedulerState::Running);

        handle.stop();
        let mut waited = Duration::ZERO;
        while handle.state() == SchedulerState::Running {
            assert!(waited < Duration::from_secs(5), "scheduler ignored the stop request");
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += Duration::from_millis(5);
        }
        assert_eq!(handle.state(), SchedulerState::Stopped);

        // nothing is produced once stopped
        while sub.try_next().unwrap().is_some() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sub.try_next().unwrap().is_none());
        handle.join().await.unwrap();
    }

    #[test]
    fn test_dropped_handles_count_as_idle() {
        let calls = Calls::default();
        let fanout = SubscriberFanout::with_metrics();
        drop(subscribe(&fanout, "gone"));
        let mut scheduler = scheduler(portfolio(), fanout, &calls);

        assert!(scheduler.run_cycle(start()).unwrap().is_none());
        assert_eq!(calls.positions.load(Ordering::SeqCst), 0);
    }

    struct PanickingPositions;

    impl PositionSource for PanickingPositions {
        fn positions(&self, _timestamp: NaiveDateTime) -> Result<Vec<Position>, ValuationError> {
            panic!("position store unavailable");
        }
    }

    #[tokio::test]
    async fn test_panicking_cycle_surfaces_as_terminated() {
        let fanout = SubscriberFanout::with_metrics();
        let _sub = subscribe(&fanout, "only");
        let calls = Calls::default();
        let mut scheduler = scheduler(Vec::new(), fanout, &calls);
        scheduler.positions = Box::new(PanickingPositions);

        let handle = scheduler.spawn(start());
        assert!(matches!(handle.join().await, Err(SchedulerError::Terminated(_))));
    }
}
