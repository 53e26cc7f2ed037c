//! Runner configuration schema and its validation into domain types.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use mtm_core::{EquityPriceSimulator, InMemoryReferenceData, SchedulerConfig, StaticPositionSource};
use mtm_models::{Equity, EuropeanOption, OptionType, Position};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Root configuration schema for the valuation runner.
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    pub service: ServiceInfo,
    #[serde(default)]
    pub equities: Vec<EquityInfo>,
    #[serde(default)]
    pub options: Vec<OptionInfo>,
    #[serde(default)]
    pub positions: Vec<PositionInfo>,
}

/// Timing, queueing and pricing settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceInfo {
    pub start: NaiveDateTime,
    #[serde(default = "default_simulated_step_ms")]
    pub simulated_step_ms: i64,
    #[serde(default = "default_real_interval_ms")]
    pub real_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// Seed for the price simulator and the CDF sampler; random when absent.
    pub seed: Option<u64>,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EquityInfo {
    pub ticker: String,
    pub expected_return: f64,
    pub std_dev: f64,
    pub initial_price: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OptionInfo {
    pub ticker: String,
    pub underlying: String,
    pub strike: Decimal,
    pub maturity: NaiveDate,
    pub kind: OptionType,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PositionInfo {
    pub ticker: String,
    pub quantity: i64,
}

fn default_simulated_step_ms() -> i64 {
    2_000
}

fn default_real_interval_ms() -> u64 {
    2_000
}

fn default_queue_capacity() -> usize {
    10
}

fn default_sample_count() -> usize {
    10_000
}

fn default_risk_free_rate() -> f64 {
    mtm_options::DEFAULT_RISK_FREE_RATE
}

/// Validated collaborators built from a [`RunnerConfig`].
pub struct Portfolio {
    pub reference: InMemoryReferenceData,
    pub simulator: EquityPriceSimulator,
    pub positions: StaticPositionSource,
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: RunnerConfig = toml::from_str(raw).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.service.simulated_step_ms < 0 {
            bail!("simulated_step_ms must not be negative, got {}", self.service.simulated_step_ms);
        }
        if self.service.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }

        let equities: HashSet<&str> = self.equities.iter().map(|e| e.ticker.as_str()).collect();
        let mut known = equities.clone();
        for option in &self.options {
            if !equities.contains(option.underlying.as_str()) {
                bail!("option {} is written on unconfigured equity {}", option.ticker, option.underlying);
            }
            if !known.insert(option.ticker.as_str()) {
                bail!("ticker {} is configured twice", option.ticker);
            }
        }
        if known.len() != self.equities.len() + self.options.len() {
            bail!("equity tickers must be unique");
        }
        for position in &self.positions {
            if !known.contains(position.ticker.as_str()) {
                bail!("position in {} has no configured instrument", position.ticker);
            }
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            simulated_step: chrono::Duration::milliseconds(self.service.simulated_step_ms),
            real_interval: Duration::from_millis(self.service.real_interval_ms),
        }
    }

    /// Builds reference data, the seeded simulator and the position list.
    pub fn portfolio(&self, seed: u64) -> Result<Portfolio> {
        let mut reference = InMemoryReferenceData::new();
        let mut simulator = EquityPriceSimulator::seeded(seed);

        for info in &self.equities {
            let equity = Equity::new(info.ticker.as_str(), info.expected_return, info.std_dev)
                .with_context(|| format!("invalid equity {}", info.ticker))?;
            simulator
                .insert(equity.clone(), info.initial_price, self.service.start)
                .with_context(|| format!("invalid initial price for {}", info.ticker))?;
            reference.insert(equity);
        }
        for info in &self.options {
            let option = EuropeanOption::new(
                info.ticker.as_str(),
                info.underlying.as_str(),
                info.strike,
                info.maturity,
                info.kind,
            )
            .with_context(|| format!("invalid option {}", info.ticker))?;
            reference.insert(option);
        }

        let positions = self
            .positions
            .iter()
            .map(|p| Position::new(p.ticker.as_str(), p.quantity))
            .collect();

        Ok(Portfolio {
            reference,
            simulator,
            positions: StaticPositionSource::new(positions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED: &str = include_str!("../../../configs/mtm.toml");

    #[test]
    fn test_shipped_config_is_valid() {
        let config = RunnerConfig::parse(SHIPPED).unwrap();
        assert_eq!(config.equities.len(), 4);
        assert_eq!(config.options.len(), 3);
        assert_eq!(config.service.queue_capacity, 10);

        let portfolio = config.portfolio(1).unwrap();
        assert_eq!(portfolio.reference.len(), 7);
        assert_eq!(portfolio.simulator.last_price("RKLB"), Some((Decimal::from(12), config.service.start)));
    }

    #[test]
    fn test_defaults_apply() {
        let config = RunnerConfig::parse("[service]\nstart = \"2022-01-01T00:00:00\"\n").unwrap();
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
        assert!(config.service.seed.is_none());
        assert!(config.positions.is_empty());
    }

    #[test]
    fn test_unknown_underlying_rejected() {
        let raw = r#"
            [service]
            start = "2022-01-01T00:00:00"

            [[options]]
            ticker = "RKLB-JUN-2022-16-P"
            underlying = "RKLB"
            strike = "16"
            maturity = "2022-06-17"
            kind = "put"
        "#;
        assert!(RunnerConfig::parse(raw).is_err());
    }

    #[test]
    fn test_unknown_position_rejected() {
        let raw = r#"
            [service]
            start = "2022-01-01T00:00:00"

            [[positions]]
            ticker = "AAPL"
            quantity = 10
        "#;
        assert!(RunnerConfig::parse(raw).is_err());
    }

    #[test]
    fn test_out_of_range_equity_fails_at_build() {
        let raw = r#"
            [service]
            start = "2022-01-01T00:00:00"

            [[equities]]
            ticker = "AAPL"
            expected_return = 1.5
            std_dev = 0.2
            initial_price = "180"
        "#;
        let config = RunnerConfig::parse(raw).unwrap();
        assert!(config.portfolio(1).is_err());
    }
}
