//! # Mark-to-Market Runner
//!
//! Application entry point for the periodic portfolio valuation service.
//!
//! ## Description
//! Orchestrates the service from a TOML configuration:
//! - **Reference Data**: Equities and European options, validated at startup.
//! - **Market Data**: Seeded Brownian-motion price simulator.
//! - **Valuation**: Scheduler task producing one snapshot per tick.
//! - **Consumer**: Logging subscriber reporting totals and equity updates.
//!
//! Shuts down on Ctrl-C or after `--cycles` snapshots.
//!
//! ## References
//! - IEEE Std 1016-2009: Software Design Descriptions

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mtm_core::observability::{init_metrics, init_tracing};
use mtm_core::{FanoutError, SubscriberFanout, SubscriberHandle, ValuationScheduler};
use mtm_options::{DistributionSampler, OptionPricer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::RunnerConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the service configuration
    #[arg(long, default_value = "configs/mtm.toml")]
    config: String,

    /// Stop after receiving this many snapshots (runs until Ctrl-C when absent)
    #[arg(long)]
    cycles: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log);

    let config = RunnerConfig::load(&args.config)?;
    if let Some(addr) = config.service.metrics_addr {
        init_metrics(addr).context("failed to install Prometheus exporter")?;
    }

    let seed = config.service.seed.unwrap_or_else(rand::random);
    info!("[RUNNER] loaded {} (seed {})", args.config, seed);

    let portfolio = config.portfolio(seed)?;
    let sampler = DistributionSampler::seeded(config.service.sample_count, seed.wrapping_add(1))
        .context("failed to build the distribution sampler")?;
    let pricer = OptionPricer::new(Arc::new(sampler)).with_risk_free_rate(config.service.risk_free_rate);

    let fanout = SubscriberFanout::with_metrics();
    let subscriber = fanout.register("runner-log", config.service.queue_capacity)?;

    let scheduler = ValuationScheduler::new(
        config.scheduler_config(),
        Box::new(portfolio.positions),
        Box::new(portfolio.reference),
        Box::new(portfolio.simulator),
        pricer,
        fanout,
    );
    let handle = scheduler.spawn(config.service.start);
    info!("[RUNNER] valuation service started at {}", config.service.start);

    let done = CancellationToken::new();
    let consumer = tokio::spawn(log_snapshots(subscriber, done.clone(), args.cycles));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("[RUNNER] Ctrl-C received, shutting down");
        }
        _ = done.cancelled() => {}
    }
    done.cancel();

    let received = consumer.await.context("snapshot consumer panicked")?;
    handle.shutdown().await?;
    info!("[RUNNER] stopped after {} snapshots", received);
    Ok(())
}

/// Logs every snapshot until cancelled or `limit` snapshots have been seen.
async fn log_snapshots(mut subscriber: SubscriberHandle, done: CancellationToken, limit: Option<u64>) -> u64 {
    let mut received = 0;
    loop {
        let snapshot = match subscriber.wait_for_next_or_cancel(&done).await {
            Ok(snapshot) => snapshot,
            Err(FanoutError::Cancelled(_)) => break,
            Err(e) => {
                warn!("[RUNNER] {}", e);
                break;
            }
        };
        received += 1;

        for update in snapshot.equity_prices() {
            info!("[RUNNER] {} {} = {}", snapshot.timestamp(), update.ticker, update.price);
        }
        info!(
            "[RUNNER] {} portfolio value {} over {} positions",
            snapshot.timestamp(),
            snapshot.total_value(),
            snapshot.entries().len()
        );

        if limit.is_some_and(|limit| received >= limit) {
            break;
        }
    }
    done.cancel();
    received
}
