//! # Service Observability
//!
//! Logging and metrics wiring for the valuation service.
//!
//! ## Description
//! - **Structured Logging**: `tracing` events with a `[COMPONENT]` prefix, filtered
//!   through `RUST_LOG` when set.
//! - **Metrics**: `metrics` counters and gauges, optionally exported over HTTP by the
//!   Prometheus recorder.
//! - **Drop Reporting**: [`MetricsDropSink`] turns fan-out drops into a per-subscriber
//!   counter.
//!
//! ## References
//! - Prometheus Monitoring Guide

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::fanout::SubscriberId;
use crate::services::ObservabilitySink;

/// Counter of completed valuation cycles, labelled `result = ok | error`.
pub const CYCLES_TOTAL: &str = "mtm_cycles_total";
/// Counter of snapshots dropped on full subscriber queues, labelled `subscriber`.
pub const SNAPSHOT_DROPS_TOTAL: &str = "mtm_snapshot_drops_total";
/// Gauge holding the most recent portfolio total.
pub const PORTFOLIO_VALUE: &str = "mtm_portfolio_value";

/// Installs the global fmt subscriber.
///
/// # Parameters
/// * `default_filter` - Directive used when `RUST_LOG` is unset (e.g. `"info"`).
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // a second install in the same process (tests) is not an error worth surfacing
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Initializes the Prometheus metrics exporter on the specified socket.
///
/// # Parameters
/// * `addr` - The network address to bind the HTTP metrics endpoint to.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!("[METRICS] Prometheus exporter listening on {}", addr);
    Ok(())
}

/// Reports drops as a warning and a `mtm_snapshot_drops_total` increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsDropSink;

impl ObservabilitySink for MetricsDropSink {
    fn record_drop(&self, subscriber: SubscriberId, label: &str) {
        warn!("[FANOUT] queue full for {} ({}), snapshot dropped", subscriber, label);
        counter!(SNAPSHOT_DROPS_TOTAL, "subscriber" => label.to_string()).increment(1);
    }
}
