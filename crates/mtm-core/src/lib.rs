//! # Valuation Core
//!
//! Periodic portfolio revaluation with multi-subscriber fan-out.
//!
//! ## Description
//! Ties the pricing primitives together into a running service:
//! - **Collaborators**: traits for position, reference data and market price sources,
//!   plus in-memory implementations.
//! - **Reference Cache**: resolves each ticker at most once per service lifetime.
//! - **Price Simulator**: Brownian-motion equity prices over simulated time.
//! - **Scheduler**: single writer that values the portfolio once per tick.
//! - **Fan-out**: one bounded queue per subscriber, drop-newest when full.
//!
//! ## Concurrency
//! The scheduler task is the only writer of simulator and cache state. Subscribers
//! share nothing but `Arc<Snapshot>` values.
//!
//! ## References
//! - IEEE Std 1016-2009: Software Design Descriptions

pub mod fanout;
pub mod observability;
pub mod reference;
pub mod scheduler;
pub mod services;
pub mod simulator;
pub mod static_data;

pub use fanout::{FanoutError, PublishReport, SubscriberFanout, SubscriberHandle, SubscriberId};
pub use observability::MetricsDropSink;
pub use reference::CachingReferenceData;
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerHandle, SchedulerState, ValuationScheduler};
pub use services::{MarketPriceService, ObservabilitySink, PositionSource, ReferenceDataResolver};
pub use simulator::EquityPriceSimulator;
pub use static_data::{InMemoryReferenceData, StaticPositionSource};
