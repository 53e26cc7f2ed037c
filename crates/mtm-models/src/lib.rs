//! # Valuation Domain Models
//!
//! Shared vocabulary of the mtm valuation service.
//!
//! ## Description
//! Defines the immutable value types that flow through the valuation pipeline:
//! - **Instruments**: tagged [`Instrument`] variant over [`Equity`] and [`EuropeanOption`].
//! - **Positions**: signed holdings per ticker.
//! - **Snapshots**: fully priced portfolio views published once per cycle.
//! - **Precision**: the two decimal contexts used for internal and reported prices.
//!
//! These types sit at the bottom of the layering (models → options → core) so the
//! pricing and scheduling crates share one error taxonomy.
//!
//! ## References
//! - IEEE Std 1016-2009: Software Design Descriptions

pub mod error;
pub mod instrument;
pub mod position;
pub mod precision;
pub mod snapshot;

pub use error::ValuationError;
pub use instrument::{Equity, EuropeanOption, Instrument, OptionType};
pub use position::Position;
pub use snapshot::{EquityPriceUpdate, Snapshot, SnapshotEntry};
