//! # Option Valuation Engine
//!
//! Monte-Carlo backed pricing of European options.
//!
//! ## Description
//! - **Sampler**: [`DistributionSampler`] pre-sorts standard-normal draws and estimates
//!   Φ(x) by rank lookup.
//! - **Pricing**: [`OptionPricer`] evaluates the Black-Scholes closed form with Φ taken
//!   from the sampler, in decimal arithmetic at a fixed internal precision.
//!
//! ## References
//! - IEEE Std 1016-2009: Software Design Descriptions
//! - Black, F., & Scholes, M. (1973). The Pricing of Options and Corporate Liabilities.

pub mod pricing;
pub mod sampler;

pub use pricing::{OptionPricer, DEFAULT_RISK_FREE_RATE};
pub use sampler::DistributionSampler;
