//! Oracle module - Multi-source floor price aggregation
//!
//! Collects collection floor prices from the configured marketplaces and
//! produces a single consensus price with a confidence score.

mod aggregator;
mod service;
pub mod sources;

pub use aggregator::{
    aggregate, confidence_for, median, relative_spread, spread_f64, SINGLE_SOURCE_CONFIDENCE,
    UNDEFINED_SPREAD_CONFIDENCE,
};
pub use service::{FetchRound, OracleService};
pub use sources::PriceSource;
