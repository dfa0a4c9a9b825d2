//! Consensus aggregation and trading recommendations.

pub mod aggregator;
pub mod recommend;

pub use aggregator::aggregate;
pub use recommend::{recommend, Thresholds};
