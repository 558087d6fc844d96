//! Want pipeline instrumentation.
//!
//! [`Tracker`] timestamps each want as it moves through
//! want → find provider → found provider → connect → finish and aggregates
//! redundancy and variance across wants. [`DynamicAdjuster`] turns periodic
//! observations of hit ratio and request latency into a fan-out width: how
//! many providers to ask in parallel for one block.

mod adjuster;
mod args;
mod resolve;
mod tracker;

pub use adjuster::{DynamicAdjuster, FanoutAdjuster, Observation, Role};
pub use args::AdjusterArgs;
pub use resolve::ResolveTracker;
pub use tracker::{FTracker, LatencySummary, Tracker};
