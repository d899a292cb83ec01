//! Runs and the collector that reports them.

mod collector;
mod types;

pub use collector::{Collector, MemoryCollector, RunObserver, RunUpdate};
pub use types::{Run, RunConfig};
