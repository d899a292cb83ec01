//! HTTP control surface of the rup daemon.

pub mod api;
pub mod metrics;
pub mod state;
