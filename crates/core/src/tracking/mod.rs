//! Tracking database the processed files are registered with.
//!
//! A run is looked up by run number, experiment and facility. Lookups may
//! legitimately miss while an upstream step has not registered the run yet,
//! so callers treat `Ok(None)` as "not visible yet" rather than "absent".

mod config;
mod error;
mod http;
mod traits;
mod types;

pub use config::TrackingConfig;
pub use error::TrackingError;
pub use http::HttpTrackingClient;
pub use traits::TrackingDatabase;
pub use types::{RunEntry, RunKey};
