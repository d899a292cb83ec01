//! Processor module: run dispatch and per-run workers.
//!
//! The [`Processor`] owns the active [`RuleSet`](crate::rules::RuleSet) and
//! reacts to complete runs reported by a [`Collector`](crate::run::Collector).
//! Each matched run is processed by a [`SubProcessor`] on a spawned task,
//! bounded by a semaphore with one slot per run. Inside a run, data files are
//! processed concurrently, bounded by a second semaphore shared by all runs.
//!
//! # Example
//!
//! ```ignore
//! use rup_core::processor::{Processor, ProcessorConfig, WorkerContext};
//!
//! let ctx = WorkerContext::new(config, runtime, tracking, FileHasher::default())?
//!     .with_orphan_store(orphans);
//! let processor = Processor::new(ctx)?;
//! processor.set_rules(RuleSet::compile(&rule_configs)?);
//! processor.attach_collector(&collector);
//!
//! let status = processor.status();
//! println!("Active runs: {:?}", status.active_runs);
//! ```

mod config;
mod context;
mod dispatcher;
mod error;
mod subprocessor;
mod types;

pub use config::{ImagePullConfig, ProcessorConfig, PublishConfig, RetryConfig};
pub use context::WorkerContext;
pub use dispatcher::Processor;
pub use error::ProcessorError;
pub use subprocessor::SubProcessor;
pub use types::{
    FileFailure, FileStage, PoolStatus, ProcessorStatus, PublishOutcome, RunCompletionCallback,
    RunReport, RunStatus,
};
