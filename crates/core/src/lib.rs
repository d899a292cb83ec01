pub mod config;
pub mod container;
pub mod hashing;
pub mod metrics;
pub mod orphans;
pub mod placer;
pub mod processor;
pub mod rules;
pub mod run;
pub mod testing;
pub mod tracking;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    LoggingConfig, SanitizedConfig, ServerConfig,
};
pub use container::{
    ContainerConfig, ContainerError, ContainerOutput, ContainerRun, ContainerRuntime,
    DockerRuntime,
};
pub use hashing::{ContentHash, FileHasher, FileRecord, FileType};
pub use orphans::{OrphanError, OrphanStore, OrphanedRun, OrphansConfig, SqliteOrphanStore};
pub use placer::{FsPlacer, PlacementOutcome, PlacerError};
pub use processor::{
    Processor, ProcessorConfig, ProcessorError, ProcessorStatus, PublishOutcome, RunReport,
    RunStatus, WorkerContext,
};
pub use rules::{Rule, RuleConfig, RuleError, RuleSet, RunPaths};
pub use run::{Collector, MemoryCollector, Run, RunConfig, RunObserver, RunUpdate};
pub use tracking::{
    HttpTrackingClient, RunEntry, RunKey, TrackingConfig, TrackingDatabase, TrackingError,
};
