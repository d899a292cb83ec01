//! Dependencies shared by every worker.

use globset::{Glob, GlobMatcher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::container::ContainerRuntime;
use crate::hashing::FileHasher;
use crate::orphans::OrphanStore;
use crate::placer::FsPlacer;
use crate::tracking::TrackingDatabase;

use super::config::ProcessorConfig;
use super::error::ProcessorError;
use super::types::PoolStats;

/// Everything a [`SubProcessor`](super::SubProcessor) needs besides its rule
/// and run. Built once and shared by all workers.
pub struct WorkerContext {
    pub(crate) config: ProcessorConfig,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) tracking: Arc<dyn TrackingDatabase>,
    pub(crate) hasher: FileHasher,
    pub(crate) placer: FsPlacer,
    pub(crate) orphan_store: Option<Arc<dyn OrphanStore>>,
    pub(crate) file_semaphore: Arc<Semaphore>,
    pub(crate) file_stats: PoolStats,
    unpacked_matcher: GlobMatcher,
}

impl WorkerContext {
    /// Creates the shared worker context.
    pub fn new(
        config: ProcessorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        tracking: Arc<dyn TrackingDatabase>,
        hasher: FileHasher,
    ) -> Result<Self, ProcessorError> {
        if config.max_parallel_files == 0 {
            return Err(ProcessorError::EmptyPool { pool: "files" });
        }

        let unpacked_matcher = Glob::new(&config.unpacked_pattern)
            .map_err(|e| ProcessorError::InvalidPattern {
                pattern: config.unpacked_pattern.clone(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        let placer = FsPlacer::new(hasher.clone(), config.conflict_dir.clone());
        let file_semaphore = Arc::new(Semaphore::new(config.max_parallel_files));

        Ok(Self {
            config,
            runtime,
            tracking,
            hasher,
            placer,
            orphan_store: None,
            file_semaphore,
            file_stats: PoolStats::default(),
            unpacked_matcher,
        })
    }

    /// Persists orphaned runs into the given store.
    pub fn with_orphan_store(mut self, store: Arc<dyn OrphanStore>) -> Self {
        self.orphan_store = Some(store);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Whether an unpacker output file is kept.
    pub fn is_unpacked_output(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.unpacked_matcher.is_match(name))
    }
}
