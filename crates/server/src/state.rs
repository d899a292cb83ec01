use std::sync::Arc;

use rup_core::{Config, MemoryCollector, OrphanStore, Processor, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    processor: Processor,
    collector: Arc<MemoryCollector>,
    orphans: Option<Arc<dyn OrphanStore>>,
}

impl AppState {
    pub fn new(
        config: Config,
        processor: Processor,
        collector: Arc<MemoryCollector>,
        orphans: Option<Arc<dyn OrphanStore>>,
    ) -> Self {
        Self {
            config,
            processor,
            collector,
            orphans,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Collector fed by the run ingest endpoint.
    pub fn collector(&self) -> &MemoryCollector {
        &self.collector
    }

    /// Orphan store, if orphans are persisted.
    pub fn orphans(&self) -> Option<&Arc<dyn OrphanStore>> {
        self.orphans.as_ref()
    }
}
