//! Collector seam and an in-process implementation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

use super::types::{Run, RunConfig};

/// Callback invoked with the current state of a run whenever it changes.
pub type RunObserver = Arc<dyn Fn(Run) + Send + Sync>;

/// Source of run updates.
///
/// A collector tracks runs as their files arrive and notifies observers on
/// every change. Completeness is decided by the run itself
/// ([`Run::is_complete`]); the collector only accumulates state.
pub trait Collector: Send + Sync {
    /// Registers an observer for run updates.
    fn add_observer(&self, observer: RunObserver);

    /// Stops tracking a run.
    fn remove_run(&self, run: u64);
}

/// An incremental report about a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunUpdate {
    /// Run number.
    pub run: u64,
    /// Newly arrived data files.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// The run's log file, if it has arrived.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Metadata keys to merge into the run's config.
    #[serde(default)]
    pub rup_config: Option<RunConfig>,
    /// Expected number of data files.
    #[serde(default)]
    pub n_nominal_files: Option<usize>,
}

/// Collector that keeps runs in memory and is fed explicit updates.
#[derive(Default)]
pub struct MemoryCollector {
    runs: Mutex<BTreeMap<u64, Run>>,
    observers: RwLock<Vec<RunObserver>>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an update into the tracked run and notifies observers.
    ///
    /// Returns the run's state after the merge.
    pub fn report(&self, update: RunUpdate) -> Run {
        let snapshot = {
            let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
            let run = runs.entry(update.run).or_insert_with(|| Run::new(update.run));

            for file in update.files {
                if !run.files.contains(&file) {
                    run.files.push(file);
                }
            }
            if let Some(log_file) = update.log_file {
                run.log_file = Some(log_file);
            }
            if let Some(config) = update.rup_config {
                run.rup_config.extend(config);
            }
            if let Some(nominal) = update.n_nominal_files {
                run.n_nominal_files = Some(nominal);
            }
            run.clone()
        };

        debug!(
            run = snapshot.run,
            files = snapshot.n_files(),
            nominal = ?snapshot.n_nominal_files,
            "Run updated"
        );

        // Observers may call back into remove_run, so the lock is released first.
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(snapshot.clone());
        }

        snapshot
    }

    /// Current state of a tracked run.
    pub fn get(&self, run: u64) -> Option<Run> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run)
            .cloned()
    }

    /// Run numbers currently tracked.
    pub fn tracked_runs(&self) -> Vec<u64> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

impl Collector for MemoryCollector {
    fn add_observer(&self, observer: RunObserver) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn remove_run(&self, run: u64) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_report_merges_updates() {
        let collector = MemoryCollector::new();

        collector.report(RunUpdate {
            run: 5,
            files: vec![PathBuf::from("/in/a.dat")],
            n_nominal_files: Some(2),
            ..Default::default()
        });
        let run = collector.report(RunUpdate {
            run: 5,
            files: vec![PathBuf::from("/in/a.dat"), PathBuf::from("/in/b.dat")],
            log_file: Some(PathBuf::from("/in/run5.log")),
            rup_config: Some([("experiment", "e"), ("facility", "f")].into_iter().collect()),
            ..Default::default()
        });

        assert_eq!(run.n_files(), 2);
        assert_eq!(run.n_nominal_files(), Some(2));
        assert!(run.is_complete());
        assert_eq!(collector.get(5), Some(run));
    }

    #[test]
    fn test_observers_notified_on_each_update() {
        let collector = MemoryCollector::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        collector.add_observer(Arc::new(move |_run| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        collector.report(RunUpdate {
            run: 1,
            ..Default::default()
        });
        collector.report(RunUpdate {
            run: 2,
            ..Default::default()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_may_remove_run() {
        let collector = Arc::new(MemoryCollector::new());
        let weak = Arc::downgrade(&collector);
        collector.add_observer(Arc::new(move |run: Run| {
            if let Some(c) = weak.upgrade() {
                c.remove_run(run.run);
            }
        }));

        collector.report(RunUpdate {
            run: 9,
            ..Default::default()
        });

        assert!(collector.get(9).is_none());
        assert!(collector.tracked_runs().is_empty());
    }
}
