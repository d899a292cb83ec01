//! Run dispatcher.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::rules::{Rule, RuleSet};
use crate::run::{Collector, Run};

use super::context::WorkerContext;
use super::error::ProcessorError;
use super::subprocessor::SubProcessor;
use super::types::{PoolStats, ProcessorStatus, RunCompletionCallback, RunReport, RunStatus};

/// Runs handed to a worker and not finished yet, with the latest update
/// that arrived for each of them meanwhile.
#[derive(Default)]
struct InFlight {
    runs: BTreeSet<u64>,
    deferred: HashMap<u64, Run>,
}

struct Shared {
    ctx: Arc<WorkerContext>,
    rules: RwLock<Arc<RuleSet>>,
    backlog: Mutex<Vec<Run>>,
    run_semaphore: Arc<Semaphore>,
    run_stats: PoolStats,
    active_runs: Mutex<BTreeSet<u64>>,
    in_flight: Mutex<InFlight>,
    dispatched: AtomicU64,
    orphaned: AtomicU64,
    on_complete: RwLock<Option<RunCompletionCallback>>,
}

/// Owns the active rule set, routes complete runs to workers and keeps runs
/// no rule matched until the rules change.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Processor {
    shared: Arc<Shared>,
}

impl Processor {
    /// Creates a processor with an empty rule set.
    pub fn new(ctx: WorkerContext) -> Result<Self, ProcessorError> {
        let max_runs = ctx.config.max_parallel_runs;
        if max_runs == 0 {
            return Err(ProcessorError::EmptyPool { pool: "runs" });
        }

        Ok(Self {
            shared: Arc::new(Shared {
                ctx: Arc::new(ctx),
                rules: RwLock::new(Arc::new(RuleSet::empty())),
                backlog: Mutex::new(Vec::new()),
                run_semaphore: Arc::new(Semaphore::new(max_runs)),
                run_stats: PoolStats::default(),
                active_runs: Mutex::new(BTreeSet::new()),
                in_flight: Mutex::new(InFlight::default()),
                dispatched: AtomicU64::new(0),
                orphaned: AtomicU64::new(0),
                on_complete: RwLock::new(None),
            }),
        })
    }

    /// Sets a callback invoked with the report of every finished run.
    pub fn on_run_complete(&self, callback: RunCompletionCallback) {
        *self
            .shared
            .on_complete
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Subscribes to a collector's run updates.
    ///
    /// Complete runs are removed from the collector and matched; incomplete
    /// runs are ignored until a later update completes them.
    pub fn attach_collector(&self, collector: &Arc<dyn Collector>) {
        let processor = self.clone();
        let weak: Weak<dyn Collector> = Arc::downgrade(collector);

        collector.add_observer(Arc::new(move |run: Run| {
            if !run.is_complete() {
                debug!(
                    run = run.run,
                    files = run.n_files(),
                    nominal = ?run.n_nominal_files(),
                    has_log = run.log_file.is_some(),
                    "Run not complete yet"
                );
                return;
            }
            if let Some(collector) = weak.upgrade() {
                collector.remove_run(run.run);
            }
            processor.try_process(run);
        }));
    }

    /// Handles one run report. Exposed for callers that feed runs directly.
    pub fn handle_run_update(&self, run: Run) {
        if run.is_complete() {
            self.try_process(run);
        }
    }

    /// Matches a run against the current rules and dispatches it, or queues
    /// it to the backlog when nothing matches.
    pub fn try_process(&self, run: Run) {
        let matched = {
            // Matching under the backlog lock orders this against set_rules.
            let mut backlog = self.lock_backlog();
            let rules = self.rules();
            match rules.first_match(&run.rup_config) {
                Some(rule) => Some(Arc::clone(rule)),
                None => {
                    info!(run = run.run, rules = rules.len(), "No rule matched run, queued to backlog");
                    metrics::RUNS_UNMATCHED.inc();
                    backlog.retain(|queued| queued.run != run.run);
                    backlog.push(run.clone());
                    None
                }
            }
        };

        if let Some(rule) = matched {
            self.dispatch(rule, run);
        }
    }

    /// Replaces the rule set and re-matches the backlog. Returns how many
    /// backlogged runs were dispatched.
    pub fn set_rules(&self, rules: RuleSet) -> usize {
        let rules = Arc::new(rules);

        let drained = {
            let mut backlog = self.lock_backlog();
            *self
                .shared
                .rules
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&rules);

            let mut drained = Vec::new();
            let mut remaining = Vec::with_capacity(backlog.len());
            for run in backlog.drain(..) {
                match rules.first_match(&run.rup_config) {
                    Some(rule) => drained.push((Arc::clone(rule), run)),
                    None => remaining.push(run),
                }
            }
            *backlog = remaining;
            drained
        };

        info!(
            rules = rules.len(),
            drained = drained.len(),
            "Replaced rule set"
        );

        let count = drained.len();
        for (rule, run) in drained {
            self.dispatch(rule, run);
        }
        count
    }

    /// Snapshot of the active rule set.
    pub fn rules(&self) -> Arc<RuleSet> {
        Arc::clone(
            &self
                .shared
                .rules
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Runs waiting for a matching rule, oldest first.
    pub fn backlog(&self) -> Vec<Run> {
        self.lock_backlog().clone()
    }

    pub fn context(&self) -> &WorkerContext {
        &self.shared.ctx
    }

    /// Returns the current processor status.
    pub fn status(&self) -> ProcessorStatus {
        let shared = &self.shared;
        let config = &shared.ctx.config;

        ProcessorStatus {
            run_pool: shared.run_stats.to_status("runs", config.max_parallel_runs),
            file_pool: shared
                .ctx
                .file_stats
                .to_status("files", config.max_parallel_files),
            active_runs: shared
                .active_runs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .copied()
                .collect(),
            backlog_len: self.lock_backlog().len(),
            rule_count: self.rules().len(),
            total_dispatched: shared.dispatched.load(Ordering::Relaxed),
            total_orphaned: shared.orphaned.load(Ordering::Relaxed),
        }
    }

    fn lock_backlog(&self) -> std::sync::MutexGuard<'_, Vec<Run>> {
        self.shared
            .backlog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(shared: &Shared) -> std::sync::MutexGuard<'_, InFlight> {
        shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands a matched run to a worker task. Fire-and-forget.
    ///
    /// A run already held by a worker is not dispatched twice; its latest
    /// update is matched again once that worker finishes.
    fn dispatch(&self, rule: Arc<Rule>, run: Run) {
        let run_number = run.run;
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(run = run_number, error = %e, "No async runtime available, cannot dispatch run");
                self.shared
                    .run_stats
                    .total_failed
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        {
            let mut in_flight = Self::lock_in_flight(&self.shared);
            if !in_flight.runs.insert(run_number) {
                info!(run = run_number, "Run already being processed, deferring update");
                in_flight.deferred.insert(run_number, run);
                return;
            }
        }

        info!(run = run_number, rule = %rule.name(), image = %rule.image(), "Dispatching run");
        metrics::RUNS_DISPATCHED
            .with_label_values(&[rule.name()])
            .inc();
        self.shared.dispatched.fetch_add(1, Ordering::Relaxed);
        self.shared.run_stats.queued.fetch_add(1, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        handle.spawn(async move {
            let permit = shared.run_semaphore.clone().acquire_owned().await;
            shared.run_stats.queued.fetch_sub(1, Ordering::Relaxed);
            let Ok(permit) = permit else {
                warn!(run = run_number, "Run pool closed, dropping run");
                Self::lock_in_flight(&shared).runs.remove(&run_number);
                shared.run_stats.total_failed.fetch_add(1, Ordering::Relaxed);
                return;
            };

            shared.run_stats.active.fetch_add(1, Ordering::Relaxed);
            shared
                .active_runs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(run_number);

            let report = SubProcessor::new(rule, run, Arc::clone(&shared.ctx))
                .process()
                .await;

            shared
                .active_runs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&run_number);
            shared.run_stats.active.fetch_sub(1, Ordering::Relaxed);
            drop(permit);

            let deferred = {
                let mut in_flight = Self::lock_in_flight(&shared);
                in_flight.runs.remove(&run_number);
                in_flight.deferred.remove(&run_number)
            };
            if let Some(run) = deferred {
                debug!(run = run_number, "Processing deferred update");
                Processor {
                    shared: Arc::clone(&shared),
                }
                .try_process(run);
            }

            Self::record_completion(&shared, &report);
        });
    }

    fn record_completion(shared: &Shared, report: &RunReport) {
        match report.status {
            RunStatus::Completed => {
                shared.run_stats.total_processed.fetch_add(1, Ordering::Relaxed);
            }
            RunStatus::Orphaned => {
                shared.run_stats.total_processed.fetch_add(1, Ordering::Relaxed);
                shared.orphaned.fetch_add(1, Ordering::Relaxed);
            }
            RunStatus::Failed => {
                shared.run_stats.total_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let callback = shared
            .on_complete
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(report);
        }
    }
}
