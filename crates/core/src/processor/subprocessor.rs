//! Per-run worker.
//!
//! A worker takes one run and the rule it matched through a fixed sequence:
//!
//! 1. create the raw, unpacked and log directories
//! 2. make sure the rule's unpacking image is available locally
//! 3. move the log file into the log directory
//! 4. for every data file, concurrently: stage a copy, move the original into
//!    the raw directory, unpack the copy and keep the matching outputs
//! 5. attach every produced record to the run's tracking database entry
//!
//! Failures of single files are recorded in the report and never abort the
//! run.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::container::{ContainerError, ContainerRun};
use crate::hashing::{FileRecord, FileType};
use crate::metrics;
use crate::orphans::OrphanedRun;
use crate::placer::PlacementOutcome;
use crate::rules::{Rule, RunPaths};
use crate::run::Run;
use crate::tracking::RunKey;

use super::context::WorkerContext;
use super::error::ProcessorError;
use super::types::{FileFailure, FileStage, PublishOutcome, RunReport, RunStatus};

/// Records and failures produced by one data file.
#[derive(Default)]
struct FileOutcome {
    records: Vec<FileRecord>,
    failures: Vec<FileFailure>,
}

impl FileOutcome {
    fn fail(&mut self, file: &Path, stage: FileStage, error: impl ToString) {
        self.failures.push(FileFailure {
            file: file.to_path_buf(),
            stage,
            error: error.to_string(),
        });
    }
}

/// Processes one matched run.
pub struct SubProcessor {
    rule: Arc<Rule>,
    run: Run,
    ctx: Arc<WorkerContext>,
}

impl SubProcessor {
    pub fn new(rule: Arc<Rule>, run: Run, ctx: Arc<WorkerContext>) -> Self {
        Self { rule, run, ctx }
    }

    /// Runs every step and reports what happened.
    pub async fn process(self) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::new(self.run.run, self.rule.name());

        info!(
            run = self.run.run,
            rule = %self.rule.name(),
            files = self.run.n_files(),
            "Processing run"
        );

        match self.process_inner(&mut report).await {
            Ok(()) => {
                report.status = match report.publish {
                    PublishOutcome::Orphaned { .. } => RunStatus::Orphaned,
                    _ => RunStatus::Completed,
                };
            }
            Err(e) => {
                error!(run = self.run.run, rule = %self.rule.name(), error = %e, "Run failed");
                report.status = RunStatus::Failed;
                report.error = Some(e.to_string());
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        metrics::RUN_DURATION
            .with_label_values(&[report.status.as_str()])
            .observe(start.elapsed().as_secs_f64());

        info!(
            run = report.run,
            status = report.status.as_str(),
            records = report.records.len(),
            failures = report.file_failures.len(),
            duration_ms = report.duration_ms,
            "Finished run"
        );

        report
    }

    async fn process_inner(&self, report: &mut RunReport) -> Result<(), ProcessorError> {
        let experiment = self.run.rup_config.experiment()?.to_string();
        let facility = self.run.rup_config.facility()?.to_string();
        let paths = self.rule.paths_for(&self.run.rup_config)?;

        Self::prepare_directories(&paths).await?;

        report.image_ready = self.acquire_image().await;

        if let Some(log_file) = &self.run.log_file {
            match self.place_and_record(log_file, &paths.log, FileType::Log).await {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    error!(run = self.run.run, file = %log_file.display(), error = %e, "Failed to handle log file");
                    report.file_failures.push(FileFailure {
                        file: log_file.clone(),
                        stage: FileStage::Log,
                        error: e,
                    });
                }
            }
        }

        let staging_root = self
            .ctx
            .config
            .temp_dir
            .join(format!("run{}-{}", self.run.run, Uuid::new_v4()));

        let unpack = report.image_ready;
        let jobs = self.run.files.iter().enumerate().map(|(idx, file)| {
            self.process_file(file, staging_root.join(idx.to_string()), &paths, unpack)
        });
        for outcome in futures::future::join_all(jobs).await {
            report.records.extend(outcome.records);
            report.file_failures.extend(outcome.failures);
        }

        if let Err(e) = fs::remove_dir_all(&staging_root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %staging_root.display(), error = %e, "Failed to remove staging directory");
            }
        }

        let key = RunKey::new(self.run.run, experiment, facility);
        report.publish = self.publish(&key, &report.records).await;

        Ok(())
    }

    async fn prepare_directories(paths: &RunPaths) -> Result<(), ProcessorError> {
        for dir in [&paths.raw, &paths.unpacked, &paths.log] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| ProcessorError::Directory {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Makes the rule's image available locally. Returns whether it is.
    async fn acquire_image(&self) -> bool {
        let image = self.rule.image();
        let runtime = &self.ctx.runtime;

        match runtime.image_exists(image).await {
            Ok(true) => {
                debug!(image = %image, "Image present locally");
                metrics::IMAGE_PULLS.with_label_values(&["cached"]).inc();
                return true;
            }
            Ok(false) => {}
            Err(e) => warn!(image = %image, error = %e, "Failed to inspect local image, pulling"),
        }

        let policy = &self.ctx.config.image_pull;
        let mut attempts = 0u32;
        let mut not_found = 0u32;

        loop {
            attempts += 1;
            let err = match runtime.pull_image(image).await {
                Ok(()) => {
                    info!(image = %image, attempts, "Pulled image");
                    metrics::IMAGE_PULLS.with_label_values(&["pulled"]).inc();
                    return true;
                }
                Err(e) => e,
            };

            if err.is_not_found() {
                not_found += 1;
            }
            if Self::pull_exhausted(&err, attempts, not_found, policy.retry.max_attempts, policy.not_found_attempts) {
                error!(
                    run = self.run.run,
                    image = %image,
                    attempts,
                    error = %err,
                    "Giving up on image, data files will not be unpacked"
                );
                metrics::IMAGE_PULLS.with_label_values(&["failed"]).inc();
                return false;
            }

            let delay = policy.retry.delay_for(attempts - 1);
            warn!(
                image = %image,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Image pull failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn pull_exhausted(
        err: &ContainerError,
        attempts: u32,
        not_found: u32,
        max_attempts: u32,
        not_found_attempts: u32,
    ) -> bool {
        !err.is_retryable()
            || attempts >= max_attempts
            || (err.is_not_found() && not_found >= not_found_attempts)
    }

    /// Places `source` into `dest_dir` and records the resulting file.
    async fn place_and_record(
        &self,
        source: &Path,
        dest_dir: &Path,
        file_type: FileType,
    ) -> Result<FileRecord, String> {
        let outcome = self
            .ctx
            .placer
            .place(source, dest_dir)
            .await
            .map_err(|e| e.to_string())?;
        metrics::PLACEMENTS
            .with_label_values(&[outcome.kind()])
            .inc();

        if let PlacementOutcome::KeptExisting { path, .. } = &outcome {
            debug!(path = %path.display(), "Registering existing destination after collision");
        }

        // Hash after the move: the registered file is whatever ended up at the destination.
        let record = self
            .ctx
            .hasher
            .record(&self.ctx.config.host, outcome.path(), file_type)
            .await
            .map_err(|e| e.to_string())?;
        metrics::FILES_REGISTERED
            .with_label_values(&[file_type.as_str()])
            .inc();

        Ok(record)
    }

    async fn process_file(
        &self,
        file: &Path,
        staging: PathBuf,
        paths: &RunPaths,
        unpack: bool,
    ) -> FileOutcome {
        let stats = &self.ctx.file_stats;
        stats.queued.fetch_add(1, Ordering::Relaxed);
        let permit = self.ctx.file_semaphore.acquire().await;
        stats.queued.fetch_sub(1, Ordering::Relaxed);

        let mut outcome = FileOutcome::default();
        if permit.is_err() {
            outcome.fail(file, FileStage::Stage, "file pool closed");
            return outcome;
        }

        stats.active.fetch_add(1, Ordering::Relaxed);
        self.process_file_inner(file, &staging, paths, unpack, &mut outcome)
            .await;
        stats.active.fetch_sub(1, Ordering::Relaxed);

        if outcome.failures.is_empty() {
            stats.total_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.total_failed.fetch_add(1, Ordering::Relaxed);
            metrics::UNPACK_FAILURES.inc();
        }

        if let Err(e) = fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %staging.display(), error = %e, "Failed to clean staging");
            }
        }

        outcome
    }

    async fn process_file_inner(
        &self,
        file: &Path,
        staging: &Path,
        paths: &RunPaths,
        unpack: bool,
        outcome: &mut FileOutcome,
    ) {
        let Some(name) = file.file_name() else {
            outcome.fail(file, FileStage::Stage, "path has no file name");
            return;
        };

        let input_dir = staging.join("input");
        let output_dir = staging.join("output");

        // The unpacker reads a copy; the original moves into the raw directory.
        let staged = if unpack {
            let staged = input_dir.join(name);
            let staged_ok = async {
                fs::create_dir_all(&input_dir).await?;
                fs::create_dir_all(&output_dir).await?;
                fs::copy(file, &staged).await
            }
            .await;
            if let Err(e) = staged_ok {
                error!(file = %file.display(), error = %e, "Failed to stage data file");
                outcome.fail(file, FileStage::Stage, e);
                return;
            }
            Some(staged)
        } else {
            None
        };

        match self.place_and_record(file, &paths.raw, FileType::Raw).await {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                error!(file = %file.display(), error = %e, "Failed to move data file into raw directory");
                outcome.fail(file, FileStage::Raw, e);
            }
        }

        let Some(staged) = staged else {
            return;
        };

        let job = ContainerRun {
            image: self.rule.image().to_string(),
            input: staged,
            output_dir: output_dir.clone(),
        };
        match self.ctx.runtime.run(job).await {
            Ok(result) => {
                debug!(file = %file.display(), duration_ms = result.duration_ms, "Unpacked data file");
            }
            Err(e) => {
                if let ContainerError::RunFailed { logs, .. } = &e {
                    debug!(file = %file.display(), logs = %logs, "Unpacker output");
                }
                error!(file = %file.display(), error = %e, "Failed to unpack data file");
                outcome.fail(file, FileStage::Unpack, e);
                return;
            }
        }

        self.collect_outputs(file, &output_dir, &paths.unpacked, outcome)
            .await;
    }

    /// Keeps matching unpacker outputs and deletes everything else.
    async fn collect_outputs(
        &self,
        file: &Path,
        output_dir: &Path,
        unpacked_dir: &Path,
        outcome: &mut FileOutcome,
    ) {
        let mut entries = match fs::read_dir(output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                outcome.fail(file, FileStage::Output, e);
                return;
            }
        };

        let mut kept = 0usize;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    outcome.fail(file, FileStage::Output, e);
                    break;
                }
            };
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);

            if is_file && self.ctx.is_unpacked_output(&path) {
                match self.place_and_record(&path, unpacked_dir, FileType::Unpacked).await {
                    Ok(record) => {
                        kept += 1;
                        outcome.records.push(record);
                    }
                    Err(e) => {
                        error!(output = %path.display(), error = %e, "Failed to move unpacked file");
                        outcome.fail(&path, FileStage::Output, e);
                    }
                }
                continue;
            }

            let removed = if is_file {
                fs::remove_file(&path).await
            } else {
                fs::remove_dir_all(&path).await
            };
            match removed {
                Ok(()) => debug!(output = %path.display(), "Discarded unpacker output"),
                Err(e) => debug!(output = %path.display(), error = %e, "Failed to discard unpacker output"),
            }
        }

        if kept == 0 {
            warn!(
                run = self.run.run,
                file = %file.display(),
                pattern = %self.ctx.config.unpacked_pattern,
                "Unpacker produced no matching output, check the unpacking image"
            );
            metrics::UNPACK_EMPTY.inc();
        }
    }

    /// Attaches the records to the run entry, waiting for it to appear.
    async fn publish(&self, key: &RunKey, records: &[FileRecord]) -> PublishOutcome {
        if records.is_empty() {
            info!(run = key.run_number, "No records to publish");
            metrics::PUBLISH_TOTAL.with_label_values(&["skipped"]).inc();
            return PublishOutcome::Skipped;
        }

        let policy = &self.ctx.config.publish;
        let tracking = &self.ctx.tracking;
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let last_error = match tracking.find_run(key).await {
                Ok(Some(entry)) => match tracking.add_files(&entry.run_id, records).await {
                    Ok(()) => {
                        info!(
                            run = key.run_number,
                            run_id = %entry.run_id,
                            files = records.len(),
                            "Published records"
                        );
                        metrics::PUBLISH_TOTAL.with_label_values(&["published"]).inc();
                        return PublishOutcome::Published {
                            run_id: entry.run_id,
                            files: records.len(),
                        };
                    }
                    Err(e) if e.is_retryable() => e.to_string(),
                    Err(e) => return self.orphan(key, records, e.to_string()),
                },
                Ok(None) => format!("{} not found in tracking database", key),
                Err(e) if e.is_retryable() => e.to_string(),
                Err(e) => return self.orphan(key, records, e.to_string()),
            };

            let delay = policy.delay_for(attempt);
            attempt += 1;
            if started.elapsed() + delay > policy.max_elapsed() {
                let reason = format!(
                    "gave up after {} attempts in {}ms: {}",
                    attempt,
                    started.elapsed().as_millis(),
                    last_error
                );
                return self.orphan(key, records, reason);
            }

            metrics::PUBLISH_RETRIES.inc();
            warn!(
                run = key.run_number,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %last_error,
                "Run entry not available yet, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn orphan(&self, key: &RunKey, records: &[FileRecord], reason: String) -> PublishOutcome {
        metrics::PUBLISH_TOTAL.with_label_values(&["orphaned"]).inc();

        let orphan_id = self.ctx.orphan_store.as_ref().and_then(|store| {
            let orphan = OrphanedRun::new(
                key.run_number,
                key.experiment.clone(),
                key.facility.clone(),
                reason.clone(),
                records.to_vec(),
            );
            match store.insert(&orphan) {
                Ok(id) => Some(id),
                Err(e) => {
                    error!(run = key.run_number, error = %e, "Failed to persist orphaned run");
                    None
                }
            }
        });

        error!(
            run = key.run_number,
            experiment = %key.experiment,
            facility = %key.facility,
            files = records.len(),
            orphan_id = ?orphan_id,
            reason = %reason,
            "Run orphaned, records were not attached to the tracking database"
        );

        PublishOutcome::Orphaned { reason, orphan_id }
    }
}
