//! # Batch Scheduler
//!
//! Orchestratore del batch: distribuisce i job su un pool a concorrenza
//! limitata e raccoglie i risultati da un'unica coda.
//!
//! ## Flusso:
//! 1. Verifica le precondizioni (lista non vuota, root di output creabile)
//! 2. Avvia un task tokio per file, limitato da un `Semaphore`
//! 3. Drena la coda dei risultati con timeout, emettendo heartbeat se tutto tace
//! 4. Dopo ogni risultato: riga di log del file e percentuale di avanzamento
//! 5. Riepilogo finale ed evento `Finished`

use crate::config::{CompressionOptions, FormatFilter};
use crate::engine_registry::EngineRegistry;
use crate::events::{BatchEvent, EventSender};
use crate::file_manager::FileManager;
use crate::optimizer::progress_tracker::{BatchTotals, ProgressTracker, HEARTBEAT_INTERVAL};
use crate::optimizer::task_optimizer::{TaskOptimizer, TaskOutcome};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// How long the drain loop waits before checking for a heartbeat
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Aggregates carried by the terminal event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub total_original_bytes: u64,
    pub total_output_bytes: u64,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    fn from_totals(totals: BatchTotals, elapsed: Duration) -> Self {
        Self {
            succeeded: totals.succeeded,
            total_original_bytes: totals.original_bytes,
            total_output_bytes: totals.output_bytes,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn saved_percent(&self) -> f64 {
        BatchTotals {
            succeeded: self.succeeded,
            original_bytes: self.total_original_bytes,
            output_bytes: self.total_output_bytes,
        }
        .saved_percent()
    }
}

impl From<BatchSummary> for BatchEvent {
    fn from(summary: BatchSummary) -> Self {
        BatchEvent::Finished {
            succeeded: summary.succeeded,
            total_original_bytes: summary.total_original_bytes,
            total_output_bytes: summary.total_output_bytes,
            elapsed_ms: summary.elapsed_ms,
        }
    }
}

/// Messages from workers to the scheduler
enum WorkerMessage {
    Started { source: PathBuf, at: Instant },
    Finished { source: PathBuf, outcome: TaskOutcome },
}

/// Dispatcher a concorrenza limitata; un'istanza per batch
pub struct BatchScheduler {
    registry: Arc<EngineRegistry>,
    options: Arc<CompressionOptions>,
    formats: FormatFilter,
    events: EventSender,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl BatchScheduler {
    pub fn new(
        registry: Arc<EngineRegistry>,
        options: CompressionOptions,
        formats: FormatFilter,
        events: EventSender,
    ) -> Self {
        Self {
            registry,
            options: Arc::new(options),
            formats,
            events,
            poll_interval: POLL_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    /// Override the queue poll and heartbeat intervals
    pub fn with_timing(mut self, poll_interval: Duration, heartbeat_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Walk `input_root` recursively and compress every allowed image
    pub async fn run_directory(&self, input_root: &Path, output_root: &Path) -> BatchSummary {
        let root = input_root.to_path_buf();
        let formats = self.formats.clone();
        let files = tokio::task::spawn_blocking(move || FileManager::find_image_files(&root, &formats))
            .await
            .unwrap_or_default();
        debug!("Found {} images under {}", files.len(), input_root.display());

        self.run_files(files, input_root, output_root).await
    }

    /// Compress an explicit file list; output mirrors each file's place under `input_root`
    pub async fn run_files(&self, files: Vec<PathBuf>, input_root: &Path, output_root: &Path) -> BatchSummary {
        let started = Instant::now();

        let mut seen = HashSet::new();
        let files: Vec<PathBuf> = FileManager::filter_files(&files, &self.formats)
            .into_iter()
            .filter(|f| seen.insert(f.clone()))
            .collect();

        if files.is_empty() {
            self.abort("No images to compress".to_string());
            return BatchSummary::default();
        }
        if let Err(e) = tokio::fs::create_dir_all(output_root).await {
            self.abort(format!(
                "Cannot create output directory {}: {}",
                output_root.display(),
                e
            ));
            return BatchSummary::default();
        }

        let workers = self.options.effective_concurrency();
        info!(
            "Compressing {} images with {} workers into {}",
            files.len(),
            workers,
            output_root.display()
        );

        let task = Arc::new(TaskOptimizer::new(
            self.registry.clone(),
            self.options.clone(),
            input_root.to_path_buf(),
            output_root.to_path_buf(),
        ));
        let mut tracker = ProgressTracker::new(files.len()).with_heartbeat_interval(self.heartbeat_interval);
        let mut rx = Self::spawn_jobs(files, task, workers);

        let mut last_percent = 0u8;
        self.events.send(BatchEvent::Progress { percent: 0 });

        while !tracker.is_complete() {
            match tokio::time::timeout(self.poll_interval, rx.recv()).await {
                Ok(Some(WorkerMessage::Started { source, at })) => tracker.job_started(source, at),
                Ok(Some(WorkerMessage::Finished { source, outcome })) => {
                    self.report(&outcome);
                    last_percent = tracker.record(&source, &outcome);
                    self.events.send(BatchEvent::Progress { percent: last_percent });
                }
                Ok(None) => {
                    let lost = tracker.force_complete();
                    warn!("{} jobs ended without reporting a result", lost);
                    self.events.log(format!("{} files ended without a result", lost));
                }
                Err(_) => {
                    let now = Instant::now();
                    if tracker.heartbeat_due(now) {
                        let line = tracker.heartbeat(now);
                        info!("{}", line);
                        self.events.log(line);
                    }
                }
            }
        }

        if last_percent < 100 {
            self.events.send(BatchEvent::Progress { percent: 100 });
        }

        let elapsed = started.elapsed();
        let line = tracker.summary(elapsed);
        info!("{}", line);
        self.events.log(line);

        let summary = BatchSummary::from_totals(tracker.totals(), elapsed);
        self.events.send(summary.into());
        summary
    }

    fn spawn_jobs(
        files: Vec<PathBuf>,
        task: Arc<TaskOptimizer>,
        workers: usize,
    ) -> mpsc::UnboundedReceiver<WorkerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(workers));

        for source in files {
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            let task = task.clone();

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let _ = tx.send(WorkerMessage::Started {
                    source: source.clone(),
                    at: Instant::now(),
                });
                let outcome = task.compress(&source).await;
                let _ = tx.send(WorkerMessage::Finished { source, outcome });
            });
        }

        rx
    }

    /// Per-file lines: diagnostics first, then the terminal line
    fn report(&self, outcome: &TaskOutcome) {
        for line in &outcome.logs {
            warn!("{}", line);
            self.events.log(line.clone());
        }
        let line = outcome.summary_line();
        info!("{}", line);
        self.events.log(line);
    }

    fn abort(&self, reason: String) {
        warn!("{}", reason);
        self.events.log(reason);
        self.events.send(BatchEvent::empty_finish());
    }
}
