//! # Progress Tracking Module
//!
//! Stato del batch posseduto esclusivamente dallo scheduler: job in corso,
//! totali cumulati, percentuale di avanzamento e heartbeat.
//! Nessun lock: i worker comunicano solo tramite il canale dei risultati.

use crate::optimizer::task_optimizer::TaskOutcome;
use crate::utils::display_name;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Silence after which a heartbeat is due
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// In-flight files named by a heartbeat
const HEARTBEAT_TOP: usize = 3;

/// Running totals over successful outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTotals {
    pub succeeded: usize,
    pub original_bytes: u64,
    pub output_bytes: u64,
}

impl BatchTotals {
    /// `1 - output/original` as a percentage, 0 when nothing was measured
    pub fn saved_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            0.0
        } else {
            (1.0 - self.output_bytes as f64 / self.original_bytes as f64) * 100.0
        }
    }
}

/// Tracker del batch
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    totals: BatchTotals,
    in_flight: HashMap<PathBuf, Instant>,
    last_activity: Instant,
    last_percent: u8,
    heartbeat_interval: Duration,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            totals: BatchTotals::default(),
            in_flight: HashMap::new(),
            last_activity: Instant::now(),
            last_percent: 0,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn totals(&self) -> BatchTotals {
        self.totals
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    pub fn job_started(&mut self, path: PathBuf, at: Instant) {
        self.in_flight.insert(path, at);
    }

    /// Account one outcome and return the new progress percentage
    pub fn record(&mut self, source: &Path, outcome: &TaskOutcome) -> u8 {
        self.in_flight.remove(source);
        self.completed = (self.completed + 1).min(self.total);
        self.last_activity = Instant::now();

        if outcome.has_result && outcome.result.success {
            self.totals.succeeded += 1;
            self.totals.original_bytes += outcome.result.original_size;
            self.totals.output_bytes += outcome.result.output_size;
        }

        self.percent()
    }

    /// `completed * 100 / total`, never lower than a value already reported
    pub fn percent(&mut self) -> u8 {
        let current = if self.total == 0 {
            100
        } else {
            (self.completed * 100 / self.total) as u8
        };
        self.last_percent = self.last_percent.max(current);
        self.last_percent
    }

    /// Mark every job as accounted for (lost workers included)
    pub fn force_complete(&mut self) -> usize {
        let missing = self.total.saturating_sub(self.completed);
        self.completed = self.total;
        self.in_flight.clear();
        missing
    }

    pub fn heartbeat_due(&self, now: Instant) -> bool {
        !self.is_complete() && now.duration_since(self.last_activity) >= self.heartbeat_interval
    }

    /// Longest-running in-flight files with elapsed seconds
    pub fn longest_running(&self, now: Instant, limit: usize) -> Vec<(String, f64)> {
        let mut running: Vec<(String, f64)> = self
            .in_flight
            .iter()
            .map(|(path, started)| (display_name(path), now.duration_since(*started).as_secs_f64()))
            .collect();
        running.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        running.truncate(limit);
        running
    }

    /// Heartbeat text; resets the heartbeat clock
    pub fn heartbeat(&mut self, now: Instant) -> String {
        self.last_activity = now;
        let longest = self
            .longest_running(now, HEARTBEAT_TOP)
            .into_iter()
            .map(|(name, secs)| format!("{}({:.1}s)", name, secs))
            .collect::<Vec<_>>()
            .join(", ");

        if longest.is_empty() {
            format!("{} of {} done, waiting for workers", self.completed, self.total)
        } else {
            format!("{} in progress, longest running: {}", self.in_flight.len(), longest)
        }
    }

    /// Final summary line
    pub fn summary(&self, elapsed: Duration) -> String {
        format!(
            "Finished: {} succeeded, saved {:.1}%, took {:.1}s",
            self.totals.succeeded,
            self.totals.saved_percent(),
            elapsed.as_secs_f64()
        )
    }
}
