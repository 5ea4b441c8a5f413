//! # Progress Bar Module
//!
//! Progress bar per le esecuzioni interattive da terminale, alimentata dagli
//! eventi del batch.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 60% b.jpg kept original (corrupt input), took 0.4s
//! ```

use crate::events::BatchEvent;
use crate::file_manager::FileManager;
use crate::optimizer::BatchSummary;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Bar that draws nothing, for non-interactive runs
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Reflect one batch event on the bar
    pub fn handle(&self, event: &BatchEvent) {
        match event {
            BatchEvent::Log { message } => self.bar.set_message(message.clone()),
            BatchEvent::Progress { percent } => self.bar.set_position(u64::from(*percent)),
            BatchEvent::Finished {
                succeeded,
                total_original_bytes,
                total_output_bytes,
                elapsed_ms,
            } => {
                let summary = BatchSummary {
                    succeeded: *succeeded,
                    total_original_bytes: *total_original_bytes,
                    total_output_bytes: *total_output_bytes,
                    elapsed_ms: *elapsed_ms,
                };
                self.finish(&format_summary(&summary));
            }
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Print a line above the bar
    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One-line human summary of a finished batch
pub fn format_summary(summary: &BatchSummary) -> String {
    let saved = summary
        .total_original_bytes
        .saturating_sub(summary.total_output_bytes);
    format!(
        "Succeeded: {} | {} -> {} | Total saved: {} ({:.1}%)",
        summary.succeeded,
        FileManager::format_size(summary.total_original_bytes),
        FileManager::format_size(summary.total_output_bytes),
        FileManager::format_size(saved),
        summary.saved_percent()
    )
}
