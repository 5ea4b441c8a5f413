//! # Task Optimizer Module
//!
//! Worker per la compressione di un singolo file (il "job").
//!
//! ## Flusso:
//! 1. Rileva il formato reale (sniffing) e segnala l'eventuale mismatch con l'estensione
//! 2. Decide il percorso con `decide_plan`: engine diretto, pipeline di conversione
//!    oppure fallimento immediato
//! 3. Riserva il path di output (collisioni → `stem(n).ext`)
//! 4. Esegue il piano, con fallback sul codec interno per i formati non convertiti
//! 5. Se l'output non è più piccolo dell'originale, lo sostituisce con una copia del sorgente
//!
//! Ogni errore resta confinato nel `TaskOutcome` del file.

use crate::config::CompressionOptions;
use crate::conversion::{self, ConversionPipeline, PipelineMode};
use crate::engine_registry::{CompressionResult, EngineRegistry, ENGINE_BUILTIN};
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::format::{self, ImageKind};
use crate::optimizer::path_resolver::PathResolver;
use crate::tuning;
use crate::utils::display_name;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// How a job gets from source to output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPlan {
    /// Hand the source straight to the engine registry
    DirectEngine,
    /// Go through the conversion pipeline first
    ViaPipeline(PipelineMode),
    /// Categorically unsupported, fail without touching anything
    UnsupportedFast(String),
}

/// Pick the path for a source whose real format is `real`.
///
/// `mismatch` is set when the extension disagrees with the content.
pub fn decide_plan(real: ImageKind, target: ImageKind, mismatch: bool, options: &CompressionOptions) -> JobPlan {
    let resize = options.wants_resize();

    if target == ImageKind::Gif && real != ImageKind::Gif {
        return JobPlan::UnsupportedFast("conversion to GIF is not supported".to_string());
    }
    if resize && (real == ImageKind::Webp || target == ImageKind::Webp) {
        return JobPlan::UnsupportedFast("unsupported WebP+resize combination".to_string());
    }
    if target != real && (real == ImageKind::Webp || target == ImageKind::Webp) {
        return JobPlan::DirectEngine;
    }
    if resize || target != real {
        return JobPlan::ViaPipeline(PipelineMode::Transcode);
    }
    if mismatch {
        return JobPlan::ViaPipeline(PipelineMode::Relabel);
    }
    JobPlan::DirectEngine
}

/// Result of one job, handed to the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub file_name: String,
    pub file_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub result: CompressionResult,
    /// Non-terminal diagnostics, in order
    pub logs: Vec<String>,
    pub elapsed_ms: u64,
    /// `false` for early exits where no size comparison happened
    pub has_result: bool,
}

impl TaskOutcome {
    /// The one terminal log line for this file
    pub fn summary_line(&self) -> String {
        let secs = self.elapsed_ms as f64 / 1000.0;
        if !self.has_result || !self.result.success {
            return format!("{} failed: {}, took {:.1}s", self.file_name, self.result.message, secs);
        }
        if self.result.is_kept_original() {
            return format!(
                "{} kept original ({}), took {:.1}s",
                self.file_name, self.result.message, secs
            );
        }
        format!(
            "{} compressed, saved {:.1}%, engine {}, took {:.1}s",
            self.file_name,
            self.result.reduction_percent(),
            self.result.engine,
            secs
        )
    }
}

/// Per-file state collected while the job runs
struct JobTrace {
    file_name: String,
    logs: Vec<String>,
    output_path: Option<PathBuf>,
}

/// Worker per elaborazione singoli file
pub struct TaskOptimizer {
    registry: Arc<EngineRegistry>,
    options: Arc<CompressionOptions>,
    input_root: PathBuf,
    output_root: PathBuf,
}

impl TaskOptimizer {
    pub fn new(
        registry: Arc<EngineRegistry>,
        options: Arc<CompressionOptions>,
        input_root: PathBuf,
        output_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            options,
            input_root,
            output_root,
        }
    }

    /// Compress one file; never fails, every problem ends up in the outcome
    pub async fn compress(&self, source: &Path) -> TaskOutcome {
        let started = Instant::now();
        let mut trace = JobTrace {
            file_name: display_name(source),
            logs: Vec::new(),
            output_path: None,
        };

        let (result, has_result) = match self.run_job(source, &mut trace).await {
            Ok(result) => (result, true),
            Err(e) => {
                if let Some(output) = trace.output_path.take() {
                    FileManager::remove_partial(&output).await;
                }
                let original_size = FileManager::file_size(source).await;
                (CompressionResult::failed("none", original_size, 0, &e), false)
            }
        };

        TaskOutcome {
            file_name: trace.file_name,
            file_path: tokio::fs::canonicalize(source)
                .await
                .unwrap_or_else(|_| source.to_path_buf()),
            output_path: trace.output_path,
            result,
            logs: trace.logs,
            elapsed_ms: started.elapsed().as_millis() as u64,
            has_result,
        }
    }

    /// `Err` is an early exit (unsupported, unreadable, I/O) with no size comparison
    async fn run_job(&self, source: &Path, trace: &mut JobTrace) -> Result<CompressionResult, CompressError> {
        let options = self.options.as_ref();

        let declared = ImageKind::from_path(source).ok_or_else(|| {
            CompressError::UnsupportedConversion("unsupported file type".to_string())
        })?;

        let sniff_path = source.to_path_buf();
        let sniffed = tokio::task::spawn_blocking(move || format::sniff(&sniff_path))
            .await
            .ok()
            .flatten();
        let real = sniffed.unwrap_or(declared);
        let mismatch = real != declared;
        if mismatch {
            trace.logs.push(format!(
                "{} is actually {} but named .{}, processing it as {}",
                trace.file_name, real, declared, real
            ));
        }

        let target = options.output_format.resolve(real);
        let plan = decide_plan(real, target, mismatch, options);
        debug!("{}: {:?} -> {:?} via {:?}", trace.file_name, real, target, plan);

        if let JobPlan::UnsupportedFast(reason) = &plan {
            return Err(CompressError::UnsupportedConversion(reason.clone()));
        }

        let candidate = PathResolver::get_output_path(source, &self.input_root, &self.output_root, target)?;
        PathResolver::ensure_parent_dirs(&candidate).await?;
        let destination = PathResolver::reserve_unique(&candidate, source).await?;
        trace.output_path = Some(destination.clone());

        let original_size = FileManager::file_size(source).await;

        let result = match plan {
            JobPlan::ViaPipeline(mode) => {
                ConversionPipeline::new(&self.registry)
                    .run(mode, source, real, &destination, options)
                    .await?
            }
            _ => self.run_direct(source, real, mismatch, target, &destination, trace).await?,
        };

        if !result.success {
            FileManager::remove_partial(&destination).await;
            trace.output_path = None;
            return Ok(result);
        }

        if !result.is_kept_original() && result.output_size >= original_size {
            if target != real {
                warn!(
                    "{}: converted output not smaller, writing the original {} bytes as .{}",
                    source.display(),
                    real,
                    target
                );
                trace.logs.push(format!(
                    "{}: {} output not smaller, original {} bytes kept under .{}",
                    trace.file_name, target, real, target
                ));
            }
            let copied = FileManager::copy_original(source, &destination).await?;
            return Ok(CompressionResult::kept_original(
                original_size,
                copied,
                format!("{} output not smaller", result.engine),
            ));
        }

        Ok(result)
    }

    async fn run_direct(
        &self,
        source: &Path,
        real: ImageKind,
        mismatch: bool,
        target: ImageKind,
        destination: &Path,
        trace: &mut JobTrace,
    ) -> Result<CompressionResult, CompressError> {
        let options = self.options.as_ref();
        let near = destination.parent().unwrap_or_else(|| Path::new("."));

        // The registry reads formats from extensions, so a lying name is staged first
        let staged = if mismatch {
            Some(conversion::stage_relabelled(source, real, near).await?)
        } else {
            None
        };
        let working: &Path = staged.as_deref().unwrap_or(source);

        let result = self.registry.compress_file(working, destination, options).await;
        if result.success || target != real || !real.builtin_encodable() {
            return Ok(result);
        }

        trace
            .logs
            .push(format!("{}: {}, retrying with built-in codec", trace.file_name, result.message));

        let quality = tuning::builtin_jpeg_quality(options.quality, options.profile, options.lossless);
        match conversion::reencode(
            source.to_path_buf(),
            real,
            target,
            destination.to_path_buf(),
            quality,
            None,
        )
        .await
        {
            Ok(()) => Ok(CompressionResult::compressed(
                ENGINE_BUILTIN,
                result.original_size,
                FileManager::file_size(destination).await,
                "compressed with built-in codec",
            )),
            Err(e) => {
                debug!("Built-in codec failed for {}: {}", source.display(), e);
                trace.logs.push(format!("{}: built-in codec failed: {}", trace.file_name, e));
                Ok(result)
            }
        }
    }
}
