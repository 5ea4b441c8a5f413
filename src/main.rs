//! # imgcompress - Main Entry Point
//!
//! Punto di ingresso del compressore batch.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing` (su stderr, così stdout resta JSON in `--json`)
//! - Caricamento del file di configurazione e override dai flag
//! - Avvio dello scheduler e rendering degli eventi (progress bar o righe JSON)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! imgcompress ~/Pictures --output ~/Pictures-small --quality 75 --profile balanced --workers 4
//! imgcompress photo.png --output out --format webp --json
//! imgcompress --list-engines
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use imgcompress::events::{self, EventReceiver};
use imgcompress::json_output::{self, JsonMessage};
use imgcompress::platform::SystemInfo;
use imgcompress::progress::ProgressManager;
use imgcompress::{
    BatchScheduler, BatchSummary, Config, EngineRegistry, FormatFilter, OutputFormat, Profile, ResizeMode,
};

#[derive(Parser)]
#[command(name = "imgcompress")]
#[command(about = "Compress folders of images with mozjpeg, pngquant, oxipng, gifsicle and libwebp")]
struct Args {
    /// Image file or directory to compress
    #[arg(required_unless_present = "list_engines")]
    input: Option<PathBuf>,

    /// Output directory (created if missing)
    #[arg(short, long, required_unless_present = "list_engines")]
    output: Option<PathBuf>,

    /// Quality (1-100) before profile adjustment
    #[arg(short, long)]
    quality: Option<u8>,

    /// Compression profile
    #[arg(short, long, value_enum)]
    profile: Option<Profile>,

    /// Avoid any visual-quality loss
    #[arg(long)]
    lossless: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Number of parallel workers (default: logical cores - 1)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Resize target box, e.g. 1920x1080
    #[arg(long, value_parser = parse_resize)]
    resize: Option<(u32, u32)>,

    /// How the resize box is applied
    #[arg(long, value_enum, requires = "resize")]
    resize_mode: Option<ResizeMode>,

    /// Extensions to include (comma separated)
    #[arg(long, value_delimiter = ',')]
    formats: Vec<String>,

    /// Configuration file (default: <config dir>/imgcompress/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit JSON lines on stdout instead of a progress bar
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Show which engine serves each format and exit
    #[arg(long)]
    list_engines: bool,
}

/// Parse `WIDTHxHEIGHT`
fn parse_resize(value: &str) -> std::result::Result<(u32, u32), String> {
    let (width, height) = value
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = width.parse().map_err(|_| format!("invalid width '{}'", width))?;
    let height: u32 = height.parse().map_err(|_| format!("invalid height '{}'", height))?;
    if width == 0 || height == 0 {
        return Err("resize dimensions must be greater than 0".to_string());
    }
    Ok((width, height))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("Running on {}", SystemInfo::current());

    let json = args.json;
    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if json {
                JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
            }
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args).await?;
    let registry = Arc::new(EngineRegistry::with_settings(config.engine.clone()));

    if args.list_engines {
        print_engines(&registry, config.options.lossless);
        return Ok(());
    }

    let input = args.input.ok_or_else(|| anyhow!("Missing input path"))?;
    let output = args.output.ok_or_else(|| anyhow!("Missing output directory"))?;
    if !input.exists() {
        return Err(anyhow!("Input path does not exist: {}", input.display()));
    }

    if args.json {
        JsonMessage::start(input.clone(), output.clone(), &config.options).emit();
    } else {
        info!("Compressing {} into {}", input.display(), output.display());
    }

    let (sender, receiver) = events::channel();
    let consumer = tokio::spawn(render_events(receiver, args.json));

    let summary = {
        let scheduler = BatchScheduler::new(registry, config.options, config.formats, sender);
        run_batch(&scheduler, &input, &output).await
    };

    consumer.await.context("Event renderer stopped unexpectedly")?;
    debug!("Batch summary: {:?}", summary);
    Ok(())
}

async fn run_batch(scheduler: &BatchScheduler, input: &Path, output: &Path) -> BatchSummary {
    if input.is_dir() {
        scheduler.run_directory(input, output).await
    } else {
        let root = input.parent().map(Path::to_path_buf).unwrap_or_default();
        scheduler.run_files(vec![input.to_path_buf()], &root, output).await
    }
}

/// Config file values, overridden by command line flags
async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("Configuration file does not exist: {}", path.display()));
            }
            Config::from_file(path).await?
        }
        None => match Config::default_path() {
            Some(path) => Config::from_file(&path).await?,
            None => Config::default(),
        },
    };

    let options = &mut config.options;
    if let Some(quality) = args.quality {
        options.quality = quality;
    }
    if let Some(profile) = args.profile {
        options.profile = profile;
    }
    if args.lossless {
        options.lossless = true;
    }
    if let Some(format) = args.format {
        options.output_format = format;
    }
    if let Some(workers) = args.workers {
        options.concurrency = Some(workers);
    }
    if let Some((width, height)) = args.resize {
        options.resize_enabled = true;
        options.target_width = width;
        options.target_height = height;
        options.resize_mode = args.resize_mode.unwrap_or(ResizeMode::Fit);
    }
    if !args.formats.is_empty() {
        config.formats = FormatFilter::parse(args.formats.as_slice());
    }

    config.validate()?;
    Ok(config)
}

async fn render_events(mut receiver: EventReceiver, json: bool) {
    if json {
        while let Some(event) = receiver.recv().await {
            json_output::emit_event(&event);
        }
        return;
    }

    let progress = ProgressManager::new();
    while let Some(event) = receiver.recv().await {
        progress.handle(&event);
    }
}

fn print_engines(registry: &EngineRegistry, lossless: bool) {
    println!("{}", registry.locator().tools_report());
    println!("Engines ({}):", if lossless { "lossless" } else { "lossy" });
    for (kind, engine) in registry.engine_status(lossless) {
        println!("  {:<5} -> {}", kind.extension(), engine);
    }
}
