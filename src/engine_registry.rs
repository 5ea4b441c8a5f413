//! # Engine Registry
//!
//! Strategie di compressione per formato, delegate ai tool esterni.
//!
//! ## Responsabilità:
//! - Sceglie il tool in base alla coppia (formato sorgente, formato destinazione)
//! - Calcola gli argomenti dal profilo (`tuning`)
//! - Esegue il tool tramite `ToolInvoker` con timeout
//! - Classifica l'esito: compresso, originale conservato, fallito
//!
//! ## Strategie:
//! - **JPEG**: `jpegtran` (lossless) oppure `cjpeg`/`mozjpeg` (lossy)
//! - **PNG**: `pngquant` (lossy) con fallback su `oxipng`/`optipng`
//! - **GIF**: `gifsicle`, con retry senza lossy e retry aggressivo se non riduce
//! - **WebP**: `cwebp` (anche da JPG/PNG), `dwebp` verso PNG/JPG
//! - **→ GIF** da altri formati: non supportato, nessun processo avviato
//!
//! Il registry non decide mai di sostituire l'output con l'originale per
//! un tool mancante: lo segnala come "missing engine" e lascia la scelta
//! al job. Conserva invece l'originale quando il formato non cambia e il
//! tool va in timeout o segnala una sorgente danneggiata.

use crate::config::{CompressionOptions, EngineSettings};
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::format::ImageKind;
use crate::invoker::{ProcessInvoker, ToolInvoker, ToolOutput};
use crate::tool_resolver::ToolLocator;
use crate::tuning;
use crate::utils::path_arg;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Engine name for results that are a verbatim copy of the source
pub const ENGINE_ORIGINAL: &str = "original";
/// Engine name for the built-in `image` codec
pub const ENGINE_BUILTIN: &str = "image";

/// pngquant exit code when `--skip-if-larger` discarded the result
const PNGQUANT_NO_GAIN: i32 = 98;

/// Outcome of compressing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionResult {
    pub success: bool,
    pub original_size: u64,
    pub output_size: u64,
    pub engine: String,
    pub message: String,
}

impl CompressionResult {
    pub fn compressed(
        engine: impl Into<String>,
        original_size: u64,
        output_size: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            original_size,
            output_size,
            engine: engine.into(),
            message: message.into(),
        }
    }

    pub fn kept_original(original_size: u64, output_size: u64, message: impl Into<String>) -> Self {
        Self::compressed(ENGINE_ORIGINAL, original_size, output_size, message)
    }

    pub fn failed(engine: impl Into<String>, original_size: u64, output_size: u64, error: &CompressError) -> Self {
        Self {
            success: false,
            original_size,
            output_size,
            engine: engine.into(),
            message: error.to_string(),
        }
    }

    /// Tool not found: sizes are equal and nothing was written
    pub fn missing_engine(engine: &str, original_size: u64) -> Self {
        Self::failed(
            engine,
            original_size,
            original_size,
            &CompressError::ToolMissing(engine.to_string()),
        )
    }

    pub fn is_kept_original(&self) -> bool {
        self.success && self.engine == ENGINE_ORIGINAL
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.output_size)
    }
}

/// Per-call context shared by the strategies
struct EngineJob<'a> {
    source: &'a Path,
    destination: &'a Path,
    original_size: u64,
    same_format: bool,
    options: &'a CompressionOptions,
}

/// Per-format compression strategies over external tools
pub struct EngineRegistry {
    locator: ToolLocator,
    invoker: Arc<dyn ToolInvoker>,
    settings: EngineSettings,
}

impl EngineRegistry {
    pub fn new(locator: ToolLocator, invoker: Arc<dyn ToolInvoker>, settings: EngineSettings) -> Self {
        Self {
            locator,
            invoker,
            settings,
        }
    }

    /// Registry over the installed tools and real processes
    pub fn with_settings(settings: EngineSettings) -> Self {
        Self::new(ToolLocator::new(), Arc::new(ProcessInvoker), settings)
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    /// Compress `source` into `destination`.
    ///
    /// Formats come from the two extensions; the caller has already made
    /// sure the source extension matches its content.
    pub async fn compress_file(
        &self,
        source: &Path,
        destination: &Path,
        options: &CompressionOptions,
    ) -> CompressionResult {
        let original_size = match tokio::fs::metadata(source).await {
            Ok(metadata) => metadata.len(),
            Err(e) => return CompressionResult::failed("none", 0, 0, &CompressError::Io(e)),
        };

        let (from, to) = match (ImageKind::from_path(source), ImageKind::from_path(destination)) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                let err = CompressError::UnsupportedConversion("unsupported format".to_string());
                return CompressionResult::failed("none", original_size, 0, &err);
            }
        };

        let job = EngineJob {
            source,
            destination,
            original_size,
            same_format: from == to,
            options,
        };

        use ImageKind::*;
        match (from, to) {
            (Jpg, Jpg) => self.compress_jpeg(&job).await,
            (Png, Png) => self.compress_png(&job).await,
            (Gif, Gif) => self.compress_gif(&job).await,
            (Webp, Webp) | (Jpg, Webp) | (Png, Webp) => self.encode_webp(&job).await,
            (Webp, Png) => self.decode_webp_to_png(&job).await,
            (Webp, Jpg) => self.decode_webp_to_jpeg(&job).await,
            (_, Gif) => {
                let err = CompressError::UnsupportedConversion("conversion to GIF is not supported".to_string());
                CompressionResult::failed("none", original_size, 0, &err)
            }
            (from, to) => {
                let err = CompressError::UnsupportedConversion(format!(
                    "{} to {} requires the conversion pipeline",
                    from, to
                ));
                CompressionResult::failed("none", original_size, 0, &err)
            }
        }
    }

    /// Which engine will serve each format, `image` when only the built-in codec is left
    pub fn engine_status(&self, lossless: bool) -> Vec<(ImageKind, String)> {
        const JPEG_LOSSLESS: &[(&str, &[&str])] = &[("jpegtran", &["jpegtran"])];
        const JPEG_LOSSY: &[(&str, &[&str])] = &[("mozjpeg", &["cjpeg", "mozjpeg"])];
        const PNG_LOSSLESS: &[(&str, &[&str])] = &[("oxipng", &["oxipng"]), ("optipng", &["optipng"])];
        const PNG_LOSSY: &[(&str, &[&str])] = &[
            ("pngquant", &["pngquant"]),
            ("oxipng", &["oxipng"]),
            ("optipng", &["optipng"]),
        ];
        const GIF: &[(&str, &[&str])] = &[("gifsicle", &["gifsicle"])];
        const WEBP: &[(&str, &[&str])] = &[("cwebp", &["cwebp"])];

        let (jpeg, png) = if lossless {
            (JPEG_LOSSLESS, PNG_LOSSLESS)
        } else {
            (JPEG_LOSSY, PNG_LOSSY)
        };

        vec![
            (ImageKind::Jpg, self.first_available(jpeg, ENGINE_BUILTIN)),
            (ImageKind::Png, self.first_available(png, ENGINE_BUILTIN)),
            (ImageKind::Gif, self.first_available(GIF, ENGINE_BUILTIN)),
            (ImageKind::Webp, self.first_available(WEBP, "unavailable")),
        ]
    }

    fn first_available(&self, engines: &[(&str, &[&str])], fallback: &str) -> String {
        engines
            .iter()
            .find(|(_, tools)| self.locator.find_tool(tools).is_some())
            .map(|(engine, _)| engine.to_string())
            .unwrap_or_else(|| fallback.to_string())
    }

    async fn compress_jpeg(&self, job: &EngineJob<'_>) -> CompressionResult {
        let (source, destination) = (path_arg(job.source), path_arg(job.destination));

        if job.options.lossless {
            let Some(jpegtran) = self.locator.find_tool(&["jpegtran"]) else {
                return CompressionResult::missing_engine("jpegtran", job.original_size);
            };
            let args = crate::args![
                "-copy", "none", "-optimize", "-progressive", "-outfile", destination, source
            ];
            let run = self.run(&jpegtran, &args).await;
            return self.settle("jpegtran", run, job).await;
        }

        let Some(cjpeg) = self.locator.find_tool(&["cjpeg", "mozjpeg"]) else {
            return CompressionResult::missing_engine("mozjpeg", job.original_size);
        };
        let quality = tuning::adjust_quality(job.options.quality, job.options.profile);
        let args = crate::args![
            "-quality", quality, "-progressive", "-optimize", "-outfile", destination, source
        ];
        let run = self.run(&cjpeg, &args).await;
        self.settle("mozjpeg", run, job).await
    }

    async fn compress_png(&self, job: &EngineJob<'_>) -> CompressionResult {
        let (source, destination) = (path_arg(job.source), path_arg(job.destination));

        if !job.options.lossless {
            if let Some(pngquant) = self.locator.find_tool(&["pngquant"]) {
                let settings = tuning::pngquant_settings(job.options.quality, job.options.profile);
                let args = crate::args![
                    "--quality",
                    settings.quality_range(),
                    "--speed",
                    settings.speed,
                    "--strip",
                    "--skip-if-larger",
                    "--output",
                    destination,
                    "--force",
                    source
                ];
                match self.run(&pngquant, &args).await {
                    Ok(output) if output.code() == Some(PNGQUANT_NO_GAIN) => {
                        FileManager::remove_partial(job.destination).await;
                        return self.keep_original(job, "pngquant found no size gain, kept original").await;
                    }
                    Ok(output) if output.success() || output.timed_out() || self.settings.looks_corrupt(&output.output) => {
                        return self.settle("pngquant", Ok(output), job).await;
                    }
                    Ok(output) => debug!("pngquant failed ({}), trying lossless optimizer", output.describe()),
                    Err(e) => debug!("pngquant could not start ({}), trying lossless optimizer", e),
                }
                FileManager::remove_partial(job.destination).await;
            }
        }

        if let Some(oxipng) = self.locator.find_tool(&["oxipng"]) {
            let level = tuning::oxipng_level(job.options.profile);
            let args = crate::args!["-o", level, "--strip", "all", "--out", destination, source];
            let run = self.run(&oxipng, &args).await;
            return self.settle("oxipng", run, job).await;
        }

        if let Some(optipng) = self.locator.find_tool(&["optipng"]) {
            let level = format!("-o{}", tuning::optipng_level(job.options.profile));
            let args = crate::args![level, "-strip", "all", "-out", destination, source];
            let run = self.run(&optipng, &args).await;
            return self.settle("optipng", run, job).await;
        }

        CompressionResult::missing_engine(
            if job.options.lossless { "oxipng" } else { "pngquant" },
            job.original_size,
        )
    }

    async fn compress_gif(&self, job: &EngineJob<'_>) -> CompressionResult {
        let Some(gifsicle) = self.locator.find_tool(&["gifsicle"]) else {
            return CompressionResult::missing_engine("gifsicle", job.original_size);
        };

        let gif_args = |lossy: Option<tuning::GifLossy>, output: &Path| {
            let mut args = crate::args!["-O3", "--no-comments", "--no-names", "--no-extensions"];
            if let Some(params) = lossy {
                args.push(format!("--lossy={}", params.lossy));
                args.push(format!("--colors={}", params.colors));
            }
            args.push(path_arg(job.source));
            args.push("-o".to_string());
            args.push(path_arg(output));
            args
        };

        if job.options.lossless {
            let run = self.run(&gifsicle, &gif_args(None, job.destination)).await;
            return self.settle("gifsicle", run, job).await;
        }

        let params = tuning::gif_lossy(job.options.quality, job.options.profile);
        let first = self.run(&gifsicle, &gif_args(Some(params), job.destination)).await;

        let lossy_failed = match &first {
            Ok(output) => !output.success() && !output.timed_out() && !self.settings.looks_corrupt(&output.output),
            Err(_) => true,
        };
        if lossy_failed {
            debug!("gifsicle lossy run failed, retrying without lossy flags");
            FileManager::remove_partial(job.destination).await;
            let retry = self.run(&gifsicle, &gif_args(None, job.destination)).await;
            return self.settle("gifsicle", retry, job).await;
        }

        let result = self.settle("gifsicle", first, job).await;
        if !result.success || result.is_kept_original() || result.output_size < job.original_size {
            return result;
        }

        let harsher = params.amplified();
        debug!(
            "gifsicle output not smaller, retrying with lossy={} colors={}",
            harsher.lossy, harsher.colors
        );
        let temp = match FileManager::temp_path(parent_dir(job.destination), "gif") {
            Ok(temp) => temp,
            Err(e) => {
                debug!("No temp file for gifsicle retry: {}", e);
                return result;
            }
        };
        let temp_path: &Path = &temp;
        match self.run(&gifsicle, &gif_args(Some(harsher), temp_path)).await {
            Ok(output) if output.success() => {
                let retry_size = FileManager::file_size(temp_path).await;
                if retry_size > 0 && retry_size < job.original_size {
                    match tokio::fs::copy(temp_path, job.destination).await {
                        Ok(_) => {
                            return CompressionResult::compressed(
                                "gifsicle",
                                job.original_size,
                                retry_size,
                                "compressed with aggressive retry",
                            );
                        }
                        Err(e) => debug!("Cannot keep gifsicle aggressive retry output: {}", e),
                    }
                }
            }
            Ok(output) => debug!("gifsicle aggressive retry failed: {}", output.describe()),
            Err(e) => debug!("gifsicle aggressive retry could not start: {}", e),
        }
        result
    }

    async fn encode_webp(&self, job: &EngineJob<'_>) -> CompressionResult {
        let Some(cwebp) = self.locator.find_tool(&["cwebp"]) else {
            return CompressionResult::missing_engine("cwebp", job.original_size);
        };
        let (source, destination) = (path_arg(job.source), path_arg(job.destination));

        let args = if job.options.lossless {
            crate::args![
                "-lossless", "-z", 9, "-m", 6, "-metadata", "none", source, "-o", destination
            ]
        } else {
            let quality = tuning::adjust_quality(job.options.quality, job.options.profile);
            crate::args!["-q", quality, "-m", 6, "-metadata", "none", source, "-o", destination]
        };
        let run = self.run(&cwebp, &args).await;
        self.settle("cwebp", run, job).await
    }

    async fn decode_webp_to_png(&self, job: &EngineJob<'_>) -> CompressionResult {
        let Some(dwebp) = self.locator.find_tool(&["dwebp"]) else {
            return CompressionResult::missing_engine("dwebp", job.original_size);
        };
        let args = crate::args![path_arg(job.source), "-o", path_arg(job.destination)];
        let run = self.run(&dwebp, &args).await;
        self.settle("dwebp", run, job).await
    }

    async fn decode_webp_to_jpeg(&self, job: &EngineJob<'_>) -> CompressionResult {
        let Some(dwebp) = self.locator.find_tool(&["dwebp"]) else {
            return CompressionResult::missing_engine("dwebp", job.original_size);
        };
        let Some(cjpeg) = self.locator.find_tool(&["cjpeg", "mozjpeg"]) else {
            return CompressionResult::missing_engine("mozjpeg", job.original_size);
        };

        let pixels = match FileManager::temp_path(parent_dir(job.destination), "ppm") {
            Ok(path) => path,
            Err(e) => return CompressionResult::failed("dwebp", job.original_size, 0, &CompressError::Io(e)),
        };

        let args = crate::args![path_arg(job.source), "-ppm", "-o", path_arg(&pixels)];
        match self.run(&dwebp, &args).await {
            Ok(output) if output.success() => {}
            other => return self.settle("dwebp", other, job).await,
        }

        let quality = tuning::builtin_jpeg_quality(job.options.quality, job.options.profile, job.options.lossless);
        let args = crate::args![
            "-quality",
            quality,
            "-progressive",
            "-optimize",
            "-outfile",
            path_arg(job.destination),
            path_arg(&pixels)
        ];
        let run = self.run(&cjpeg, &args).await;
        self.settle("dwebp+mozjpeg", run, job).await
    }

    async fn run(&self, program: &Path, args: &[String]) -> io::Result<ToolOutput> {
        self.invoker.run(program, args, self.settings.tool_timeout()).await
    }

    /// Turn a finished tool run into a result
    async fn settle(&self, engine: &str, run: io::Result<ToolOutput>, job: &EngineJob<'_>) -> CompressionResult {
        let output = match run {
            Ok(output) => output,
            Err(e) => {
                FileManager::remove_partial(job.destination).await;
                let err = CompressError::ToolFailure {
                    tool: engine.to_string(),
                    detail: e.to_string(),
                };
                return CompressionResult::failed(engine, job.original_size, 0, &err);
            }
        };

        if output.success() {
            let size = FileManager::file_size(job.destination).await;
            if size > 0 {
                return CompressionResult::compressed(engine, job.original_size, size, "compressed");
            }
            FileManager::remove_partial(job.destination).await;
            let err = CompressError::ToolFailure {
                tool: engine.to_string(),
                detail: "produced no output".to_string(),
            };
            return CompressionResult::failed(engine, job.original_size, 0, &err);
        }

        FileManager::remove_partial(job.destination).await;

        if output.timed_out() {
            let err = CompressError::ToolTimeout {
                tool: engine.to_string(),
                secs: self.settings.tool_timeout_secs,
            };
            if job.same_format {
                return self.keep_original(job, &format!("{}, kept original", err)).await;
            }
            return CompressionResult::failed(engine, job.original_size, 0, &err);
        }

        if job.same_format && self.settings.looks_corrupt(&output.output) {
            info!("{} reports a damaged source: {}", engine, job.source.display());
            return self
                .keep_original(job, &format!("{} reported a damaged source, kept original", engine))
                .await;
        }

        let err = CompressError::ToolFailure {
            tool: engine.to_string(),
            detail: output.describe(),
        };
        CompressionResult::failed(engine, job.original_size, 0, &err)
    }

    async fn keep_original(&self, job: &EngineJob<'_>, message: &str) -> CompressionResult {
        match FileManager::copy_original(job.source, job.destination).await {
            Ok(size) => CompressionResult::kept_original(job.original_size, size, message),
            Err(e) => CompressionResult::failed(ENGINE_ORIGINAL, job.original_size, 0, &CompressError::Io(e)),
        }
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::invoker::ExitState;
    use crate::testing::{failure, tool_dir, FakeInvoker};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _tools: TempDir,
        work: TempDir,
        invoker: Arc<FakeInvoker>,
        registry: EngineRegistry,
    }

    fn fixture(
        tools: &[&str],
        behaviour: impl Fn(&crate::testing::ToolCall) -> ToolOutput + Send + Sync + 'static,
    ) -> Fixture {
        let (tools_dir, locator) = tool_dir(tools);
        let invoker = Arc::new(FakeInvoker::new(behaviour));
        let registry = EngineRegistry::new(locator, invoker.clone(), EngineSettings::default());
        Fixture {
            _tools: tools_dir,
            work: TempDir::new().unwrap(),
            invoker,
            registry,
        }
    }

    fn source(fixture: &Fixture, name: &str, bytes: usize) -> PathBuf {
        let path = fixture.work.path().join(name);
        std::fs::write(&path, vec![1u8; bytes]).unwrap();
        path
    }

    #[tokio::test]
    async fn test_jpeg_lossy_uses_adjusted_quality() {
        let fx = fixture(&["cjpeg"], |call| call.write_output(600));
        let src = source(&fx, "a.jpg", 1000);
        let dst = fx.work.path().join("out.jpg");
        let options = CompressionOptions {
            quality: 85,
            profile: Profile::Strong,
            ..Default::default()
        };

        let result = fx.registry.compress_file(&src, &dst, &options).await;
        assert!(result.success);
        assert_eq!(result.engine, "mozjpeg");
        assert_eq!((result.original_size, result.output_size), (1000, 600));

        let calls = fx.invoker.calls();
        assert_eq!(calls[0].tool, "cjpeg");
        assert_eq!(calls[0].args[..2], ["-quality".to_string(), "67".to_string()]);
    }

    #[tokio::test]
    async fn test_jpeg_lossless_missing_engine() {
        let fx = fixture(&["cjpeg"], |call| call.write_output(10));
        let src = source(&fx, "a.jpg", 1000);
        let dst = fx.work.path().join("out.jpg");
        let options = CompressionOptions {
            lossless: true,
            ..Default::default()
        };

        let result = fx.registry.compress_file(&src, &dst, &options).await;
        assert!(!result.success);
        assert_eq!(result.engine, "jpegtran");
        assert_eq!(result.message, "missing engine: jpegtran");
        assert_eq!(result.original_size, result.output_size);
        assert!(!dst.exists());
        assert!(fx.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_source_keeps_original() {
        let fx = fixture(&["cjpeg"], |_| failure(1, "Corrupt JPEG data: premature end of data segment"));
        let src = source(&fx, "b.jpg", 700);
        let dst = fx.work.path().join("b.jpg");

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(result.success);
        assert!(result.is_kept_original());
        assert_eq!((result.original_size, result.output_size), (700, 700));
        assert_eq!(std::fs::read(&dst).unwrap(), std::fs::read(&src).unwrap());
    }

    #[tokio::test]
    async fn test_plain_failure_is_reported() {
        let fx = fixture(&["cjpeg"], |_| failure(2, "cjpeg: unknown option"));
        let src = source(&fx, "b.jpg", 700);
        let dst = fx.work.path().join("b.jpg");

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(!result.success);
        assert!(result.message.contains("exit code 2"));
        assert_eq!(result.output_size, 0);
    }

    #[tokio::test]
    async fn test_timeout_keeps_original_only_for_same_format() {
        let fx = fixture(&["cwebp"], |_| ToolOutput::new(ExitState::TimedOut, ""));
        let same = source(&fx, "a.webp", 500);
        let result = fx
            .registry
            .compress_file(&same, &fx.work.path().join("o.webp"), &CompressionOptions::default())
            .await;
        assert!(result.is_kept_original());

        let png = source(&fx, "a.png", 500);
        let result = fx
            .registry
            .compress_file(&png, &fx.work.path().join("o2.webp"), &CompressionOptions::default())
            .await;
        assert!(!result.success);
        assert!(result.message.contains("timed out after 180s"));
    }

    #[tokio::test]
    async fn test_png_pngquant_range_and_speed() {
        let fx = fixture(&["pngquant", "oxipng"], |call| call.write_output(300));
        let src = source(&fx, "a.png", 500);
        let dst = fx.work.path().join("out.png");
        let options = CompressionOptions {
            quality: 80,
            profile: Profile::Balanced,
            ..Default::default()
        };

        let result = fx.registry.compress_file(&src, &dst, &options).await;
        assert_eq!(result.engine, "pngquant");
        let call = &fx.invoker.calls()[0];
        assert_eq!(call.args[1], "55-70");
        assert_eq!(call.args[3], "2");
        assert!(call.has_arg("--skip-if-larger"));
    }

    #[tokio::test]
    async fn test_png_no_gain_keeps_original() {
        let fx = fixture(&["pngquant", "oxipng"], |_| failure(PNGQUANT_NO_GAIN, ""));
        let src = source(&fx, "a.png", 500);
        let dst = fx.work.path().join("out.png");

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(result.is_kept_original());
        assert_eq!(fx.invoker.tools_called(), vec!["pngquant"]);
    }

    #[tokio::test]
    async fn test_png_falls_back_to_lossless_optimizer() {
        let fx = fixture(&["pngquant", "oxipng"], |call| {
            if call.tool == "pngquant" {
                failure(99, "quality too low")
            } else {
                call.write_output(450)
            }
        });
        let src = source(&fx, "a.png", 500);
        let dst = fx.work.path().join("out.png");
        let options = CompressionOptions {
            profile: Profile::Strong,
            ..Default::default()
        };

        let result = fx.registry.compress_file(&src, &dst, &options).await;
        assert_eq!(result.engine, "oxipng");
        assert_eq!(fx.invoker.tools_called(), vec!["pngquant", "oxipng"]);
        assert_eq!(fx.invoker.calls()[1].args[..2], ["-o".to_string(), "6".to_string()]);
    }

    #[tokio::test]
    async fn test_png_lossless_skips_pngquant() {
        let fx = fixture(&["pngquant", "optipng"], |call| call.write_output(450));
        let src = source(&fx, "a.png", 500);
        let options = CompressionOptions {
            lossless: true,
            ..Default::default()
        };

        let result = fx
            .registry
            .compress_file(&src, &fx.work.path().join("out.png"), &options)
            .await;
        assert_eq!(result.engine, "optipng");
        assert_eq!(fx.invoker.calls()[0].args[0], "-o2");
    }

    #[tokio::test]
    async fn test_gif_retries_without_lossy_after_failure() {
        let fx = fixture(&["gifsicle"], |call| {
            if call.has_arg("--lossy") {
                failure(1, "gifsicle: lossy not supported")
            } else {
                call.write_output(400)
            }
        });
        let src = source(&fx, "a.gif", 500);

        let result = fx
            .registry
            .compress_file(&src, &fx.work.path().join("out.gif"), &CompressionOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.output_size, 400);
        let calls = fx.invoker.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].has_arg("--lossy"));
        assert!(!calls[1].has_arg("--lossy"));
    }

    #[tokio::test]
    async fn test_gif_aggressive_retry_kept_when_smaller() {
        let fx = fixture(&["gifsicle"], |call| {
            let calls_lossy_40 = call.args.iter().any(|a| a == "--lossy=40");
            call.write_output(if calls_lossy_40 { 600 } else { 350 })
        });
        let src = source(&fx, "a.gif", 500);
        let dst = fx.work.path().join("out.gif");

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.output_size, 350);
        assert_eq!(std::fs::metadata(&dst).unwrap().len(), 350);

        let calls = fx.invoker.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].has_arg("--lossy=60"));
    }

    #[tokio::test]
    async fn test_gif_aggressive_retry_discarded_when_not_smaller() {
        let fx = fixture(&["gifsicle"], |call| call.write_output(600));
        let src = source(&fx, "a.gif", 500);
        let dst = fx.work.path().join("out.gif");

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.output_size, 600);
        assert_eq!(fx.invoker.calls().len(), 2);
        let leftovers = std::fs::read_dir(fx.work.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with(".imgcompress_tmp_"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_gif_aggressive_retry_uncopyable_keeps_first_result() {
        let out = TempDir::new().unwrap();
        let dst = out.path().join("out.gif");
        let blocked = dst.clone();
        let fx = fixture(&["gifsicle"], move |call| {
            if call.has_arg("--lossy=40") {
                return call.write_output(600);
            }
            // Destination turns into a directory before the retry output is copied over
            std::fs::remove_file(&blocked).unwrap();
            std::fs::create_dir(&blocked).unwrap();
            call.write_output(350)
        });
        let src = source(&fx, "a.gif", 500);

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.output_size, 600);
        assert_eq!(result.message, "compressed");
        assert_eq!(fx.invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_conversion_to_gif_spawns_nothing() {
        let fx = fixture(&["gifsicle", "cjpeg"], |call| call.write_output(1));
        let src = source(&fx, "a.jpg", 500);
        let dst = fx.work.path().join("a.gif");

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(!result.success);
        assert!(result.message.contains("not supported"));
        assert!(fx.invoker.calls().is_empty());
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn test_webp_lossless_and_lossy_args() {
        let fx = fixture(&["cwebp"], |call| call.write_output(100));
        let src = source(&fx, "a.png", 500);

        let lossless = CompressionOptions {
            lossless: true,
            ..Default::default()
        };
        fx.registry
            .compress_file(&src, &fx.work.path().join("l.webp"), &lossless)
            .await;
        fx.registry
            .compress_file(&src, &fx.work.path().join("q.webp"), &CompressionOptions::default())
            .await;

        let calls = fx.invoker.calls();
        assert_eq!(calls[0].args[0], "-lossless");
        assert_eq!(calls[1].args[..2], ["-q".to_string(), "80".to_string()]);
    }

    #[tokio::test]
    async fn test_webp_to_jpeg_goes_through_ppm() {
        let fx = fixture(&["dwebp", "cjpeg"], |call| call.write_output(200));
        let src = source(&fx, "a.webp", 500);
        let dst = fx.work.path().join("a.jpg");

        let result = fx.registry.compress_file(&src, &dst, &CompressionOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.engine, "dwebp+mozjpeg");
        let calls = fx.invoker.calls();
        assert_eq!(fx.invoker.tools_called(), vec!["dwebp", "cjpeg"]);
        assert!(calls[0].has_arg("-ppm"));
        assert_eq!(calls[1].args.last(), calls[0].output_path().map(|p| path_arg(&p)).as_ref());
    }

    #[tokio::test]
    async fn test_cross_format_without_pipeline_is_rejected() {
        let fx = fixture(&["cjpeg", "oxipng"], |call| call.write_output(1));
        let src = source(&fx, "a.png", 500);

        let result = fx
            .registry
            .compress_file(&src, &fx.work.path().join("a.jpg"), &CompressionOptions::default())
            .await;
        assert!(!result.success);
        assert!(result.message.contains("conversion pipeline"));
    }

    #[test]
    fn test_engine_status() {
        let (_dir, locator) = tool_dir(&["pngquant", "cwebp", "jpegtran"]);
        let registry = EngineRegistry::new(locator, Arc::new(ProcessInvoker), EngineSettings::default());

        let lossy = registry.engine_status(false);
        assert_eq!(lossy[0], (ImageKind::Jpg, ENGINE_BUILTIN.to_string()));
        assert_eq!(lossy[1], (ImageKind::Png, "pngquant".to_string()));
        assert_eq!(lossy[3], (ImageKind::Webp, "cwebp".to_string()));

        let lossless = registry.engine_status(true);
        assert_eq!(lossless[0], (ImageKind::Jpg, "jpegtran".to_string()));
        assert_eq!(lossless[1], (ImageKind::Png, ENGINE_BUILTIN.to_string()));
    }
}
