//! # Format Conversion Pipeline
//!
//! Prepara un file intermedio quando il job non può passare la sorgente
//! direttamente all'engine registry.
//!
//! ## Modalità:
//! - **Relabel**: l'estensione mente sul contenuto e non serve resize. I byte
//!   vengono copiati in un file temporaneo con l'estensione reale, senza
//!   decodifica (nessuna perdita di generazione)
//! - **Transcode**: decodifica con il crate `image`, resize opzionale,
//!   ricodifica nel formato di destinazione
//!
//! In entrambi i casi il file temporaneo passa poi all'engine registry; se il
//! registry fallisce, il file intermedio diventa l'output.
//!
//! I file temporanei sono creati accanto all'output (fallback sulla temp dir
//! di sistema) e rimossi al drop.

use crate::config::CompressionOptions;
use crate::engine_registry::{CompressionResult, EngineRegistry, ENGINE_BUILTIN, ENGINE_ORIGINAL};
use crate::error::{CompressError, CompressResult};
use crate::file_manager::FileManager;
use crate::format::ImageKind;
use crate::resize::{self, ResizeSpec};
use crate::tuning;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{AnimationDecoder, ColorType, DynamicImage, Frame, ImageEncoder};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// What the pipeline has to do with a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Copy bytes under the real extension
    Relabel,
    /// Decode, optionally resize, re-encode
    Transcode,
}

/// Decode an image, trusting `kind` over the file extension
pub fn decode(path: &Path, kind: ImageKind) -> CompressResult<DynamicImage> {
    let mut reader = image::io::Reader::open(path)?;
    reader.set_format(kind.image_format());
    Ok(reader.decode()?)
}

/// Encode with the built-in codec.
///
/// JPEG uses `quality`; PNG and GIF are lossless containers here.
pub fn encode(img: &DynamicImage, kind: ImageKind, path: &Path, quality: u8) -> CompressResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    match kind {
        ImageKind::Jpg => {
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
        }
        ImageKind::Png => {
            let encoder = PngEncoder::new_with_quality(&mut writer, CompressionType::Best, FilterType::Adaptive);
            if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
            } else {
                let rgb = img.to_rgb8();
                encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
            }
        }
        ImageKind::Gif => {
            let rgba = img.to_rgba8();
            let mut encoder = GifEncoder::new(&mut writer);
            encoder.encode(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
        }
        ImageKind::Webp => {
            return Err(CompressError::UnsupportedConversion(
                "the built-in codec cannot write WebP".to_string(),
            ));
        }
    }

    std::io::Write::flush(&mut writer)?;
    Ok(())
}

/// Re-encode every frame of a GIF, keeping delays and looping forever
pub fn reencode_gif_frames(source: &Path, destination: &Path, resize: Option<ResizeSpec>) -> CompressResult<usize> {
    let decoder = GifDecoder::new(BufReader::new(File::open(source)?))?;
    let frames = decoder.into_frames().collect_frames()?;
    let frames: Vec<Frame> = match resize {
        Some(spec) => frames
            .into_iter()
            .map(|frame| {
                let delay = frame.delay();
                let resized = spec.apply(DynamicImage::ImageRgba8(frame.into_buffer())).to_rgba8();
                Frame::from_parts(resized, 0, 0, delay)
            })
            .collect(),
        None => frames,
    };
    let count = frames.len();

    let mut writer = BufWriter::new(File::create(destination)?);
    {
        let mut encoder = GifEncoder::new(&mut writer);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(frames)?;
    }
    std::io::Write::flush(&mut writer)?;
    Ok(count)
}

/// Re-encode `source` as `kind` into `destination` with the built-in codec.
///
/// GIF to GIF keeps every animation frame.
pub async fn reencode(
    source: PathBuf,
    source_kind: ImageKind,
    kind: ImageKind,
    destination: PathBuf,
    quality: u8,
    resize: Option<ResizeSpec>,
) -> CompressResult<()> {
    tokio::task::spawn_blocking(move || {
        if source_kind == ImageKind::Gif && kind == ImageKind::Gif {
            let frames = reencode_gif_frames(&source, &destination, resize)?;
            debug!("Re-encoded {} GIF frames", frames);
            return Ok(());
        }

        let img = decode(&source, source_kind)?;
        let img = match resize {
            Some(spec) => {
                let before = resize::dimensions(&img);
                let img = spec.apply(img);
                debug!("Resized {:?} -> {:?}", before, resize::dimensions(&img));
                img
            }
            None => img,
        };
        encode(&img, kind, &destination, quality)
    })
    .await
    .map_err(|e| CompressError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

/// Copy `source` into a fresh temp file carrying `kind`'s extension
pub async fn stage_relabelled(source: &Path, kind: ImageKind, near: &Path) -> CompressResult<TempPath> {
    let staged = FileManager::temp_path(near, kind.extension())?;
    tokio::fs::copy(source, &staged).await?;
    Ok(staged)
}

/// Conversion pipeline bound to an engine registry
pub struct ConversionPipeline<'a> {
    registry: &'a EngineRegistry,
}

impl<'a> ConversionPipeline<'a> {
    pub fn new(registry: &'a EngineRegistry) -> Self {
        Self { registry }
    }

    /// Run `mode` for `source` whose real format is `real`, writing `destination`.
    ///
    /// `Err` means nothing could be produced (decode or temp file failure).
    pub async fn run(
        &self,
        mode: PipelineMode,
        source: &Path,
        real: ImageKind,
        destination: &Path,
        options: &CompressionOptions,
    ) -> CompressResult<CompressionResult> {
        let target = ImageKind::from_path(destination).ok_or_else(|| {
            CompressError::UnsupportedConversion(format!("unknown output format: {}", destination.display()))
        })?;
        let near = destination.parent().unwrap_or_else(|| Path::new("."));
        let source_size = FileManager::file_size(source).await;

        let (intermediate, fallback_engine, fallback_message) = match mode {
            PipelineMode::Relabel => {
                let staged = stage_relabelled(source, real, near).await?;
                (staged, ENGINE_ORIGINAL, "written as real format")
            }
            PipelineMode::Transcode => {
                if !target.builtin_encodable() {
                    return Err(CompressError::UnsupportedConversion(format!(
                        "{} cannot be produced by the conversion pipeline",
                        target
                    )));
                }
                let staged = FileManager::temp_path(near, target.extension())?;
                let quality = tuning::builtin_jpeg_quality(options.quality, options.profile, options.lossless);
                let resize = options
                    .wants_resize()
                    .then(|| ResizeSpec::new(options.resize_mode, options.target_width, options.target_height));
                reencode(source.to_path_buf(), real, target, staged.to_path_buf(), quality, resize).await?;
                (staged, ENGINE_BUILTIN, "converted")
            }
        };

        let mut result = self.registry.compress_file(&intermediate, destination, options).await;

        if !result.success || result.is_kept_original() {
            debug!(
                "Registry did not improve the intermediate for {} ({}), using it as output",
                destination.display(),
                result.message
            );
            let written = FileManager::copy_original(&intermediate, destination).await?;
            return Ok(CompressionResult::compressed(
                fallback_engine,
                source_size,
                written,
                fallback_message,
            ));
        }

        result.original_size = source_size;
        result.output_size = FileManager::file_size(destination).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, ResizeMode};
    use crate::testing::{failure, gif_frames, tool_dir, write_animated_gif, write_image, FakeInvoker};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn registry(tools: &[&str], invoker: Arc<FakeInvoker>) -> (TempDir, EngineRegistry) {
        let (dir, locator) = tool_dir(tools);
        (dir, EngineRegistry::new(locator, invoker, EngineSettings::default()))
    }

    #[test]
    fn test_encode_decode_builtin_formats() {
        let temp = TempDir::new().unwrap();
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(16, 8, image::Rgb([200, 10, 10])));

        for kind in [ImageKind::Jpg, ImageKind::Png, ImageKind::Gif] {
            let path = temp.path().join(format!("x.{}", kind));
            encode(&img, kind, &path, 75).unwrap();
            assert_eq!(crate::format::sniff(&path), Some(kind));
            let back = decode(&path, kind).unwrap();
            assert_eq!(resize::dimensions(&back), (16, 8));
        }

        let err = encode(&img, ImageKind::Webp, &temp.path().join("x.webp"), 75).unwrap_err();
        assert!(matches!(err, CompressError::UnsupportedConversion(_)));
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();
        assert!(matches!(decode(&path, ImageKind::Png), Err(CompressError::Decode(_))));
    }

    #[tokio::test]
    async fn test_gif_reencode_keeps_every_frame() {
        let work = TempDir::new().unwrap();
        let source = work.path().join("anim.gif");
        write_animated_gif(&source, 32, 32, 4);

        let plain = work.path().join("plain.gif");
        reencode(source.clone(), ImageKind::Gif, ImageKind::Gif, plain.clone(), 75, None)
            .await
            .unwrap();
        assert_eq!(gif_frames(&plain), (4, (32, 32)));

        let small = work.path().join("small.gif");
        let spec = ResizeSpec::new(ResizeMode::Fit, 16, 16);
        reencode(source, ImageKind::Gif, ImageKind::Gif, small.clone(), 75, Some(spec))
            .await
            .unwrap();
        assert_eq!(gif_frames(&small), (4, (16, 16)));
    }

    #[tokio::test]
    async fn test_transcode_with_resize_hands_off_to_registry() {
        let invoker = Arc::new(FakeInvoker::new(|call| call.write_output(10)));
        let (_tools, registry) = registry(&["cjpeg"], invoker.clone());
        let work = TempDir::new().unwrap();
        let source = work.path().join("big.png");
        write_image(&source, 64, 32, image::ImageFormat::Png);
        let destination = work.path().join("big.jpg");

        let options = CompressionOptions {
            resize_enabled: true,
            resize_mode: ResizeMode::Fit,
            target_width: 16,
            target_height: 16,
            ..Default::default()
        };
        let result = ConversionPipeline::new(&registry)
            .run(PipelineMode::Transcode, &source, ImageKind::Png, &destination, &options)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.engine, "mozjpeg");
        assert_eq!(result.original_size, std::fs::metadata(&source).unwrap().len());
        assert_eq!(result.output_size, 10);

        // Intermediate was a real, resized JPEG at the time of the call and is gone now
        let staged = PathBuf::from(invoker.calls()[0].args.last().unwrap());
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_transcode_falls_back_to_intermediate() {
        let invoker = Arc::new(FakeInvoker::new(|_| failure(1, "boom")));
        let (_tools, registry) = registry(&["oxipng"], invoker);
        let work = TempDir::new().unwrap();
        let source = work.path().join("photo.jpg");
        write_image(&source, 24, 24, image::ImageFormat::Jpeg);
        let destination = work.path().join("photo.png");

        let result = ConversionPipeline::new(&registry)
            .run(
                PipelineMode::Transcode,
                &source,
                ImageKind::Jpg,
                &destination,
                &CompressionOptions::default(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.engine, ENGINE_BUILTIN);
        assert_eq!(result.message, "converted");
        assert_eq!(crate::format::sniff(&destination), Some(ImageKind::Png));
        assert_eq!(result.output_size, std::fs::metadata(&destination).unwrap().len());
    }

    #[tokio::test]
    async fn test_relabel_writes_real_format_on_failure() {
        let invoker = Arc::new(FakeInvoker::new(|_| failure(1, "boom")));
        let (_tools, registry) = registry(&["pngquant"], invoker.clone());
        let work = TempDir::new().unwrap();
        let source = work.path().join("liar.jpg");
        write_image(&source, 8, 8, image::ImageFormat::Png);
        let destination = work.path().join("liar.png");

        let result = ConversionPipeline::new(&registry)
            .run(
                PipelineMode::Relabel,
                &source,
                ImageKind::Png,
                &destination,
                &CompressionOptions::default(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.engine, ENGINE_ORIGINAL);
        assert_eq!(result.message, "written as real format");
        assert_eq!(std::fs::read(&destination).unwrap(), std::fs::read(&source).unwrap());
        assert!(invoker.calls()[0].args.last().unwrap().ends_with(".png"));
    }

    #[tokio::test]
    async fn test_transcode_unreadable_source_is_error() {
        let invoker = Arc::new(FakeInvoker::new(|call| call.write_output(1)));
        let (_tools, registry) = registry(&["cjpeg"], invoker.clone());
        let work = TempDir::new().unwrap();
        let source = work.path().join("bad.png");
        std::fs::write(&source, b"garbage").unwrap();

        let result = ConversionPipeline::new(&registry)
            .run(
                PipelineMode::Transcode,
                &source,
                ImageKind::Png,
                &work.path().join("bad.jpg"),
                &CompressionOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(CompressError::Decode(_))));
        assert!(invoker.calls().is_empty());
    }
}
