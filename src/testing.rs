//! Scripted tool doubles shared by the unit tests.

use crate::invoker::{ExitState, ToolInvoker, ToolOutput};
use crate::tool_resolver::ToolLocator;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// File stem of the program (`cjpeg`, `pngquant`, ...)
    pub tool: String,
    pub args: Vec<String>,
}

impl ToolCall {
    /// Path following the last output flag (oxipng also uses `-o` for its level)
    pub fn output_path(&self) -> Option<PathBuf> {
        const FLAGS: &[&str] = &["-o", "-outfile", "--output", "--out", "-out"];
        self.args
            .iter()
            .rposition(|arg| FLAGS.contains(&arg.as_str()))
            .and_then(|idx| self.args.get(idx + 1))
            .map(PathBuf::from)
    }

    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|arg| arg == needle || arg.starts_with(&format!("{}=", needle)))
    }

    /// Write `bytes` bytes to the output path and report success
    pub fn write_output(&self, bytes: usize) -> ToolOutput {
        if let Some(path) = self.output_path() {
            std::fs::write(path, vec![0u8; bytes]).unwrap();
        }
        ToolOutput::new(ExitState::Code(0), "")
    }
}

type Behaviour = Box<dyn Fn(&ToolCall) -> ToolOutput + Send + Sync>;

/// `ToolInvoker` answering from a closure and recording every call
pub struct FakeInvoker {
    behaviour: Behaviour,
    calls: Mutex<Vec<ToolCall>>,
    delay: Duration,
}

impl FakeInvoker {
    pub fn new(behaviour: impl Fn(&ToolCall) -> ToolOutput + Send + Sync + 'static) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Make every run take at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tools_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.tool).collect()
    }
}

#[async_trait]
impl ToolInvoker for FakeInvoker {
    async fn run(&self, program: &Path, args: &[String], _timeout: Duration) -> std::io::Result<ToolOutput> {
        let call = ToolCall {
            tool: program
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            args: args.to_vec(),
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let output = (self.behaviour)(&call);
        self.calls.lock().unwrap().push(call);
        Ok(output)
    }
}

/// Directory of placeholder tool files plus a locator restricted to it
pub fn tool_dir(tools: &[&str]) -> (TempDir, ToolLocator) {
    let dir = TempDir::new().unwrap();
    let suffix = crate::platform::Platform::current().exe_suffix();
    for tool in tools {
        std::fs::write(dir.path().join(format!("{}{}", tool, suffix)), b"").unwrap();
    }
    let locator = ToolLocator::with_dirs(vec![dir.path().to_path_buf()]);
    (dir, locator)
}

/// Failing tool output with the given diagnostics
pub fn failure(code: i32, diagnostics: &str) -> ToolOutput {
    ToolOutput::new(ExitState::Code(code), diagnostics)
}

/// Write a real RGB image of the given size and format
pub fn write_image(path: &Path, width: u32, height: u32, format: image::ImageFormat) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save_with_format(path, format).unwrap();
}

/// Write a looping GIF with `frames` differently coloured frames
pub fn write_animated_gif(path: &Path, width: u32, height: u32, frames: usize) {
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Frame, Rgba, RgbaImage};

    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite).unwrap();
    let frames = (0..frames).map(|i| {
        let shade = (i * 60 % 256) as u8;
        let buffer = RgbaImage::from_fn(width, height, |x, _| Rgba([shade, (x * 4 % 256) as u8, 255 - shade, 255]));
        Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(100, 1))
    });
    encoder.encode_frames(frames).unwrap();
}

/// Decoded frame count and first-frame size of a GIF
pub fn gif_frames(path: &Path) -> (usize, (u32, u32)) {
    use image::AnimationDecoder;

    let file = std::io::BufReader::new(std::fs::File::open(path).unwrap());
    let frames = image::codecs::gif::GifDecoder::new(file)
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    let size = frames.first().map(|f| f.buffer().dimensions()).unwrap_or_default();
    (frames.len(), size)
}
