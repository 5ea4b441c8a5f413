//! # Image Format Module
//!
//! Identifica il formato di un'immagine in due modi:
//! - dall'estensione del file (normalizzata, `jpeg` → `jpg`)
//! - dal contenuto reale (sniffing dei magic bytes con `image::guess_format`)
//!
//! L'estensione può mentire: il job confronta i due risultati e, se
//! diversi, lavora sul formato reale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Bytes read from the head of a file for content sniffing
const SNIFF_LEN: usize = 32;

/// The four formats the compressor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    /// Parse a (case-insensitive) extension, `jpeg` is folded into `jpg`
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Format implied by a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical extension written to output files
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    /// Matching `image` crate format
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Gif => image::ImageFormat::Gif,
            Self::Webp => image::ImageFormat::WebP,
        }
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }

    /// Whether the built-in `image` codec can write this format
    pub fn builtin_encodable(&self) -> bool {
        !matches!(self, Self::Webp)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Detect the real format from the file's leading bytes.
///
/// Returns `None` for unreadable files and for content that is none of the
/// four supported formats; callers then trust the extension.
pub fn sniff(path: &Path) -> Option<ImageKind> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    let file = std::fs::File::open(path).ok()?;
    file.take(SNIFF_LEN as u64).read_to_end(&mut header).ok()?;
    sniff_bytes(&header)
}

/// Detect the format of an in-memory header
pub fn sniff_bytes(header: &[u8]) -> Option<ImageKind> {
    image::guess_format(header)
        .ok()
        .and_then(ImageKind::from_image_format)
}
