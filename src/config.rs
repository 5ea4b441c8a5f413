//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione di un batch di compressione.
//!
//! ## Responsabilità:
//! - Definisce `CompressionOptions`, immutabile per tutto il batch
//! - Definisce `EngineSettings` (timeout dei tool, marker di corruzione)
//! - Definisce il filtro formati (`FormatFilter`) applicato ai file in input
//! - Fornisce validazione dei parametri e valori di default sensati
//! - Supporta caricamento/salvataggio da/verso file JSON
//!
//! ## Parametri principali:
//! - `quality`: Qualità 1-100 (default: 80), poi corretta dal profilo
//! - `profile`: High / Balanced / Strong (default: High)
//! - `output_format`: Original / Jpg / Png / Webp / Gif (default: Original)
//! - `concurrency`: Numero di worker (default: core logici - 1)
//! - `resize_enabled` + `target_width` x `target_height` + `resize_mode`
//!
//! ## Esempio:
//! ```rust
//! use imgcompress::config::{CompressionOptions, Profile};
//!
//! let options = CompressionOptions {
//!     quality: 85,
//!     profile: Profile::Strong,
//!     ..Default::default()
//! };
//! options.validate().unwrap();
//! ```

use crate::error::CompressError;
use crate::format::ImageKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Named aggressiveness preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    High,
    Balanced,
    Strong,
}

/// Requested output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the real format of each source
    #[default]
    Original,
    Jpg,
    Png,
    Webp,
    Gif,
}

impl OutputFormat {
    /// Target format for a source whose real format is `source`
    pub fn resolve(&self, source: ImageKind) -> ImageKind {
        match self {
            Self::Original => source,
            Self::Jpg => ImageKind::Jpg,
            Self::Png => ImageKind::Png,
            Self::Webp => ImageKind::Webp,
            Self::Gif => ImageKind::Gif,
        }
    }
}

/// How the target box is applied when resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    #[default]
    None,
    /// Scale to fit inside the box, aspect ratio preserved
    Fit,
    /// Scale to cover the box, then center-crop to exact size
    Crop,
}

/// Options for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Avoid any visual-quality loss
    pub lossless: bool,
    /// Quality (1-100) before profile adjustment
    pub quality: u8,
    pub profile: Profile,
    pub output_format: OutputFormat,
    /// Worker count; `None` means logical cores - 1
    pub concurrency: Option<usize>,
    pub resize_enabled: bool,
    pub target_width: u32,
    pub target_height: u32,
    pub resize_mode: ResizeMode,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            lossless: false,
            quality: 80,
            profile: Profile::High,
            output_format: OutputFormat::Original,
            concurrency: None,
            resize_enabled: false,
            target_width: 1920,
            target_height: 1080,
            resize_mode: ResizeMode::None,
        }
    }
}

impl CompressionOptions {
    /// Validate option ranges
    pub fn validate(&self) -> std::result::Result<(), CompressError> {
        if self.quality == 0 || self.quality > 100 {
            return Err(CompressError::Validation("Quality must be between 1 and 100".to_string()));
        }

        if self.concurrency == Some(0) {
            return Err(CompressError::Validation("Number of workers must be greater than 0".to_string()));
        }

        if self.resize_enabled {
            if self.target_width == 0 || self.target_height == 0 {
                return Err(CompressError::Validation("Resize target must be at least 1x1".to_string()));
            }
            if self.resize_mode == ResizeMode::None {
                return Err(CompressError::Validation("Resize is enabled but no resize mode was chosen".to_string()));
            }
        }

        Ok(())
    }

    /// Whether a resize will actually be applied
    pub fn wants_resize(&self) -> bool {
        self.resize_enabled && self.resize_mode != ResizeMode::None
    }

    /// Worker count for the pool
    pub fn effective_concurrency(&self) -> usize {
        match self.concurrency {
            Some(workers) => workers.max(1),
            None => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                cores.saturating_sub(1).max(1)
            }
        }
    }
}

/// Settings of the engine layer that are not per-batch choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Wall-clock limit for one external tool run, in seconds
    pub tool_timeout_secs: u64,
    /// Case-insensitive phrases that mark a source as unreadable in tool output
    pub corruption_markers: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 180,
            corruption_markers: [
                "corrupt",
                "truncated",
                "premature end",
                "invalid",
                "bad data",
                "not a jpeg",
                "not a png",
                "bad huffman",
                "decode error",
            ]
            .iter()
            .map(|marker| marker.to_string())
            .collect(),
        }
    }
}

impl EngineSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Whether tool diagnostics look like a damaged source
    pub fn looks_corrupt(&self, diagnostics: &str) -> bool {
        let lower = diagnostics.to_lowercase();
        self.corruption_markers
            .iter()
            .any(|marker| !marker.is_empty() && lower.contains(&marker.to_lowercase()))
    }
}

/// Extension allow-list applied to batch inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatFilter {
    extensions: BTreeSet<String>,
}

impl Default for FormatFilter {
    fn default() -> Self {
        Self::parse(&["jpg", "jpeg", "png", "gif", "webp"])
    }
}

impl FormatFilter {
    /// Build a filter from extension names; unknown names are ignored
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Self {
        let extensions = names
            .iter()
            .map(|name| name.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|name| ImageKind::from_extension(name).is_some())
            .collect();
        Self { extensions }
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Whether a path's extension is allowed
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Everything that can live in the JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub options: CompressionOptions,
    pub engine: EngineSettings,
    pub formats: FormatFilter,
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.options.validate()?;

        if self.engine.tool_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Tool timeout must be greater than 0"));
        }

        if self.formats.is_empty() {
            return Err(anyhow::anyhow!("Select at least one image format"));
        }

        Ok(())
    }

    /// Default config file location (`<config dir>/imgcompress/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("imgcompress").join("config.json"))
    }

    /// Load configuration from file; a missing file yields defaults
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
