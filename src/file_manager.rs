//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file usate dal batch.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva delle immagini in una directory, filtrata per estensione
//! - Lettura delle dimensioni dei file (0 se il file non esiste)
//! - Copia verbatim dell'originale (esito "kept original")
//! - File temporanei con nome univoco accanto all'output
//! - Utilità per calcoli dimensioni e percentuali
//!
//! ## Esempio:
//! ```rust,no_run
//! use imgcompress::config::FormatFilter;
//! use imgcompress::file_manager::FileManager;
//! use std::path::Path;
//!
//! let files = FileManager::find_image_files(Path::new("/path/to/photos"), &FormatFilter::default());
//! println!("{} images", files.len());
//! ```

use crate::config::FormatFilter;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Prefix of every temporary file the engine creates
pub const TEMP_PREFIX: &str = ".imgcompress_tmp_";

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all allowed image files under a directory, sorted by path
    pub fn find_image_files(input_dir: &Path, filter: &FormatFilter) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| !Self::is_temp_file(path) && filter.accepts(path))
            .collect();
        files.sort();
        files
    }

    /// Keep only the allowed files of an explicit list
    pub fn filter_files(files: &[PathBuf], filter: &FormatFilter) -> Vec<PathBuf> {
        files
            .iter()
            .filter(|path| filter.accepts(path))
            .cloned()
            .collect()
    }

    fn is_temp_file(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with(TEMP_PREFIX))
            .unwrap_or(false)
    }

    /// Size of a file in bytes, 0 when it does not exist
    pub async fn file_size(path: &Path) -> u64 {
        fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    }

    /// Replace `destination` with a verbatim copy of `source`
    pub async fn copy_original(source: &Path, destination: &Path) -> io::Result<u64> {
        if fs::metadata(destination).await.is_ok() {
            fs::remove_file(destination).await?;
        }
        fs::copy(source, destination).await
    }

    /// Remove a partial output, ignoring a file that is already gone
    pub async fn remove_partial(path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("Could not remove partial output {}: {}", path.display(), e);
            }
        }
    }

    /// Reserve a uniquely named temporary path with the given extension.
    ///
    /// Created next to `near` when possible, in the system temp directory
    /// otherwise. The file is deleted when the returned `TempPath` drops.
    pub fn temp_path(near: &Path, extension: &str) -> io::Result<TempPath> {
        let suffix = format!(".{}", extension);
        let builder = |dir: &Path| {
            tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(&suffix)
                .tempfile_in(dir)
                .map(|file| file.into_temp_path())
        };

        match builder(near) {
            Ok(path) => Ok(path),
            Err(e) => {
                debug!(
                    "Temp file in {} failed ({}), using system temp dir",
                    near.display(),
                    e
                );
                builder(&std::env::temp_dir())
            }
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_image_files_filters_and_recurses() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("one.jpg"), b"x").unwrap();
        std::fs::write(temp.path().join("two.JPEG"), b"x").unwrap();
        std::fs::write(nested.join("three.png"), b"x").unwrap();
        std::fs::write(nested.join("notes.txt"), b"x").unwrap();
        std::fs::write(nested.join(".imgcompress_tmp_abc.png"), b"x").unwrap();

        let files = FileManager::find_image_files(temp.path(), &FormatFilter::default());
        assert_eq!(files.len(), 3);

        let only_png = FormatFilter::parse(&["png"]);
        let files = FileManager::find_image_files(temp.path(), &only_png);
        assert_eq!(files, vec![nested.join("three.png")]);
    }

    #[tokio::test]
    async fn test_copy_original_and_sizes() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src.png");
        let destination = temp.path().join("dst.png");
        std::fs::write(&source, vec![7u8; 1234]).unwrap();
        std::fs::write(&destination, vec![1u8; 99]).unwrap();

        let copied = FileManager::copy_original(&source, &destination).await.unwrap();
        assert_eq!(copied, 1234);
        assert_eq!(FileManager::file_size(&destination).await, 1234);
        assert_eq!(FileManager::file_size(&temp.path().join("missing")).await, 0);

        FileManager::remove_partial(&destination).await;
        FileManager::remove_partial(&destination).await;
        assert!(!destination.exists());
    }

    #[test]
    fn test_temp_path_is_unique_and_cleaned() {
        let temp = TempDir::new().unwrap();
        let first = FileManager::temp_path(temp.path(), "png").unwrap();
        let second = FileManager::temp_path(temp.path(), "png").unwrap();
        assert_ne!(first.to_path_buf(), second.to_path_buf());
        assert!(first.to_string_lossy().ends_with(".png"));

        let kept = first.to_path_buf();
        drop(first);
        assert!(!kept.exists());
    }

    #[test]
    fn test_temp_path_falls_back_to_system_dir() {
        let path = FileManager::temp_path(Path::new("/nonexistent/imgcompress/dir"), "jpg").unwrap();
        assert!(path.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(1048576), "1.00 MB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(1000, 800), 20.0);
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
    }
}
