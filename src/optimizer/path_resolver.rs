//! # Path Resolution Module
//!
//! Centralizza il calcolo dei path di output.
//!
//! Il path di output rispecchia la posizione del sorgente sotto la root di
//! input, con l'estensione del formato di destinazione. Le collisioni si
//! risolvono con `stem(n).ext`: il nome viene riservato creando il file in
//! modo atomico, così due job concorrenti non scelgono mai lo stesso path e
//! nessun file esistente viene sovrascritto.

use crate::format::ImageKind;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tracing::debug;

/// Utility per calcolare i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Candidate output path, before collision avoidance
    pub fn get_output_path(
        source: &Path,
        input_root: &Path,
        output_root: &Path,
        target: ImageKind,
    ) -> io::Result<PathBuf> {
        let stem = source.file_stem().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid file name: {}", source.display()),
            )
        })?;
        let filename = format!("{}.{}", stem.to_string_lossy(), target.extension());

        Ok(output_root.join(Self::relative_dir(source, input_root)).join(filename))
    }

    /// Directory of `source` relative to `input_root` (empty when outside it)
    pub fn relative_dir(source: &Path, input_root: &Path) -> PathBuf {
        let relative = source.strip_prefix(input_root).ok().map(Path::to_path_buf).or_else(|| {
            let source = source.canonicalize().ok()?;
            let root = input_root.canonicalize().ok()?;
            source.strip_prefix(root).ok().map(Path::to_path_buf)
        });

        match relative {
            Some(rel) => rel.parent().map(Path::to_path_buf).unwrap_or_default(),
            None => {
                debug!(
                    "{} is outside {}, writing to output root",
                    source.display(),
                    input_root.display()
                );
                PathBuf::new()
            }
        }
    }

    /// `stem(n).ext` variant of a path
    pub fn numbered(candidate: &Path, index: u32) -> PathBuf {
        let stem = candidate
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match candidate.extension() {
            Some(ext) => format!("{}({}).{}", stem, index, ext.to_string_lossy()),
            None => format!("{}({})", stem, index),
        };
        candidate.with_file_name(name)
    }

    /// Claim the first free path among `candidate`, `stem(1).ext`, `stem(2).ext`, ...
    ///
    /// The claimed path exists as an empty file on return. `source` is never
    /// claimed even if it were missing.
    pub async fn reserve_unique(candidate: &Path, source: &Path) -> io::Result<PathBuf> {
        let source_abs = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
        let mut index = 0u32;

        loop {
            let path = if index == 0 {
                candidate.to_path_buf()
            } else {
                Self::numbered(candidate, index)
            };
            index += 1;

            if path == source || path == source_abs {
                continue;
            }

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(_) => {
                    debug!("Reserved output path {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Crea le directory parent se necessario
    pub async fn ensure_parent_dirs(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}
