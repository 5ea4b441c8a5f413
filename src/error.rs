//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore del motore di compressione.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` per categorizzare gli errori di un singolo file
//! - Fornisce messaggi brevi, pronti per la riga di log del file
//! - Integra con `thiserror` per la conversione automatica da `io::Error` e `ImageError`
//!
//! ## Categorie di errori:
//! - `ToolMissing`: tool esterno non trovato (situazione normale, non fatale)
//! - `ToolTimeout`: il processo ha superato il limite di tempo ed è stato terminato
//! - `ToolFailure`: exit code diverso da zero, con l'output diagnostico
//! - `UnsupportedConversion`: combinazione formato/resize non ammessa
//! - `Decode`: il codec interno non riesce a leggere o scrivere l'immagine
//! - `Io`: file temporanei, directory di output, copie
//! - `Validation`: opzioni non valide
//!
//! Nessuno di questi errori interrompe il batch: il job li trasforma in un
//! `TaskOutcome` fallito.

/// Errors raised while compressing one file
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("missing engine: {0}")]
    ToolMissing(String),

    #[error("{tool} timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("{tool} failed: {detail}")]
    ToolFailure { tool: String, detail: String },

    #[error("{0}")]
    UnsupportedConversion(String),

    #[error("image codec error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid options: {0}")]
    Validation(String),
}

pub type CompressResult<T> = std::result::Result<T, CompressError>;
