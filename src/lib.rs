//! # imgcompress Library
//!
//! Modulo principale della libreria che espone le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare del compressore
//! - Espone i tipi principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri front-end
//!
//! ## Architettura dei moduli:
//! - `config`: Opzioni di compressione, impostazioni engine, file di configurazione
//! - `error`: Tipi di errore per singolo file
//! - `platform` / `tool_resolver`: Rilevamento piattaforma e ricerca dei tool esterni
//! - `invoker`: Esecuzione dei tool con timeout
//! - `format` / `tuning`: Formati immagine e parametri per profilo
//! - `engine_registry`: Scelta ed esecuzione dell'engine per formato
//! - `resize` / `conversion`: Codec interno e pipeline di conversione
//! - `optimizer`: Job per file e scheduler del batch
//! - `events`, `json_output`, `progress`: Eventi verso il chiamante e loro rendering
//!
//! ## Utilizzo:
//! ```no_run
//! use imgcompress::{events, BatchScheduler, CompressionOptions, EngineRegistry, FormatFilter};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let (sender, _receiver) = events::channel();
//! let registry = Arc::new(EngineRegistry::with_settings(Default::default()));
//! let scheduler = BatchScheduler::new(registry, CompressionOptions::default(), FormatFilter::default(), sender);
//! let summary = scheduler.run_directory(Path::new("photos"), Path::new("compressed")).await;
//! println!("{} succeeded", summary.succeeded);
//! # }
//! ```

pub mod config;
pub mod conversion;
pub mod engine_registry;
pub mod error;
pub mod events;
pub mod file_manager;
pub mod format;
pub mod invoker;
pub mod json_output;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod resize;
pub mod tool_resolver;
pub mod tuning;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::{CompressionOptions, Config, EngineSettings, FormatFilter, OutputFormat, Profile, ResizeMode};
pub use engine_registry::{CompressionResult, EngineRegistry};
pub use error::{CompressError, CompressResult};
pub use events::{BatchEvent, EventReceiver, EventSender};
pub use format::ImageKind;
pub use invoker::{ExitState, ProcessInvoker, ToolInvoker, ToolOutput};
pub use optimizer::{BatchScheduler, BatchSummary, TaskOutcome};
pub use tool_resolver::ToolLocator;
