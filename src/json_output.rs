//! # JSON Output Module
//!
//! Output strutturato in JSON per la comunicazione con front-end esterni
//! (GUI, Electron, script). Una riga JSON per messaggio su stdout.
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio batch con la configurazione effettiva
//! - `log`, `progress`, `finished`: gli eventi del batch (`BatchEvent`)
//! - `error`: Errore che impedisce l'avvio del batch

use crate::config::{CompressionOptions, OutputFormat, Profile};
use crate::events::BatchEvent;
use serde::Serialize;
use std::path::PathBuf;

/// Messaggi emessi fuori dal batch vero e proprio
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        input: PathBuf,
        output_dir: PathBuf,
        config: JsonConfig,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub quality: u8,
    pub profile: Profile,
    pub lossless: bool,
    pub output_format: OutputFormat,
    pub workers: usize,
    pub resize: Option<(u32, u32)>,
}

/// Emette una riga JSON su stdout
pub fn emit<T: Serialize>(message: &T) {
    if let Ok(json) = serde_json::to_string(message) {
        println!("{}", json);
    }
}

pub fn emit_event(event: &BatchEvent) {
    emit(event);
}

impl JsonMessage {
    pub fn emit(&self) {
        emit(self);
    }

    pub fn start(input: PathBuf, output_dir: PathBuf, options: &CompressionOptions) -> Self {
        Self::Start {
            input,
            output_dir,
            config: JsonConfig::from(options),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

impl From<&CompressionOptions> for JsonConfig {
    fn from(options: &CompressionOptions) -> Self {
        Self {
            quality: options.quality,
            profile: options.profile,
            lossless: options.lossless,
            output_format: options.output_format,
            workers: options.effective_concurrency(),
            resize: options
                .wants_resize()
                .then_some((options.target_width, options.target_height)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_lines_carry_type_tag() {
        let json = serde_json::to_value(BatchEvent::Finished {
            succeeded: 2,
            total_original_bytes: 1_000_000,
            total_output_bytes: 800_000,
            elapsed_ms: 1500,
        })
        .unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["succeeded"], 2);
        assert_eq!(json["total_output_bytes"], 800_000);

        let json = serde_json::to_value(BatchEvent::log("a.png compressed")).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["message"], "a.png compressed");
    }

    #[test]
    fn test_start_message() {
        let options = CompressionOptions {
            concurrency: Some(3),
            ..Default::default()
        };
        let json = serde_json::to_value(JsonMessage::start(
            PathBuf::from("/in"),
            PathBuf::from("/out"),
            &options,
        ))
        .unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["config"]["workers"], 3);
        assert_eq!(json["config"]["profile"], "high");
        assert!(json["config"]["resize"].is_null());
    }

    #[test]
    fn test_error_message() {
        let json = serde_json::to_value(JsonMessage::error("bad options".to_string(), None)).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json["details"].is_null());
    }
}
