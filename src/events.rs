//! # Batch Events Module
//!
//! Canale di eventi dal core verso chi ha avviato il batch (CLI, GUI, test).
//! Il core non conosce nessuna UI: emette solo tre tipi di evento.

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Something the scheduler reports to its caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Human-readable narration line
    Log { message: String },
    /// Batch progress, 0..=100, non-decreasing
    Progress { percent: u8 },
    /// Terminal event, always the last one of a batch
    Finished {
        succeeded: usize,
        total_original_bytes: u64,
        total_output_bytes: u64,
        elapsed_ms: u64,
    },
}

impl BatchEvent {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    /// The terminal event of a batch that never started
    pub fn empty_finish() -> Self {
        Self::Finished {
            succeeded: 0,
            total_original_bytes: 0,
            total_output_bytes: 0,
            elapsed_ms: 0,
        }
    }
}

/// Cloneable sending half handed to the scheduler.
///
/// A dropped receiver is not an error: events are simply discarded.
#[derive(Clone)]
pub struct EventSender {
    inner: UnboundedSender<BatchEvent>,
}

impl EventSender {
    pub fn send(&self, event: BatchEvent) {
        let _ = self.inner.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(BatchEvent::log(message));
    }
}

pub struct EventReceiver {
    inner: UnboundedReceiver<BatchEvent>,
}

impl EventReceiver {
    /// Next event, `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<BatchEvent> {
        self.inner.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BatchEvent> {
        self.inner.try_recv().ok()
    }

    /// Everything already queued
    pub fn drain(&mut self) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { inner: tx }, EventReceiver { inner: rx })
}
