//! Side channel for delivery failures.
//!
//! Drops and skipped ticks are never reported back to whoever sent the
//! payload. They go here instead, as `{"type": "error", "message": ...}`
//! records that a supervisor can log or forward.

use std::sync::mpsc;

use serde::Serialize;
use tracing::debug;

use crate::Relay::Structs::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCause {
    LockTimeout,
    QueueFull,
    PayloadTooLarge,
    CorruptSlot,
}

impl DiagnosticCause {
    fn message(self) -> &'static str {
        match self {
            DiagnosticCause::LockTimeout => "Lock timeout",
            DiagnosticCause::QueueFull => "Queue full",
            DiagnosticCause::PayloadTooLarge => "Payload too large",
            DiagnosticCause::CorruptSlot => "Corrupt slot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Always `"error"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub cause: DiagnosticCause,
    /// Producer platform, `None` when raised by the pump.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Diagnostic {
    pub fn new(cause: DiagnosticCause, platform: Option<Platform>) -> Self {
        Self {
            kind: "error",
            message: cause.message().to_owned(),
            cause,
            platform,
        }
    }
}

/// Sending half of the diagnostic channel. Cheap to clone; sending never
/// blocks and never fails, even after the receiver is gone.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSender {
    tx: Option<mpsc::Sender<Diagnostic>>,
}

impl DiagnosticSender {
    /// A sender that drops everything.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        if let Some(tx) = &self.tx {
            if tx.send(diagnostic).is_err() {
                debug!("diagnostic receiver is gone");
            }
        }
    }
}

pub fn channel() -> (DiagnosticSender, mpsc::Receiver<Diagnostic>) {
    let (tx, rx) = mpsc::channel();
    (DiagnosticSender { tx: Some(tx) }, rx)
}
