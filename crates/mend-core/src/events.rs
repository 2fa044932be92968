//! Per-session event stream.
//!
//! Every stage takes an [`EmitHandle`] threaded down from the orchestrator.
//! The handle wraps an optional unbounded sender so library callers that do
//! not care about live progress can pass a disabled handle and pay nothing.
//! There is no global or thread-local channel anywhere.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::types::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventTag {
    Info,
    Error,
    Agent,
    Patch,
    Pass,
    Bug,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealEvent {
    Log { tag: EventTag, message: String },
    Done { status: SessionStatus },
}

/// Cheap clonable emitter handed to every stage of a session.
#[derive(Clone, Default)]
pub struct EmitHandle {
    tx: Option<UnboundedSender<HealEvent>>,
}

impl EmitHandle {
    pub fn new(tx: UnboundedSender<HealEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A handle that drops everything, for callers without a listener.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Send failures are ignored; a dropped receiver just means the caller
    /// stopped listening.
    pub fn log(&self, tag: EventTag, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(HealEvent::Log {
                tag,
                message: message.into(),
            });
        }
    }

    pub fn done(&self, status: SessionStatus) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(HealEvent::Done { status });
        }
    }
}
