//! Run progress events.
//!
//! The orchestrator pushes [`RunEvent`]s into an [`EventSink`]; rendering lives elsewhere
//! (see `ui.rs`).

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

use crate::classify::Outcome;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunStarted { total: usize, run_dir: PathBuf },
    ConfigurationUnavailable { identity: String },
    JobStarted { identity: String },
    ModuleLoading { identity: String, line: String },
    LoadError { identity: String, line: String, shared_module: bool },
    JobFinished { identity: String, outcome: Outcome, reason: Option<String> },
    RunFinished,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RunEvent) {}
}

impl EventSink for UnboundedSender<RunEvent> {
    fn emit(&self, event: RunEvent) {
        // A closed receiver only means nobody is watching anymore.
        let _ = self.send(event);
    }
}
