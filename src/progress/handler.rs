//! Progress handler trait and events

use crate::error::Stage;
use crate::pipeline::PipelineState;
use std::time::Duration;

/// Events emitted while a formatting pipeline runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Pipeline started against a host root
    Started { root: String },

    /// Host files selected
    SelectionComplete { files: usize, duration: Duration },

    /// Pipeline moved to a new state
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },

    /// A setup or formatter step is about to run
    StepStarted {
        index: usize,
        total: usize,
        name: String,
    },

    /// A setup or formatter step finished
    StepComplete {
        index: usize,
        total: usize,
        name: String,
        exit_code: i64,
        duration: Duration,
    },

    /// Files written back to the host
    ExportComplete {
        written: usize,
        changed: usize,
        failed: usize,
    },

    /// Pipeline finished successfully
    Completed { files: usize, total_time: Duration },

    /// Pipeline failed
    Failed { stage: Option<Stage>, error: String },
}

/// Trait for handling progress events during a pipeline run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}
