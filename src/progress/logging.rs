//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { root } => {
                info!(root = %root, "Starting format pipeline");
            }
            ProgressEvent::SelectionComplete { files, duration } => {
                info!(
                    files,
                    duration_ms = duration.as_millis(),
                    "File selection complete"
                );
            }
            ProgressEvent::StateChanged { from, to } => {
                debug!(from = %from, to = %to, "Pipeline state changed");
            }
            ProgressEvent::StepStarted { index, total, name } => {
                info!(
                    step = %name,
                    progress = format!("{}/{}", index, total),
                    "Running step"
                );
            }
            ProgressEvent::StepComplete {
                index,
                total,
                name,
                exit_code,
                duration,
            } => {
                if *exit_code == 0 {
                    debug!(
                        step = %name,
                        progress = format!("{}/{}", index, total),
                        duration_ms = duration.as_millis(),
                        "Step complete"
                    );
                } else {
                    warn!(
                        step = %name,
                        progress = format!("{}/{}", index, total),
                        exit_code,
                        duration_ms = duration.as_millis(),
                        "Step failed"
                    );
                }
            }
            ProgressEvent::ExportComplete {
                written,
                changed,
                failed,
            } => {
                if *failed > 0 {
                    warn!(written, changed, failed, "Export complete with failures");
                } else {
                    info!(written, changed, "Export complete");
                }
            }
            ProgressEvent::Completed { files, total_time } => {
                info!(
                    files,
                    total_time_ms = total_time.as_millis(),
                    "Format pipeline complete"
                );
            }
            ProgressEvent::Failed { stage, error } => match stage {
                Some(stage) => warn!(stage = %stage, error = %error, "Format pipeline failed"),
                None => warn!(error = %error, "Format pipeline failed"),
            },
        }
    }
}
