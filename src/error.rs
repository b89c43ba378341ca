use crate::config::ConfigError;
use crate::environment::ExecOutput;
use crate::pipeline::ExportResult;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Selection,
    Provisioning,
    Staging,
    Execution,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Selection => "selection",
            Stage::Provisioning => "provisioning",
            Stage::Staging => "staging",
            Stage::Execution => "execution",
            Stage::Export => "export",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot select files under {}: {message}", root.display())]
    Selection { root: PathBuf, message: String },

    #[error("Failed to provision environment from {image}: {message}")]
    Provisioning { image: String, message: String },

    #[error("Setup step {index} `{command}` exited with code {}", output.exit_code)]
    SetupCommand {
        index: usize,
        command: String,
        output: ExecOutput,
    },

    #[error("Failed to stage files into {target}: {message}")]
    Staging { target: String, message: String },

    #[error("Formatter `{command}` exited with code {}", output.exit_code)]
    Execution { command: String, output: ExecOutput },

    #[error("Failed to read formatted files from {target}: {message}")]
    Collect { target: String, message: String },

    #[error("{} of {} files failed to export", result.failed().count(), result.files.len())]
    Export { result: ExportResult },
}

impl PipelineError {
    /// Stage the failure originated in; `None` for configuration errors,
    /// which happen before any stage runs.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Config(_) => None,
            PipelineError::Selection { .. } => Some(Stage::Selection),
            PipelineError::Provisioning { .. } | PipelineError::SetupCommand { .. } => {
                Some(Stage::Provisioning)
            }
            PipelineError::Staging { .. } => Some(Stage::Staging),
            PipelineError::Execution { .. } => Some(Stage::Execution),
            PipelineError::Collect { .. } | PipelineError::Export { .. } => Some(Stage::Export),
        }
    }

    /// Captured output of the command that failed, if a command failed.
    pub fn output(&self) -> Option<&ExecOutput> {
        match self {
            PipelineError::SetupCommand { output, .. } | PipelineError::Execution { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }

    /// Process exit status for this failure. A failing formatter passes its
    /// own code through; everything else maps to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Execution { output, .. } => i32::try_from(output.exit_code)
                .ok()
                .filter(|code| (1..=255).contains(code))
                .unwrap_or(1),
            _ => 1,
        }
    }
}
