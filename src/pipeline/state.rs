use serde::Serialize;
use std::fmt;

/// Lifecycle of one pipeline run.
///
/// States only move forward. `Failed` is reachable from every non-terminal
/// state; `Done` and `Failed` are terminal. An empty selection skips straight
/// from `Created` to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    Provisioned,
    Staged,
    Executed,
    Exported,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Created, Provisioned)
                | (Created, Done)
                | (Provisioned, Staged)
                | (Staged, Executed)
                | (Executed, Exported)
                | (Exported, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Created => "created",
            PipelineState::Provisioned => "provisioned",
            PipelineState::Staged => "staged",
            PipelineState::Executed => "executed",
            PipelineState::Exported => "exported",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}
