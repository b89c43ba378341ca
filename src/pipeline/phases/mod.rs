pub mod execute;
pub mod materialize;
pub mod provision;
pub mod stage;

pub use execute::execute;
pub use materialize::{collect, write_back, ExportResult, ExportStatus, ExportedFile};
pub use provision::provision;
pub use stage::{load, stage, StagedTree};

use crate::environment::{CommandStep, ExecOutput, ExecutionEnvironment};
use crate::profile::FormatterProfile;
use crate::progress::{ProgressEvent, ProgressHandler};
use std::time::Instant;

/// Setup steps plus the formatter invocation.
pub(crate) fn total_steps(profile: &FormatterProfile) -> usize {
    profile.setup.len() + 1
}

/// Apply one step and report it. The exit status is left for the caller to
/// judge.
pub(crate) async fn run_step(
    env: &mut ExecutionEnvironment,
    step: &CommandStep,
    index: usize,
    total: usize,
    progress: &dyn ProgressHandler,
) -> anyhow::Result<ExecOutput> {
    let name = step.to_string();
    progress.on_progress(&ProgressEvent::StepStarted {
        index,
        total,
        name: name.clone(),
    });

    let start = Instant::now();
    let output = env.with_exec(step.clone()).await?;

    progress.on_progress(&ProgressEvent::StepComplete {
        index,
        total,
        name,
        exit_code: output.exit_code,
        duration: start.elapsed(),
    });
    Ok(output)
}
