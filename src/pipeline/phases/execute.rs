use super::{run_step, total_steps, StagedTree};
use crate::environment::{ExecOutput, ExecutionEnvironment};
use crate::error::PipelineError;
use crate::profile::FormatterProfile;
use crate::progress::ProgressHandler;
use tracing::debug;

/// Run the formatter once over the whole staged tree.
///
/// A nonzero exit fails the run with the captured output; what the formatter
/// reports is not interpreted.
pub async fn execute(
    env: &mut ExecutionEnvironment,
    profile: &FormatterProfile,
    tree: &StagedTree,
    progress: &dyn ProgressHandler,
) -> Result<ExecOutput, PipelineError> {
    let command = &profile.command;
    let total = total_steps(profile);
    debug!(
        command = %command.command_line(),
        working_path = tree.working_path(),
        files = tree.len(),
        "Running formatter"
    );

    let output = run_step(env, command, total, total, progress)
        .await
        .map_err(|e| PipelineError::Execution {
            command: command.command_line(),
            output: ExecOutput::failed(-1, format!("{:#}", e)),
        })?;

    if !output.success() {
        return Err(PipelineError::Execution {
            command: command.command_line(),
            output,
        });
    }
    Ok(output)
}
