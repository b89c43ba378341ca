use super::{run_step, total_steps};
use crate::environment::{EnvironmentFactory, ExecutionEnvironment};
use crate::error::PipelineError;
use crate::profile::FormatterProfile;
use crate::progress::ProgressHandler;
use tracing::{debug, info, warn};

/// Create an environment from the profile's base image and run every setup
/// step in order.
///
/// The first nonzero setup step aborts provisioning. The environment is
/// released before the error is returned, so a failed call never leaks a
/// sandbox.
pub async fn provision(
    factory: &dyn EnvironmentFactory,
    profile: &FormatterProfile,
    snapshot_steps: bool,
    progress: &dyn ProgressHandler,
) -> Result<ExecutionEnvironment, PipelineError> {
    info!(image = %profile.image, backend = factory.name(), "Provisioning environment");

    let sandbox = factory
        .create(&profile.image)
        .await
        .map_err(|e| PipelineError::Provisioning {
            image: profile.image.clone(),
            message: format!("{:#}", e),
        })?;

    let mut env = ExecutionEnvironment::new(sandbox, &profile.image).with_snapshots(snapshot_steps);
    debug!(env = %env.id(), "Environment created");

    let total = total_steps(profile);
    for (i, step) in profile.setup.iter().enumerate() {
        let index = i + 1;
        match run_step(&mut env, step, index, total, progress).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                release_after_failure(env).await;
                return Err(PipelineError::SetupCommand {
                    index,
                    command: step.command_line(),
                    output,
                });
            }
            Err(e) => {
                release_after_failure(env).await;
                return Err(PipelineError::Provisioning {
                    image: profile.image.clone(),
                    message: format!("{:#}", e),
                });
            }
        }
    }

    Ok(env)
}

async fn release_after_failure(env: ExecutionEnvironment) {
    let id = env.id().to_string();
    if let Err(e) = env.release().await {
        warn!(env = %id, error = %e, "Failed to release environment after setup failure");
    }
}
