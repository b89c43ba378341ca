//! Isolated execution environments
//!
//! An [`ExecutionEnvironment`] wraps a backend [`Sandbox`] (a Docker container,
//! or an in-memory double in tests) together with the [`StepChain`] of
//! everything applied to it. Environments are created through an
//! [`EnvironmentFactory`] passed to the pipeline, exclusively owned by one
//! pipeline run, and always released: explicitly via
//! [`ExecutionEnvironment::release`], or on drop when a run is cancelled.

pub mod chain;
pub mod docker;
pub mod mock;
pub mod shell;

pub use chain::{AppliedStep, CommandStep, StepChain, StepOp};
pub use docker::{check_docker, DockerEnvironmentFactory, DockerSandbox};
pub use mock::{MockEnvironmentFactory, MockLedger, MockSandbox, MockTree};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Captured result of running a command inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// A file moving between the host and a sandbox, addressed relative to the
/// working path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub mode: u32,
}

/// Backend seam for an isolated runtime instance.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    /// Run one step. A nonzero exit is a normal `Ok` result; `Err` means the
    /// backend itself failed.
    async fn exec(&self, step: &CommandStep) -> Result<ExecOutput>;

    /// Create `target` and write `files` beneath it.
    async fn write_files(&self, target: &str, files: Vec<StagedFile>) -> Result<()>;

    /// Read every regular file beneath `target`.
    async fn read_tree(&self, target: &str) -> Result<Vec<StagedFile>>;

    /// Persist the current state under `label`, returning a reference to it.
    async fn snapshot(&self, _label: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn release(&self) -> Result<()>;

    /// Best-effort release used from `Drop`, where nothing can be awaited.
    fn release_detached(&self);
}

/// Creates sandboxes from a base image.
#[async_trait]
pub trait EnvironmentFactory: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create(&self, image: &str) -> Result<Box<dyn Sandbox>>;
}

/// Exclusively owned handle to a provisioned sandbox and its step chain.
pub struct ExecutionEnvironment {
    sandbox: Box<dyn Sandbox>,
    image: String,
    chain: StepChain,
    snapshot_steps: bool,
    released: bool,
}

impl ExecutionEnvironment {
    pub fn new(sandbox: Box<dyn Sandbox>, image: impl Into<String>) -> Self {
        Self {
            sandbox,
            image: image.into(),
            chain: StepChain::new(),
            snapshot_steps: false,
            released: false,
        }
    }

    /// Commit the sandbox after every applied step.
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.snapshot_steps = enabled;
        self
    }

    pub fn id(&self) -> &str {
        self.sandbox.id()
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Chain of every step applied so far; the head is the realized state.
    pub fn chain(&self) -> &StepChain {
        &self.chain
    }

    /// Apply `step` on top of the current state.
    pub async fn with_exec(&mut self, step: CommandStep) -> Result<ExecOutput> {
        debug!(env = %self.id(), command = %step.command_line(), "Applying step");
        let output = self.sandbox.exec(&step).await?;
        let op = StepOp::Exec {
            step,
            exit_code: output.exit_code,
        };
        self.advance(op).await?;
        Ok(output)
    }

    /// Write `files` beneath `target` as a single chain step.
    pub async fn with_files(&mut self, target: &str, files: Vec<StagedFile>) -> Result<()> {
        let count = files.len();
        debug!(env = %self.id(), target, files = count, "Staging files");
        self.sandbox.write_files(target, files).await?;
        self.advance(StepOp::Stage {
            target: target.to_string(),
            files: count,
        })
        .await
    }

    /// Read back every file beneath `target`.
    pub async fn export(&self, target: &str) -> Result<Vec<StagedFile>> {
        self.sandbox.read_tree(target).await
    }

    async fn advance(&mut self, op: StepOp) -> Result<()> {
        let snapshot = if self.snapshot_steps {
            let label = format!("step-{}", self.chain.len() + 1);
            self.sandbox.snapshot(&label).await?
        } else {
            None
        };
        self.chain = self.chain.push(AppliedStep { op, snapshot });
        Ok(())
    }

    /// Tear down the sandbox. Until the backend confirms, `Drop` still
    /// falls back to a detached release.
    pub async fn release(mut self) -> Result<()> {
        debug!(env = %self.id(), steps = self.chain.len(), "Releasing environment");
        self.sandbox.release().await?;
        self.released = true;
        Ok(())
    }
}

impl Drop for ExecutionEnvironment {
    fn drop(&mut self) {
        if !self.released {
            warn!(env = %self.sandbox.id(), "Environment dropped without release, cleaning up");
            self.sandbox.release_detached();
        }
    }
}
