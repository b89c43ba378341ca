use super::phases::{self, ExportResult};
use super::state::PipelineState;
use crate::config::FormatConfig;
use crate::environment::{AppliedStep, EnvironmentFactory, ExecutionEnvironment, StagedFile};
use crate::error::PipelineError;
use crate::profile::FormatterProfile;
use crate::progress::{LoggingHandler, ProgressEvent, ProgressHandler};
use crate::selection::select_files;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub root: PathBuf,
    pub selected: Vec<PathBuf>,
    pub export: ExportResult,
    pub states: Vec<PipelineState>,
    /// Steps applied to the environment, oldest first.
    pub steps: Vec<AppliedStep>,
    pub environment: Option<String>,
    pub duration_ms: u64,
}

/// One run of the format pipeline: select, provision, stage, execute, export.
///
/// A pipeline value runs once; a retry starts over with a new value.
pub struct FormatPipeline {
    factory: Arc<dyn EnvironmentFactory>,
    config: FormatConfig,
    progress: Arc<dyn ProgressHandler>,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl FormatPipeline {
    pub fn new(factory: Arc<dyn EnvironmentFactory>, config: FormatConfig) -> Self {
        Self {
            factory,
            config,
            progress: Arc::new(LoggingHandler),
            state: PipelineState::Created,
            history: vec![PipelineState::Created],
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &FormatConfig {
        &self.config
    }

    pub async fn run(mut self) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        info!(
            root = %self.config.root.display(),
            backend = self.factory.name(),
            "Starting format pipeline"
        );
        self.progress.on_progress(&ProgressEvent::Started {
            root: self.config.root.display().to_string(),
        });

        match self.run_stages(start).await {
            Ok(report) => {
                self.progress.on_progress(&ProgressEvent::Completed {
                    files: report.export.len(),
                    total_time: start.elapsed(),
                });
                Ok(report)
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                self.progress.on_progress(&ProgressEvent::Failed {
                    stage: e.stage(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self, start: Instant) -> Result<PipelineReport, PipelineError> {
        self.config.validate()?;
        let profile = self.config.profile();
        let selection = self.config.file_selection()?;
        let root = selection.root().to_path_buf();

        let select_start = Instant::now();
        let selected = tokio::task::spawn_blocking(move || select_files(&selection))
            .await
            .map_err(|e| PipelineError::Selection {
                root: root.clone(),
                message: e.to_string(),
            })??;
        self.progress.on_progress(&ProgressEvent::SelectionComplete {
            files: selected.len(),
            duration: select_start.elapsed(),
        });

        if selected.is_empty() {
            info!(root = %root.display(), "No files matched, nothing to format");
            self.transition(PipelineState::Done);
            return Ok(self.report(root, selected, ExportResult::default(), Vec::new(), None, start));
        }

        let files = phases::load(&root, &selected).await?;

        let phase_start = Instant::now();
        let mut env = phases::provision(
            self.factory.as_ref(),
            &profile,
            self.config.snapshot_steps,
            self.progress.as_ref(),
        )
        .await?;
        info!(
            stage = "provision",
            env = %env.id(),
            duration_ms = phase_start.elapsed().as_millis(),
            "Stage complete"
        );
        self.transition(PipelineState::Provisioned);

        let outcome = self.run_in_environment(&mut env, &profile, files).await;

        let steps = env.chain().steps();
        let env_id = env.id().to_string();
        if let Err(e) = env.release().await {
            warn!(env = %env_id, error = %e, "Failed to release environment");
        }

        let export = outcome?;
        self.progress.on_progress(&ProgressEvent::ExportComplete {
            written: export.succeeded().count(),
            changed: export.changed().count(),
            failed: export.failed().count(),
        });
        if export.has_failures() {
            return Err(PipelineError::Export { result: export });
        }

        self.transition(PipelineState::Done);
        Ok(self.report(root, selected, export, steps, Some(env_id), start))
    }

    async fn run_in_environment(
        &mut self,
        env: &mut ExecutionEnvironment,
        profile: &FormatterProfile,
        files: Vec<StagedFile>,
    ) -> Result<ExportResult, PipelineError> {
        let phase_start = Instant::now();
        let tree = phases::stage(env, &profile.working_path, files).await?;
        info!(
            stage = "stage",
            files = tree.len(),
            duration_ms = phase_start.elapsed().as_millis(),
            "Stage complete"
        );
        self.transition(PipelineState::Staged);

        let phase_start = Instant::now();
        phases::execute(env, profile, &tree, self.progress.as_ref()).await?;
        info!(
            stage = "execute",
            duration_ms = phase_start.elapsed().as_millis(),
            "Stage complete"
        );
        self.transition(PipelineState::Executed);

        let phase_start = Instant::now();
        let formatted = phases::collect(env, tree.working_path()).await?;
        let export = phases::write_back(&self.config.root, formatted).await;
        info!(
            stage = "export",
            files = export.len(),
            changed = export.changed().count(),
            failed = export.failed().count(),
            duration_ms = phase_start.elapsed().as_millis(),
            "Stage complete"
        );
        self.transition(PipelineState::Exported);

        Ok(export)
    }

    fn transition(&mut self, to: PipelineState) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(to),
            "invalid pipeline transition {} -> {}",
            from,
            to
        );
        debug!(from = %from, to = %to, "Pipeline transition");
        self.state = to;
        self.history.push(to);
        self.progress
            .on_progress(&ProgressEvent::StateChanged { from, to });
    }

    fn report(
        &self,
        root: PathBuf,
        selected: Vec<PathBuf>,
        export: ExportResult,
        steps: Vec<AppliedStep>,
        environment: Option<String>,
        start: Instant,
    ) -> PipelineReport {
        PipelineReport {
            root,
            selected,
            export,
            states: self.history.clone(),
            steps,
            environment,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}
