//! Pipeline integration tests against the in-memory sandbox
//!
//! These run the full select, provision, stage, execute and export sequence
//! with a scripted formatter standing in for prettier.

mod support;

use anyhow::Result;
use async_trait::async_trait;
use fmtbox::environment::{
    CommandStep, EnvironmentFactory, ExecOutput, MockEnvironmentFactory, Sandbox, StagedFile,
    StepOp,
};
use fmtbox::error::{PipelineError, Stage};
use fmtbox::pipeline::{FormatPipeline, PipelineState};
use fmtbox::progress::ProgressEvent;
use fmtbox::FormatConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use support::{fake_prettier, format_tree, pretty_json, read, write_tree, RecordingHandler};
use tempfile::TempDir;

const UNFORMATTED_JSON: &str = "{\"name\":\"demo\",\"tags\":[\"a\",\"b\"]}";
const FORMATTED_YAML: &str = "name: demo\ntags:\n  - a\n  - b\n";

fn scenario_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[
            ("a.json", UNFORMATTED_JSON),
            ("b.yaml", FORMATTED_YAML),
            ("node_modules/c.json", "{\"vendored\":true}"),
            ("src/main.rs", "fn main() {}\n"),
        ],
    );
    temp
}

fn pipeline(
    factory: &MockEnvironmentFactory,
    root: &Path,
    progress: Arc<RecordingHandler>,
) -> FormatPipeline {
    FormatPipeline::new(Arc::new(factory.clone()), FormatConfig::with_root(root))
        .with_progress(progress)
}

#[tokio::test]
async fn test_scenario_formats_selected_files_only() {
    let temp = scenario_tree();
    let factory = fake_prettier();
    let ledger = factory.ledger();
    let progress = Arc::new(RecordingHandler::default());

    let report = pipeline(&factory, temp.path(), progress.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        report.selected,
        vec![PathBuf::from("a.json"), PathBuf::from("b.yaml")]
    );
    assert_eq!(read(temp.path(), "a.json"), pretty_json(UNFORMATTED_JSON));
    assert_eq!(read(temp.path(), "b.yaml"), FORMATTED_YAML);
    assert_eq!(
        read(temp.path(), "node_modules/c.json"),
        "{\"vendored\":true}"
    );

    let staged = ledger.staged();
    assert_eq!(
        staged,
        vec![PathBuf::from("/src/a.json"), PathBuf::from("/src/b.yaml")]
    );

    let changed: Vec<&Path> = report.export.changed().map(|f| f.path.as_path()).collect();
    assert_eq!(changed, vec![Path::new("a.json")]);
    assert_eq!(report.export.succeeded().count(), 2);

    assert_eq!(
        report.states,
        vec![
            PipelineState::Created,
            PipelineState::Provisioned,
            PipelineState::Staged,
            PipelineState::Executed,
            PipelineState::Exported,
            PipelineState::Done,
        ]
    );
    assert_eq!(progress.states(), report.states[1..].to_vec());

    assert_eq!(ledger.created().len(), 1);
    assert!(ledger.live().is_empty());
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let temp = scenario_tree();
    let factory = fake_prettier();

    let first = pipeline(&factory, temp.path(), Arc::default())
        .run()
        .await
        .unwrap();
    assert_eq!(first.export.changed().count(), 1);
    let after_first = read(temp.path(), "a.json");

    let second = pipeline(&factory, temp.path(), Arc::default())
        .run()
        .await
        .unwrap();

    // every file is still copied back, none differ
    assert_eq!(second.export.succeeded().count(), 2);
    assert_eq!(second.export.changed().count(), 0);
    assert_eq!(read(temp.path(), "a.json"), after_first);
    assert_eq!(read(temp.path(), "b.yaml"), FORMATTED_YAML);
    assert_eq!(factory.ledger().created().len(), 2);
    assert!(factory.ledger().live().is_empty());
}

#[tokio::test]
async fn test_failing_setup_aborts_before_staging() {
    let temp = scenario_tree();
    let factory = MockEnvironmentFactory::new()
        .fail_command("apt-get install", 100, "E: Unable to locate package bash")
        .on_command("prettier --write", |_, tree| format_tree(tree));
    let ledger = factory.ledger();
    let progress = Arc::new(RecordingHandler::default());

    let err = pipeline(&factory, temp.path(), progress.clone())
        .run()
        .await
        .unwrap_err();

    match &err {
        PipelineError::SetupCommand { index, output, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(output.exit_code, 100);
            assert!(output.stderr.contains("Unable to locate package"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.stage(), Some(Stage::Provisioning));
    assert_ne!(err.exit_code(), 0);

    assert!(ledger.staged().is_empty());
    assert_eq!(ledger.executed().len(), 1);
    assert!(ledger.live().is_empty());
    assert_eq!(read(temp.path(), "a.json"), UNFORMATTED_JSON);
    assert_eq!(progress.states(), vec![PipelineState::Failed]);
}

#[tokio::test]
async fn test_formatter_failure_leaves_host_untouched() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[("broken.json", "{\"a\":"), ("ok.json", "{\"b\":1}")],
    );
    let factory = fake_prettier();
    let progress = Arc::new(RecordingHandler::default());

    let err = pipeline(&factory, temp.path(), progress.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Execution));
    assert_eq!(err.exit_code(), 2);
    assert!(err.output().unwrap().stderr.contains("broken.json"));

    assert_eq!(read(temp.path(), "broken.json"), "{\"a\":");
    assert_eq!(read(temp.path(), "ok.json"), "{\"b\":1}");
    assert!(factory.ledger().live().is_empty());
    assert_eq!(
        progress.states(),
        vec![
            PipelineState::Provisioned,
            PipelineState::Staged,
            PipelineState::Failed
        ]
    );

    let failed = progress
        .events()
        .into_iter()
        .any(|e| matches!(e, ProgressEvent::Failed { stage: Some(Stage::Execution), .. }));
    assert!(failed);
}

#[tokio::test]
async fn test_partial_export_reports_each_file() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[("a.json", "{}"), ("b.json", "{}"), ("c.json", "{}")],
    );

    // Swap b.json for a directory on the host while the formatter runs, so
    // writing it back fails regardless of permissions.
    let host_root = temp.path().to_path_buf();
    let factory = MockEnvironmentFactory::new().on_command("prettier --write", move |_, tree| {
        let blocked = host_root.join("b.json");
        fs::remove_file(&blocked).unwrap();
        fs::create_dir(&blocked).unwrap();
        format_tree(tree)
    });

    let err = pipeline(&factory, temp.path(), Arc::default())
        .run()
        .await
        .unwrap_err();

    match &err {
        PipelineError::Export { result } => {
            assert_eq!(result.files.len(), 3);
            assert_eq!(result.failed().count(), 1);
            assert_eq!(result.succeeded().count(), 2);
            assert_eq!(result.failed().next().unwrap().path, PathBuf::from("b.json"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);

    // no rollback of the files that made it
    assert_eq!(read(temp.path(), "a.json"), "{}\n");
    assert_eq!(read(temp.path(), "c.json"), "{}\n");
    assert!(factory.ledger().live().is_empty());
}

#[tokio::test]
async fn test_empty_selection_is_a_noop() {
    let temp = TempDir::new().unwrap();
    write_tree(temp.path(), &[("README.md", "# nothing to format\n")]);
    let factory = fake_prettier();

    let report = pipeline(&factory, temp.path(), Arc::default())
        .run()
        .await
        .unwrap();

    assert!(report.selected.is_empty());
    assert!(report.export.is_empty());
    assert!(report.environment.is_none());
    assert_eq!(
        report.states,
        vec![PipelineState::Created, PipelineState::Done]
    );
    assert!(factory.ledger().created().is_empty());
}

#[tokio::test]
async fn test_caller_excludes_are_additive() {
    let temp = scenario_tree();
    write_tree(temp.path(), &[("fixtures/d.json", "{\"d\":1}")]);
    let factory = fake_prettier();

    let mut config = FormatConfig::with_root(temp.path());
    config.exclude = vec!["fixtures".to_string()];
    let report = FormatPipeline::new(Arc::new(factory.clone()), config)
        .with_progress(Arc::new(RecordingHandler::default()))
        .run()
        .await
        .unwrap();

    assert!(!report.selected.contains(&PathBuf::from("fixtures/d.json")));
    assert!(!report.selected.contains(&PathBuf::from("node_modules/c.json")));
    assert_eq!(read(temp.path(), "fixtures/d.json"), "{\"d\":1}");
}

#[tokio::test]
async fn test_step_chain_records_every_step() {
    let temp = scenario_tree();
    let factory = fake_prettier();

    let mut config = FormatConfig::with_root(temp.path());
    config.snapshot_steps = true;
    let report = FormatPipeline::new(Arc::new(factory.clone()), config)
        .with_progress(Arc::new(RecordingHandler::default()))
        .run()
        .await
        .unwrap();

    // three setup steps, the staging step, the formatter
    assert_eq!(report.steps.len(), 5);
    assert!(report.steps.iter().all(|s| s.snapshot.is_some()));
    assert!(matches!(
        report.steps[3].op,
        StepOp::Stage { files: 2, .. }
    ));
    match &report.steps[4].op {
        StepOp::Exec { step, exit_code } => {
            assert_eq!(step.command_line(), "prettier --write .");
            assert_eq!(*exit_code, 0);
        }
        other => panic!("unexpected op {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_pattern_fails_before_provisioning() {
    let temp = scenario_tree();
    let factory = fake_prettier();

    let mut config = FormatConfig::with_root(temp.path());
    config.exclude = vec!["!**/node_modules".to_string()];
    let err = FormatPipeline::new(Arc::new(factory.clone()), config)
        .with_progress(Arc::new(RecordingHandler::default()))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Config(_)));
    assert!(factory.ledger().created().is_empty());
}

/// Which sandbox call never completes.
#[derive(Clone, Copy)]
enum Hang {
    Formatter,
    Release,
}

/// Delegates to a mock sandbox but blocks forever at one point.
struct HangingFactory {
    inner: MockEnvironmentFactory,
    hang: Hang,
}

struct HangingSandbox {
    inner: Box<dyn Sandbox>,
    hang: Hang,
}

#[async_trait]
impl EnvironmentFactory for HangingFactory {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn create(&self, image: &str) -> Result<Box<dyn Sandbox>> {
        let inner = self.inner.create(image).await?;
        Ok(Box::new(HangingSandbox {
            inner,
            hang: self.hang,
        }))
    }
}

#[async_trait]
impl Sandbox for HangingSandbox {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn exec(&self, step: &CommandStep) -> Result<ExecOutput> {
        if matches!(self.hang, Hang::Formatter) && step.command_line().contains("prettier --write")
        {
            std::future::pending::<()>().await;
        }
        self.inner.exec(step).await
    }

    async fn write_files(&self, target: &str, files: Vec<StagedFile>) -> Result<()> {
        self.inner.write_files(target, files).await
    }

    async fn read_tree(&self, target: &str) -> Result<Vec<StagedFile>> {
        self.inner.read_tree(target).await
    }

    async fn release(&self) -> Result<()> {
        if matches!(self.hang, Hang::Release) {
            std::future::pending::<()>().await;
        }
        self.inner.release().await
    }

    fn release_detached(&self) {
        self.inner.release_detached()
    }
}

#[tokio::test]
async fn test_cancelled_run_releases_environment() {
    let temp = scenario_tree();
    let inner = fake_prettier();
    let ledger = inner.ledger();
    let factory = Arc::new(HangingFactory {
        inner,
        hang: Hang::Formatter,
    });

    let run = FormatPipeline::new(factory, FormatConfig::with_root(temp.path()))
        .with_progress(Arc::new(RecordingHandler::default()))
        .run();
    let outcome = tokio::time::timeout(Duration::from_millis(200), run).await;

    assert!(outcome.is_err());
    assert_eq!(ledger.created().len(), 1);
    assert!(ledger.live().is_empty());
    assert_eq!(read(temp.path(), "a.json"), UNFORMATTED_JSON);
}

#[tokio::test]
async fn test_cancelled_release_still_removes_environment() {
    let temp = scenario_tree();
    let inner = fake_prettier();
    let ledger = inner.ledger();
    let factory = Arc::new(HangingFactory {
        inner,
        hang: Hang::Release,
    });

    let run = FormatPipeline::new(factory, FormatConfig::with_root(temp.path()))
        .with_progress(Arc::new(RecordingHandler::default()))
        .run();
    let outcome = tokio::time::timeout(Duration::from_millis(200), run).await;

    assert!(outcome.is_err());
    assert_eq!(ledger.created().len(), 1);
    assert!(ledger.live().is_empty());
    assert_eq!(read(temp.path(), "a.json"), pretty_json(UNFORMATTED_JSON));
}
