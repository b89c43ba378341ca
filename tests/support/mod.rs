use fmtbox::environment::{ExecOutput, MockEnvironmentFactory, MockTree};
use fmtbox::pipeline::PipelineState;
use fmtbox::progress::{ProgressEvent, ProgressHandler};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Path to the fmtbox binary built for this test run
#[allow(dead_code)]
pub fn fmtbox_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fmtbox"))
}

#[allow(dead_code)]
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, contents).expect("Failed to write fixture file");
    }
}

#[allow(dead_code)]
pub fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).expect("Failed to read file")
}

/// What the fake formatter turns a JSON document into.
#[allow(dead_code)]
pub fn pretty_json(source: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(source).expect("Invalid JSON fixture");
    format!(
        "{}\n",
        serde_json::to_string_pretty(&value).expect("Failed to render JSON")
    )
}

/// Stand-in for `prettier --write .`: pretty-prints every JSON file under
/// /src and leaves everything else alone. Unparseable JSON exits 2 like
/// prettier does on a syntax error.
#[allow(dead_code)]
pub fn format_tree(tree: &mut MockTree) -> ExecOutput {
    let mut stdout = String::new();
    for (path, contents) in tree.iter_mut() {
        if !path.starts_with("/src") || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let source = String::from_utf8_lossy(contents).to_string();
        match serde_json::from_str::<serde_json::Value>(&source) {
            Ok(_) => {
                *contents = pretty_json(&source).into_bytes();
                stdout.push_str(&format!("{}\n", path.display()));
            }
            Err(e) => {
                return ExecOutput {
                    exit_code: 2,
                    stdout,
                    stderr: format!("[error] {}: SyntaxError: {}", path.display(), e),
                };
            }
        }
    }
    ExecOutput::ok(stdout)
}

/// Mock factory whose formatter step behaves like prettier.
#[allow(dead_code)]
pub fn fake_prettier() -> MockEnvironmentFactory {
    MockEnvironmentFactory::new().on_command("prettier --write", |_, tree| format_tree(tree))
}

/// Progress handler that keeps every event for later inspection.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every state the pipeline entered, in order.
    pub fn states(&self) -> Vec<PipelineState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
