use super::{CommandStep, EnvironmentFactory, ExecOutput, Sandbox, StagedFile};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory file tree of a mock sandbox, keyed by absolute path.
pub type MockTree = BTreeMap<PathBuf, Vec<u8>>;

type Handler = Arc<dyn Fn(&CommandStep, &mut MockTree) -> ExecOutput + Send + Sync>;

#[derive(Debug, Default)]
struct LedgerState {
    images: Vec<String>,
    created: Vec<String>,
    released: Vec<String>,
    executed: Vec<CommandStep>,
    staged: Vec<PathBuf>,
}

/// Shared record of everything mock sandboxes were asked to do.
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn images(&self) -> Vec<String> {
        self.inner.lock().unwrap().images.clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.inner.lock().unwrap().released.clone()
    }

    /// Sandboxes created but not yet released.
    pub fn live(&self) -> Vec<String> {
        let state = self.inner.lock().unwrap();
        state
            .created
            .iter()
            .filter(|id| !state.released.contains(id))
            .cloned()
            .collect()
    }

    pub fn executed(&self) -> Vec<CommandStep> {
        self.inner.lock().unwrap().executed.clone()
    }

    /// Every path ever written into a sandbox.
    pub fn staged(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().staged.clone()
    }

    fn release(&self, id: &str) {
        let mut state = self.inner.lock().unwrap();
        if !state.released.iter().any(|r| r == id) {
            state.released.push(id.to_string());
        }
    }
}

/// Factory for in-memory sandboxes with scripted command behaviour.
///
/// Commands are matched against registered handlers by substring of their
/// rendered command line; unmatched commands succeed with empty output.
#[derive(Clone, Default)]
pub struct MockEnvironmentFactory {
    handlers: Vec<(String, Handler)>,
    ledger: MockLedger,
    create_error: Option<String>,
}

impl MockEnvironmentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> MockLedger {
        self.ledger.clone()
    }

    pub fn on_command<F>(mut self, pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&CommandStep, &mut MockTree) -> ExecOutput + Send + Sync + 'static,
    {
        self.handlers.push((pattern.into(), Arc::new(handler)));
        self
    }

    pub fn fail_command(self, pattern: impl Into<String>, exit_code: i64, stderr: &str) -> Self {
        let stderr = stderr.to_string();
        self.on_command(pattern, move |_, _| ExecOutput::failed(exit_code, stderr.clone()))
    }

    /// Make every `create` call fail, as if the image could not be pulled.
    pub fn fail_create(mut self, message: impl Into<String>) -> Self {
        self.create_error = Some(message.into());
        self
    }
}

#[async_trait]
impl EnvironmentFactory for MockEnvironmentFactory {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create(&self, image: &str) -> Result<Box<dyn Sandbox>> {
        if let Some(message) = &self.create_error {
            return Err(anyhow!("{}", message));
        }

        let id = format!("mock-{}", uuid::Uuid::new_v4().simple());
        {
            let mut state = self.ledger.inner.lock().unwrap();
            state.images.push(image.to_string());
            state.created.push(id.clone());
        }

        Ok(Box::new(MockSandbox {
            id,
            tree: Mutex::new(MockTree::new()),
            handlers: self.handlers.clone(),
            ledger: self.ledger.clone(),
        }))
    }
}

pub struct MockSandbox {
    id: String,
    tree: Mutex<MockTree>,
    handlers: Vec<(String, Handler)>,
    ledger: MockLedger,
}

impl MockSandbox {
    pub fn tree(&self) -> MockTree {
        self.tree.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(&self, step: &CommandStep) -> Result<ExecOutput> {
        self.ledger
            .inner
            .lock()
            .unwrap()
            .executed
            .push(step.clone());

        let line = step.command_line();
        let handler = self
            .handlers
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, handler)| handler.clone());

        Ok(match handler {
            Some(handler) => handler(step, &mut *self.tree.lock().unwrap()),
            None => ExecOutput::ok(""),
        })
    }

    async fn write_files(&self, target: &str, files: Vec<StagedFile>) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        let mut ledger = self.ledger.inner.lock().unwrap();
        for file in files {
            let path = Path::new(target).join(&file.path);
            ledger.staged.push(path.clone());
            tree.insert(path, file.contents);
        }
        Ok(())
    }

    async fn read_tree(&self, target: &str) -> Result<Vec<StagedFile>> {
        let tree = self.tree.lock().unwrap();
        let root = Path::new(target);
        Ok(tree
            .iter()
            .filter_map(|(path, contents)| {
                path.strip_prefix(root).ok().map(|rel| StagedFile {
                    path: rel.to_path_buf(),
                    contents: contents.clone(),
                    mode: 0o644,
                })
            })
            .collect())
    }

    async fn snapshot(&self, label: &str) -> Result<Option<String>> {
        Ok(Some(format!("mock-snapshot/{}:{}", self.id, label)))
    }

    async fn release(&self) -> Result<()> {
        self.ledger.release(&self.id);
        Ok(())
    }

    fn release_detached(&self) {
        self.ledger.release(&self.id);
    }
}
