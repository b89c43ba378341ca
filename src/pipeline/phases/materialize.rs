//! Write formatted files back onto the host
//!
//! This is the only phase that touches host state. Every file under the
//! working path is written to its original location, unconditionally. A
//! failed write is recorded for that file and the rest still go ahead; files
//! already written are never rolled back.

use crate::environment::{ExecutionEnvironment, StagedFile};
use crate::error::PipelineError;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportStatus {
    /// Written to the host; `changed` is false when the bytes already matched.
    Written { changed: bool },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ExportStatus,
}

impl ExportedFile {
    pub fn is_written(&self) -> bool {
        matches!(self.status, ExportStatus::Written { .. })
    }

    pub fn is_changed(&self) -> bool {
        matches!(self.status, ExportStatus::Written { changed: true })
    }
}

/// Per-file outcome of writing the working path back to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportResult {
    pub files: Vec<ExportedFile>,
}

impl ExportResult {
    pub fn succeeded(&self) -> impl Iterator<Item = &ExportedFile> {
        self.files.iter().filter(|f| f.is_written())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ExportedFile> {
        self.files.iter().filter(|f| !f.is_written())
    }

    /// Files whose host content differs from what was there before.
    pub fn changed(&self) -> impl Iterator<Item = &ExportedFile> {
        self.files.iter().filter(|f| f.is_changed())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Read every file under `working_path` out of the environment.
pub async fn collect(
    env: &ExecutionEnvironment,
    working_path: &str,
) -> Result<Vec<StagedFile>, PipelineError> {
    env.export(working_path)
        .await
        .map_err(|e| PipelineError::Collect {
            target: working_path.to_string(),
            message: format!("{:#}", e),
        })
}

/// Write `files` under `root`, attempting every file even after a failure.
pub async fn write_back(root: &Path, mut files: Vec<StagedFile>) -> ExportResult {
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut result = ExportResult::default();
    for file in files {
        let status = match write_one(root, &file).await {
            Ok(changed) => {
                debug!(path = %file.path.display(), changed, "Exported");
                ExportStatus::Written { changed }
            }
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Export failed");
                ExportStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        result.files.push(ExportedFile {
            path: file.path,
            status,
        });
    }
    result
}

async fn write_one(root: &Path, file: &StagedFile) -> std::io::Result<bool> {
    if file.path.as_os_str().is_empty()
        || !file
            .path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("refusing to write outside the root: {}", file.path.display()),
        ));
    }

    let dest = root.join(&file.path);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let changed = match tokio::fs::read(&dest).await {
        Ok(existing) => existing != file.contents,
        Err(_) => true,
    };
    tokio::fs::write(&dest, &file.contents).await?;
    Ok(changed)
}
