use crate::environment::{ExecutionEnvironment, StagedFile};
use crate::error::PipelineError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The selected files as exposed inside an environment, rooted at the
/// working path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedTree {
    working_path: String,
    files: Vec<PathBuf>,
}

impl StagedTree {
    pub fn working_path(&self) -> &str {
        &self.working_path
    }

    /// Staged paths, relative to the working path.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, rel_path: &Path) -> bool {
        self.files.binary_search_by(|p| p.as_path().cmp(rel_path)).is_ok()
    }

    /// Absolute location of `rel_path` inside the environment.
    pub fn container_path(&self, rel_path: &Path) -> String {
        format!(
            "{}/{}",
            self.working_path.trim_end_matches('/'),
            rel_path.display()
        )
    }
}

/// Read the selected host files into memory.
///
/// Runs before any environment exists, so an unreadable file fails the run
/// without a container ever being created.
pub async fn load(root: &Path, selected: &[PathBuf]) -> Result<Vec<StagedFile>, PipelineError> {
    let mut files = Vec::with_capacity(selected.len());
    for rel_path in selected {
        let host_path = root.join(rel_path);
        let staging_error = |e: std::io::Error| PipelineError::Staging {
            target: host_path.display().to_string(),
            message: e.to_string(),
        };

        let metadata = tokio::fs::metadata(&host_path)
            .await
            .map_err(staging_error)?;
        let contents = tokio::fs::read(&host_path).await.map_err(staging_error)?;

        files.push(StagedFile {
            path: rel_path.clone(),
            contents,
            mode: file_mode(&metadata),
        });
    }
    Ok(files)
}

/// Expose exactly `files` at `working_path`, keeping their relative layout.
pub async fn stage(
    env: &mut ExecutionEnvironment,
    working_path: &str,
    files: Vec<StagedFile>,
) -> Result<StagedTree, PipelineError> {
    let mut paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    paths.sort();

    env.with_files(working_path, files)
        .await
        .map_err(|e| PipelineError::Staging {
            target: working_path.to_string(),
            message: format!("{:#}", e),
        })?;

    debug!(env = %env.id(), working_path, files = paths.len(), "Files staged");
    Ok(StagedTree {
        working_path: working_path.to_string(),
        files: paths,
    })
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
