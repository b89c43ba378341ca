use super::{CommandStep, EnvironmentFactory, ExecOutput, Sandbox, StagedFile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CommitContainerOptions, CreateImageOptions, RemoveImageOptions};
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, trace, warn};

const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";
const RUN_LABEL: &str = "fmtbox.run";
const SNAPSHOT_REPO: &str = "fmtbox-snapshot";

/// Check whether a Docker daemon answers on the local defaults.
pub async fn check_docker() -> Result<Option<String>> {
    if std::env::var("DOCKER_HOST").is_err() && !Path::new(DOCKER_SOCKET_PATH).exists() {
        debug!("Docker socket not found at {}", DOCKER_SOCKET_PATH);
        return Ok(None);
    }

    let docker = match Docker::connect_with_local_defaults() {
        Ok(d) => d,
        Err(e) => {
            debug!("Failed to connect to Docker: {}", e);
            return Ok(None);
        }
    };

    match docker.version().await {
        Ok(v) => {
            let api_version = v.api_version.unwrap_or_else(|| "0.0".to_string());
            debug!("Docker API version: {}", api_version);
            Ok(Some(api_version))
        }
        Err(e) => {
            debug!("Failed to get Docker version: {}", e);
            Ok(None)
        }
    }
}

/// Creates one throwaway container per pipeline run.
#[derive(Clone)]
pub struct DockerEnvironmentFactory {
    docker: Docker,
    keep_snapshots: bool,
}

impl DockerEnvironmentFactory {
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        Ok(Self::with_client(docker))
    }

    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            keep_snapshots: false,
        }
    }

    /// Leave step snapshot images on the daemon after release.
    pub fn with_keep_snapshots(mut self, keep: bool) -> Self {
        self.keep_snapshots = keep;
        self
    }

    async fn pull(&self, image: &str) -> Result<()> {
        info!(image, "Pulling base image");
        let stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );
        futures_util::pin_mut!(stream);

        while let Some(progress) = stream.next().await {
            let progress = progress.with_context(|| format!("Failed to pull image {}", image))?;
            if let Some(status) = progress.status {
                trace!(image, status = %status, "Pull progress");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EnvironmentFactory for DockerEnvironmentFactory {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn create(&self, image: &str) -> Result<Box<dyn Sandbox>> {
        self.pull(image).await?;

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("fmtbox-{}", run_id);
        let labels = HashMap::from([(RUN_LABEL.to_string(), run_id.clone())]);

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                Config {
                    image: Some(image.to_string()),
                    cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                    labels: Some(labels),
                    tty: Some(false),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to create container from {}", image))?;

        for warning in &created.warnings {
            warn!(container = %name, "{}", warning);
        }

        let sandbox = DockerSandbox {
            docker: self.docker.clone(),
            id: created.id,
            run_id,
            snapshots: Mutex::new(Vec::new()),
            keep_snapshots: self.keep_snapshots,
        };
        let guard = ReleaseOnDrop::new(&sandbox);

        if let Err(e) = self
            .docker
            .start_container(&sandbox.id, None::<StartContainerOptions<String>>)
            .await
        {
            if sandbox.release().await.is_ok() {
                guard.disarm();
            }
            return Err(e).with_context(|| format!("Failed to start container {}", name));
        }
        guard.disarm();

        info!(container = %name, image, "Environment started");
        Ok(Box::new(sandbox))
    }
}

/// Removes a freshly created container if creation is abandoned before the
/// sandbox is handed to its owner.
struct ReleaseOnDrop<'a> {
    sandbox: &'a DockerSandbox,
    armed: bool,
}

impl<'a> ReleaseOnDrop<'a> {
    fn new(sandbox: &'a DockerSandbox) -> Self {
        Self {
            sandbox,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sandbox.release_detached();
        }
    }
}

pub struct DockerSandbox {
    docker: Docker,
    id: String,
    run_id: String,
    /// Snapshot images committed for this container, oldest first.
    snapshots: Mutex<Vec<String>>,
    keep_snapshots: bool,
}

impl DockerSandbox {
    /// Snapshot references to delete on release, newest first so each
    /// image has no children left when it goes.
    fn take_snapshots(&self) -> Vec<String> {
        if self.keep_snapshots {
            return Vec::new();
        }
        let mut snapshots =
            std::mem::take(&mut *self.snapshots.lock().unwrap_or_else(PoisonError::into_inner));
        snapshots.reverse();
        snapshots
    }

    async fn run(&self, args: Vec<String>, workdir: Option<String>) -> Result<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                &self.id,
                CreateExecOptions {
                    cmd: Some(args),
                    working_dir: workdir,
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .context("Failed to create exec")?;

        let (stdout, stderr) = match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .context("Failed to start exec")?
        {
            StartExecResults::Attached { output, .. } => drain_output(output).await?,
            StartExecResults::Detached => {
                anyhow::bail!("Exec {} started detached, output unavailable", exec.id);
            }
        };

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .context("Failed to inspect exec")?;
        let exit_code = inspect
            .exit_code
            .context("Exec finished without an exit code")?;

        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(&self, step: &CommandStep) -> Result<ExecOutput> {
        self.run(step.args().to_vec(), step.workdir().map(str::to_string))
            .await
    }

    async fn write_files(&self, target: &str, files: Vec<StagedFile>) -> Result<()> {
        let mkdir = self
            .run(
                vec!["mkdir".to_string(), "-p".to_string(), target.to_string()],
                None,
            )
            .await?;
        if !mkdir.success() {
            anyhow::bail!("Failed to create {}: {}", target, mkdir.stderr.trim());
        }

        let archive = pack_tar(&files)?;
        debug!(container = %self.id, target, bytes = archive.len(), "Uploading archive");

        self.docker
            .upload_to_container(
                &self.id,
                Some(UploadToContainerOptions {
                    path: target.to_string(),
                    ..Default::default()
                }),
                Bytes::from(archive),
            )
            .await
            .with_context(|| format!("Failed to upload files into {}", target))
    }

    async fn read_tree(&self, target: &str) -> Result<Vec<StagedFile>> {
        let stream = self.docker.download_from_container(
            &self.id,
            Some(DownloadFromContainerOptions {
                path: target.to_string(),
            }),
        );
        futures_util::pin_mut!(stream);

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Failed to download {}", target))?;
            archive.extend_from_slice(&chunk);
        }
        debug!(container = %self.id, target, bytes = archive.len(), "Downloaded archive");

        unpack_tar(&archive)
    }

    async fn snapshot(&self, label: &str) -> Result<Option<String>> {
        let tag = format!("{}-{}", self.run_id, label);
        self.docker
            .commit_container(
                CommitContainerOptions {
                    container: self.id.clone(),
                    repo: SNAPSHOT_REPO.to_string(),
                    tag: tag.clone(),
                    pause: true,
                    ..Default::default()
                },
                Config::<String>::default(),
            )
            .await
            .with_context(|| format!("Failed to snapshot container {}", self.id))?;

        let reference = format!("{}:{}", SNAPSHOT_REPO, tag);
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reference.clone());
        debug!(container = %self.id, snapshot = %reference, "Committed step snapshot");
        Ok(Some(reference))
    }

    async fn release(&self) -> Result<()> {
        self.docker
            .remove_container(
                &self.id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .with_context(|| format!("Failed to remove container {}", self.id))?;
        debug!(container = %self.id, "Container removed");
        remove_snapshots(&self.docker, self.take_snapshots()).await;
        Ok(())
    }

    fn release_detached(&self) {
        let docker = self.docker.clone();
        let id = self.id.clone();
        let snapshots = self.take_snapshots();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let options = RemoveContainerOptions {
                        force: true,
                        v: true,
                        ..Default::default()
                    };
                    if let Err(e) = docker.remove_container(&id, Some(options)).await {
                        warn!(container = %id, error = %e, "Failed to remove container");
                    }
                    remove_snapshots(&docker, snapshots).await;
                });
            }
            Err(_) => {
                warn!(container = %id, "No runtime available, container left running");
            }
        }
    }
}

/// Best-effort removal of committed snapshot images.
async fn remove_snapshots(docker: &Docker, snapshots: Vec<String>) {
    for reference in snapshots {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        match docker.remove_image(&reference, Some(options), None).await {
            Ok(_) => debug!(snapshot = %reference, "Snapshot removed"),
            Err(e) => warn!(snapshot = %reference, error = %e, "Failed to remove snapshot"),
        }
    }
}

/// Split an attached exec stream into stdout and stderr. Each stream is
/// decoded once at the end so multi-byte characters may span chunks.
async fn drain_output<S>(mut output: S) -> Result<(String, String)>
where
    S: Stream<Item = std::result::Result<LogOutput, BollardError>> + Unpin,
{
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    while let Some(chunk) = output.next().await {
        match chunk.context("Failed to read exec output")? {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                stdout.extend_from_slice(&message);
            }
            LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
            LogOutput::StdIn { .. } => {}
        }
    }

    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    ))
}

fn pack_tar(files: &[StagedFile]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.contents.len() as u64);
        header.set_mode(file.mode);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, &file.path, file.contents.as_slice())
            .with_context(|| format!("Failed to archive {}", file.path.display()))?;
    }
    builder.into_inner().context("Failed to finish archive")
}

/// Unpack a container archive of a directory. Entries are rooted at the
/// directory's own name, which is stripped.
fn unpack_tar(archive: &[u8]) -> Result<Vec<StagedFile>> {
    let mut files = Vec::new();
    let mut tar = tar::Archive::new(Cursor::new(archive));

    for entry in tar.entries().context("Failed to read archive")? {
        let mut entry = entry.context("Failed to read archive entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw = entry.path().context("Invalid path in archive")?.into_owned();
        let path: PathBuf = raw.components().skip(1).collect();
        if path.as_os_str().is_empty() {
            continue;
        }
        if path.components().any(|c| !matches!(c, Component::Normal(_))) {
            anyhow::bail!("Refusing archive entry outside the tree: {}", raw.display());
        }

        let mode = entry.header().mode().unwrap_or(0o644);
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .with_context(|| format!("Failed to read {}", raw.display()))?;

        files.push(StagedFile {
            path,
            contents,
            mode,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
