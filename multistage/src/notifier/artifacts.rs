//! Artifact collection from the artifacts sidecar.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ContainerNotifier;
use crate::cancellation::CancellationToken;
use crate::core::ContainerEvent;
use crate::errors::ClientError;
use crate::pod::PodClient;

/// Name of the sidecar container holding artifacts.
pub const ARTIFACTS_CONTAINER: &str = "artifacts";
/// Where the sidecar mounts the shared artifacts volume.
pub const ARTIFACTS_MOUNT_PATH: &str = "/tmp/artifacts";
/// The sidecar exits once this file exists.
pub const ARTIFACTS_DONE_FILE: &str = "/tmp/done";

const ARCHIVE_NAME: &str = "artifacts.tar.gz";

#[derive(Debug, Default)]
struct WorkerState {
    collected: bool,
    cancelled: bool,
}

/// Collects a step's artifacts once its container terminates.
///
/// The archive is streamed out of the sidecar with `tar`, extracted into
/// the local directory, and the sidecar is then released by creating
/// [`ARTIFACTS_DONE_FILE`]. The sidecar is released even when no local
/// directory is configured. Failures are logged and never fail the step.
/// Cancelling the worker abandons a collection that is still running.
pub struct ArtifactWorker {
    client: Arc<dyn PodClient>,
    pod: String,
    container: String,
    dir: Option<PathBuf>,
    state: Mutex<WorkerState>,
    stop: CancellationToken,
}

impl ArtifactWorker {
    /// Creates a worker watching `container` of `pod`.
    #[must_use]
    pub fn new(
        client: Arc<dyn PodClient>,
        pod: impl Into<String>,
        container: impl Into<String>,
        dir: Option<PathBuf>,
    ) -> Self {
        Self {
            client,
            pod: pod.into(),
            container: container.into(),
            dir,
            state: Mutex::new(WorkerState::default()),
            stop: CancellationToken::new(),
        }
    }

    /// Returns true once collection ran.
    #[must_use]
    pub fn is_collected(&self) -> bool {
        self.state.lock().collected
    }

    async fn exec(&self, command: &[&str]) -> Result<Vec<u8>, ClientError> {
        let command: Vec<String> = command.iter().map(ToString::to_string).collect();
        self.client.exec(&self.pod, ARTIFACTS_CONTAINER, &command).await
    }

    async fn download(&self, dir: &Path) -> Result<(), ClientError> {
        let archive = self.exec(&["tar", "czf", "-", "-C", ARTIFACTS_MOUNT_PATH, "."]).await?;
        tokio::fs::create_dir_all(dir).await?;
        let archive_path = dir.join(ARCHIVE_NAME);
        tokio::fs::write(&archive_path, &archive).await?;

        let output = tokio::process::Command::new("tar")
            .arg("xzf")
            .arg(&archive_path)
            .arg("-C")
            .arg(dir)
            .output()
            .await?;
        tokio::fs::remove_file(&archive_path).await?;
        if !output.status.success() {
            return Err(ClientError::Io(std::io::Error::other(format!(
                "could not extract artifacts: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        debug!(pod = %self.pod, dir = %dir.display(), bytes = archive.len(), "Extracted artifacts");
        Ok(())
    }

    async fn collect(&self) {
        if let Some(dir) = &self.dir {
            match self.download(dir).await {
                Ok(()) => info!(pod = %self.pod, dir = %dir.display(), "Collected artifacts"),
                Err(e) => warn!(pod = %self.pod, "Failed to collect artifacts: {}", e),
            }
        }
        if let Err(e) = self.exec(&["touch", ARTIFACTS_DONE_FILE]).await {
            warn!(pod = %self.pod, "Failed to release artifacts container: {}", e);
        }
    }
}

#[async_trait]
impl ContainerNotifier for ArtifactWorker {
    async fn on_container_event(&self, event: &ContainerEvent) {
        if !event.is_terminal() || event.container() != self.container {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.collected || state.cancelled {
                return;
            }
            state.collected = true;
        }
        tokio::select! {
            biased;
            () = self.stop.cancelled() => warn!(pod = %self.pod, "Artifact collection abandoned"),
            () = self.collect() => {}
        }
    }

    fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.stop.cancel("artifact collection cancelled");
    }
}

impl std::fmt::Debug for ArtifactWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWorker")
            .field("pod", &self.pod)
            .field("container", &self.container)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}
