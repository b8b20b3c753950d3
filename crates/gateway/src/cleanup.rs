//! Resource release for one archive job.
//!
//! Order is fixed: the worker container is removed first, then the artifact
//! is deleted, then the script. Failures are logged and counted, never
//! surfaced to the client. If the owning request is cancelled, `Drop` hands
//! the remaining work to a background task on a shared [`TaskTracker`];
//! shutdown waits on that tracker before the blocking pool is closed.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {
    archiver_sandbox::{SandboxClient, SandboxHandle},
    tokio_util::task::TaskTracker,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use archiver_metrics::{counter, labels, sandbox as sandbox_metrics};

use crate::job::JobScript;

/// Artifact path that is deleted when the guard drops.
///
/// Deleting a file that was never created (or is already gone) is not an
/// error.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "artifact deleted"),
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to delete artifact");
                record_cleanup_error("artifact");
            },
        }
    }
}

/// Everything a job holds that must be released.
pub struct Cleanup {
    client: SandboxClient,
    background: TaskTracker,
    sandbox: Option<SandboxHandle>,
    artifact: Option<ArtifactGuard>,
    script: Option<JobScript>,
}

impl Cleanup {
    pub fn new(
        client: SandboxClient,
        background: TaskTracker,
        artifact: ArtifactGuard,
        script: JobScript,
    ) -> Self {
        Self {
            client,
            background,
            sandbox: None,
            artifact: Some(artifact),
            script: Some(script),
        }
    }

    /// Register a container for removal. Called before `create` is issued,
    /// with the container's name, so a cancellation mid-create is covered.
    pub fn track_sandbox(&mut self, sandbox: SandboxHandle) {
        self.sandbox = Some(sandbox);
    }

    /// Force-remove the tracked container, if any.
    pub async fn remove_sandbox(&mut self) {
        // Taken only after removal finishes, so a cancellation during the
        // await leaves the handle for `Drop`.
        if let Some(sandbox) = self.sandbox.as_ref() {
            remove_logged(&self.client, sandbox).await;
            self.sandbox = None;
        }
    }

    /// Remove the container, then delete the artifact and the script.
    pub async fn finish(mut self) {
        self.remove_sandbox().await;
        // Drop does the rest synchronously now that no container is tracked.
    }

    /// Remove the container and hand over the artifact for delivery. The
    /// script is deleted here.
    pub async fn into_artifact(mut self) -> Option<ArtifactGuard> {
        self.remove_sandbox().await;
        self.script.take();
        self.artifact.take()
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        let artifact = self.artifact.take();
        let script = self.script.take();
        let Some(sandbox) = self.sandbox.take() else {
            drop(artifact);
            drop(script);
            return;
        };

        // The container still exists: remove it before touching the files it
        // may be writing.
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let client = self.client.clone();
                self.background.spawn_on(
                    async move {
                        remove_logged(&client, &sandbox).await;
                        drop(artifact);
                        drop(script);
                    },
                    &rt,
                );
            },
            Err(_) => {
                warn!(container = %sandbox, "no runtime to remove container, it is leaked");
                record_cleanup_error("container");
                drop(artifact);
                drop(script);
            },
        }
    }
}

async fn remove_logged(client: &SandboxClient, sandbox: &SandboxHandle) {
    match client.remove(sandbox).await {
        Ok(()) => debug!(container = %sandbox, "container removed"),
        Err(e) => {
            warn!(container = %sandbox, error = %e, "failed to remove container");
            record_cleanup_error("container");
        },
    }
}

fn record_cleanup_error(_step: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(sandbox_metrics::CLEANUP_ERRORS_TOTAL, labels::STEP => _step).increment(1);
}
