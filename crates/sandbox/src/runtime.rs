use std::{path::PathBuf, time::Duration};

use crate::error::SandboxError;

/// A filesystem view mounted into a worker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mount {
    /// Host path bound into the container.
    Bind {
        source: PathBuf,
        target: String,
        read_only: bool,
    },
    /// Size-capped in-memory filesystem. Writes past `size_bytes` fail inside
    /// the container with ENOSPC.
    Tmpfs { target: String, size_bytes: u64 },
}

impl Mount {
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Bind { target, .. } | Self::Tmpfs { target, .. } => target,
        }
    }
}

/// Everything needed to create one worker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<Mount>,
    /// `uid[:gid]` the container process runs as.
    pub user: Option<String>,
    pub name: Option<String>,
}

/// Identity of a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxHandle {
    id: String,
}

impl SandboxHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Docker ids are 64 hex chars; the 12-char prefix is what `docker ps` shows.
        f.write_str(self.id.get(..12).unwrap_or(&self.id))
    }
}

/// Container backend. Every method blocks the calling thread, so it must
/// only be called from a blocking pool thread, never from an async task.
///
/// Lifecycle: `create → start → wait → logs → remove`. `remove` forces
/// termination, may be called in any state, and must succeed for a container
/// that is already gone.
pub trait SandboxRuntime: Send + Sync + 'static {
    /// Human-readable backend name (e.g. "docker").
    fn backend_name(&self) -> &'static str;

    fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError>;

    /// Begin execution without waiting for it to finish.
    fn start(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError>;

    /// Block until the container exits and return its exit code, or fail
    /// with [`SandboxError::Timeout`] once `timeout` elapses.
    fn wait(&self, sandbox: &SandboxHandle, timeout: Duration) -> Result<i64, SandboxError>;

    /// Combined stdout and stderr captured so far, in emission order.
    fn logs(&self, sandbox: &SandboxHandle) -> Result<String, SandboxError>;

    fn remove(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError>;
}

/// `uid:gid` of the current process, so files written by a container keep
/// host ownership.
#[cfg(unix)]
#[must_use]
pub fn host_user() -> Option<String> {
    use nix::unistd::{getegid, geteuid};
    Some(format!("{}:{}", geteuid().as_raw(), getegid().as_raw()))
}

#[cfg(not(unix))]
#[must_use]
pub fn host_user() -> Option<String> {
    None
}
