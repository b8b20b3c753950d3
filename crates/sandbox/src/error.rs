use std::time::Duration;

use thiserror::Error;

/// Failure of a single container lifecycle call.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("failed to run {cli}: {source}")]
    Spawn {
        cli: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{cli} {op} failed: {stderr}")]
    Command {
        cli: String,
        op: &'static str,
        stderr: String,
    },

    #[error("unexpected output from {op}: {output:?}")]
    UnexpectedOutput { op: &'static str, output: String },

    #[error("invalid sandbox spec: {0}")]
    InvalidSpec(String),

    #[error("sandbox {id} did not exit within {}s", timeout.as_secs())]
    Timeout { id: String, timeout: Duration },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl SandboxError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failure to run a job on the blocking pool.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("blocking pool is closed")]
    Closed,

    #[error("blocking task panicked")]
    Panicked(#[source] tokio::task::JoinError),
}
