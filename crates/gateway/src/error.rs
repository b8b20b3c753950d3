//! Outcome kinds of an `/archive` request and their HTTP mapping.

use {
    axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    thiserror::Error,
    tracing::error,
};

/// Body sent for every [`ArchiveError::Unexpected`].
pub const UNEXPECTED_ERROR_TEXT: &str = "Unexpected error is occured";

/// Separator between a message and the worker logs appended to it.
const LOG_SEPARATOR: &str = "\n===\n";

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Malformed or out-of-range query parameter.
    #[error("{0}")]
    Parameter(&'static str),

    /// Missing or wrong bearer token.
    #[error("not authenticated")]
    Auth,

    /// The worker exited with a non-zero status.
    #[error("Worker is terminated with non-zero status code{LOG_SEPARATOR}{logs}")]
    WorkerExit { code: i64, logs: String },

    /// The worker did not exit within the configured timeout.
    #[error("Worker timed out after {timeout_secs}s{LOG_SEPARATOR}{logs}")]
    WorkerTimeout { timeout_secs: u64, logs: String },

    /// The worker exited cleanly but left no archive behind.
    #[error("Archive file is not created{LOG_SEPARATOR}{logs}")]
    ArtifactMissing { logs: String },

    /// Any other fault. Detail stays in the server log.
    #[error("{UNEXPECTED_ERROR_TEXT}")]
    Unexpected(#[source] anyhow::Error),
}

impl ArchiveError {
    pub fn unexpected(source: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(source.into())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Parameter(_)
            | Self::WorkerExit { .. }
            | Self::WorkerTimeout { .. }
            | Self::ArtifactMissing { .. } => StatusCode::BAD_REQUEST,
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parameter(_) => "parameter",
            Self::Auth => "auth",
            Self::WorkerExit { .. } => "worker_exit",
            Self::WorkerTimeout { .. } => "worker_timeout",
            Self::ArtifactMissing { .. } => "artifact_missing",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

impl IntoResponse for ArchiveError {
    fn into_response(self) -> Response {
        if let Self::Unexpected(ref source) = self {
            error!(error = ?source, "failed to archive git repo");
        }
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(ArchiveError::Parameter("Invalid `disk_quota` parameter"), 400)]
    #[case(ArchiveError::Auth, 401)]
    #[case(ArchiveError::WorkerExit { code: 1, logs: String::new() }, 400)]
    #[case(ArchiveError::WorkerTimeout { timeout_secs: 60, logs: String::new() }, 400)]
    #[case(ArchiveError::ArtifactMissing { logs: String::new() }, 400)]
    #[case(ArchiveError::unexpected(anyhow::anyhow!("docker create failed")), 500)]
    fn maps_to_fixed_status(#[case] err: ArchiveError, #[case] status: u16) {
        assert_eq!(err.status().as_u16(), status);
    }

    #[test]
    fn worker_errors_embed_logs() {
        let err = ArchiveError::WorkerExit {
            code: 128,
            logs: "fatal: repository not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "Worker is terminated with non-zero status code\n===\nfatal: repository not found"
        );

        let err = ArchiveError::ArtifactMissing {
            logs: "+ zip -r".into(),
        };
        assert_eq!(err.to_string(), "Archive file is not created\n===\n+ zip -r");
    }

    #[test]
    fn unexpected_hides_detail() {
        let err = ArchiveError::unexpected(anyhow::anyhow!("permission denied on /var/run/docker.sock"));
        assert_eq!(err.to_string(), UNEXPECTED_ERROR_TEXT);
        assert_eq!(err.kind(), "unexpected");
    }
}
