//! Semantic validation of a loaded configuration.
//!
//! Parsing already guarantees the shape; this pass checks the values that
//! would otherwise surface as confusing runtime failures (a zero-sized gate,
//! a pool that cannot overlap cleanup with gated work, a missing image).

use crate::schema::ArchiverConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "archive.timeout_secs"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn error(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path,
            message: message.into(),
        });
    }

    fn warning(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path,
            message: message.into(),
        });
    }
}

/// Validate `config`, collecting every problem rather than stopping at the first.
#[must_use]
pub fn validate(config: &ArchiverConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let archive = &config.archive;

    if archive.concurrent_workers == 0 {
        result.error("archive.concurrent_workers", "must be at least 1");
    }
    if archive.blocking_pool_size() <= archive.concurrent_workers {
        result.error(
            "archive.blocking_workers",
            format!(
                "must be larger than concurrent_workers ({}), got {}",
                archive.concurrent_workers,
                archive.blocking_pool_size()
            ),
        );
    }
    if archive.max_disk_quota == 0 {
        result.error("archive.max_disk_quota", "must be greater than 0");
    }
    if archive.timeout_secs == 0 {
        result.error("archive.timeout_secs", "must be greater than 0");
    }
    if archive.worker_image.trim().is_empty() {
        result.error("archive.worker_image", "must not be empty");
    }
    if archive.docker_cli.trim().is_empty() {
        result.error("archive.docker_cli", "must not be empty");
    }
    if archive.archive_extension.is_empty()
        || !archive
            .archive_extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.')
    {
        result.error(
            "archive.archive_extension",
            "must be a non-empty alphanumeric extension",
        );
    }
    if !archive.volume_path.is_absolute() {
        result.error(
            "archive.volume_path",
            "must be absolute: it is bind-mounted into worker containers",
        );
    }
    if archive.access_key().is_none() && config.server.bind != "127.0.0.1" {
        result.warning(
            "archive.access_key",
            "no access key configured; /archive is open to anyone who can reach the server",
        );
    }

    result
}
