/// Config schema types (server, archive jobs, metrics).
use std::path::PathBuf;

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Default upper bound for a single job's scratch filesystem (50 MiB).
pub const DEFAULT_MAX_DISK_QUOTA: u64 = 50 * 1024 * 1024;

/// Default worker image: a minimal image with `bash`, `git` and `zip`.
pub const DEFAULT_WORKER_IMAGE: &str = "elice/git-and-zip:alpine";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    pub metrics: MetricsConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    /// Port to listen on. Defaults to 8080.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Archive job configuration: sandbox image, limits, and shared storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Host directory shared with every worker container. Job scripts and
    /// produced archives live here.
    pub volume_path: PathBuf,
    /// Maximum number of worker containers alive at once.
    pub concurrent_workers: usize,
    /// Size of the pool running blocking container calls. Defaults to twice
    /// `concurrent_workers` when unset.
    pub blocking_workers: Option<usize>,
    /// Upper bound (bytes) a caller may request for `disk_quota`.
    pub max_disk_quota: u64,
    /// Container CLI binary (`docker`, or a compatible CLI such as `podman`).
    pub docker_cli: String,
    /// Daemon address, exported as `DOCKER_HOST` for every CLI call.
    pub docker_host: Option<String>,
    pub worker_image: String,
    /// Seconds to wait for a worker before it is considered hung.
    pub timeout_secs: u64,
    /// Bearer token required on `/archive`. No auth when unset or empty.
    #[serde(
        serialize_with = "serialize_redacted_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_key: Option<Secret<String>>,
    /// Extension (without dot) of the archive produced by the worker script.
    pub archive_extension: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            volume_path: PathBuf::from("/tmp"),
            concurrent_workers: 8,
            blocking_workers: None,
            max_disk_quota: DEFAULT_MAX_DISK_QUOTA,
            docker_cli: "docker".into(),
            docker_host: Some("unix:///var/run/docker.sock".into()),
            worker_image: DEFAULT_WORKER_IMAGE.into(),
            timeout_secs: 60,
            access_key: None,
            archive_extension: "zip".into(),
        }
    }
}

impl ArchiveConfig {
    /// Effective size of the blocking pool.
    #[must_use]
    pub fn blocking_pool_size(&self) -> usize {
        self.blocking_workers
            .unwrap_or_else(|| self.concurrent_workers.saturating_mul(2))
    }

    /// The access key, ignoring an empty value.
    #[must_use]
    pub fn access_key(&self) -> Option<&Secret<String>> {
        use secrecy::ExposeSecret;
        self.access_key
            .as_ref()
            .filter(|key| !key.expose_secret().is_empty())
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the metrics recorder and expose `/metrics`.
    pub enabled: bool,
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_redacted_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}
