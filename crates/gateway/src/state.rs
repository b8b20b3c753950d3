use std::sync::Arc;

use secrecy::Secret;

#[cfg(feature = "metrics")]
use archiver_metrics::MetricsHandle;

use crate::jobs::ArchiveJobs;

/// Shared, immutable state behind every route.
pub struct GatewayState {
    /// Server version reported by `/health`.
    pub version: String,
    pub jobs: ArchiveJobs,
    /// Bearer token required on `/archive`. `None` disables the check.
    pub access_key: Option<Secret<String>>,
    /// Upper bound (and default) for `disk_quota`, in bytes.
    pub max_disk_quota: u64,
    /// Metrics handle for Prometheus export (None if metrics disabled).
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(
        jobs: ArchiveJobs,
        access_key: Option<Secret<String>>,
        max_disk_quota: u64,
        #[cfg(feature = "metrics")] metrics_handle: Option<MetricsHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            jobs,
            access_key,
            max_disk_quota,
            #[cfg(feature = "metrics")]
            metrics_handle,
        })
    }
}
