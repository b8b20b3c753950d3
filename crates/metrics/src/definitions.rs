//! Metric name and label definitions.
//!
//! Every metric emitted by git-archiver is named here so the exported set is
//! documented in one place.

/// HTTP request metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "git_archiver_http_requests_total";
    /// Duration of HTTP requests in seconds (until headers are sent)
    pub const REQUEST_DURATION_SECONDS: &str = "git_archiver_http_request_duration_seconds";
}

/// Archive job metrics
pub mod jobs {
    /// Total number of archive jobs, labelled by outcome
    pub const TOTAL: &str = "git_archiver_jobs_total";
    /// Time from admission to a decided outcome, in seconds
    pub const DURATION_SECONDS: &str = "git_archiver_job_duration_seconds";
    /// Requests currently waiting for an admission slot
    pub const ADMISSION_WAITING: &str = "git_archiver_admission_waiting";
    /// Bytes of archives handed to the responder
    pub const ARCHIVE_BYTES_TOTAL: &str = "git_archiver_archive_bytes_total";
}

/// Sandbox lifecycle metrics
pub mod sandbox {
    /// Worker containers currently holding an admission slot
    pub const ACTIVE: &str = "git_archiver_sandboxes_active";
    /// Total number of worker containers created
    pub const CREATED_TOTAL: &str = "git_archiver_sandboxes_created_total";
    /// Worker runs that hit the execution timeout
    pub const TIMEOUTS_TOTAL: &str = "git_archiver_sandbox_timeouts_total";
    /// Failed cleanup steps (container removal or artifact deletion)
    pub const CLEANUP_ERRORS_TOTAL: &str = "git_archiver_cleanup_errors_total";
}

/// Common label keys
pub mod labels {
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const OUTCOME: &str = "outcome";
    pub const STEP: &str = "step";
}

/// Standard histogram buckets for different metric types
pub mod buckets {
    use once_cell::sync::Lazy;

    /// HTTP request duration buckets (in seconds)
    /// Covers 1ms to 60s
    pub static HTTP_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]
    });

    /// Job duration buckets (in seconds)
    /// Covers 250ms to 10 minutes; clones of large repositories are slow.
    pub static JOB_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0, 600.0,
        ]
    });
}
