//! Archive job orchestration: admission, worker lifecycle, outcome.

use std::time::{Duration, Instant};

use {
    archiver_sandbox::{SandboxClient, SandboxHandle},
    tokio_util::task::TaskTracker,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use archiver_metrics::{
    counter, histogram, jobs as job_metrics, labels, sandbox as sandbox_metrics,
};

use crate::{
    admission::AdmissionGate,
    cleanup::{ArtifactGuard, Cleanup},
    error::ArchiveError,
    job::{ArchiveRequest, JobBuilder},
    responder::ArchiveDelivery,
};

/// How a worker run ended, as seen while the slot was held.
enum WorkerOutcome {
    Exited { code: i64, logs: String },
    TimedOut { logs: String },
}

/// Runs archive jobs against a sandbox backend.
#[derive(Clone)]
pub struct ArchiveJobs {
    gate: AdmissionGate,
    client: SandboxClient,
    builder: JobBuilder,
    timeout: Duration,
    /// Container removals handed off by cancelled jobs.
    background: TaskTracker,
}

impl ArchiveJobs {
    pub fn new(
        gate: AdmissionGate,
        client: SandboxClient,
        builder: JobBuilder,
        timeout: Duration,
    ) -> Self {
        Self {
            gate,
            client,
            builder,
            timeout,
            background: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    #[must_use]
    pub fn client(&self) -> &SandboxClient {
        &self.client
    }

    /// Stop admitting jobs, wait for background cleanup of cancelled jobs,
    /// then close the blocking pool.
    pub async fn shutdown(&self) {
        self.gate.close();
        self.background.close();
        if !self.background.is_empty() {
            info!(pending = self.background.len(), "waiting for container cleanup");
        }
        self.background.wait().await;
        self.client.pool().close();
    }

    /// Run one job to an outcome.
    ///
    /// On success the returned delivery owns the artifact; every other path
    /// has removed the container and deleted the artifact before returning.
    /// Dropping this future part way through still releases everything.
    pub async fn run(&self, request: ArchiveRequest) -> Result<ArchiveDelivery, ArchiveError> {
        let started = Instant::now();
        let result = self.run_inner(request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        debug!(outcome, elapsed_ms = started.elapsed().as_millis() as u64, "archive job finished");
        #[cfg(feature = "metrics")]
        {
            counter!(job_metrics::TOTAL, labels::OUTCOME => outcome).increment(1);
            histogram!(job_metrics::DURATION_SECONDS, labels::OUTCOME => outcome)
                .record(started.elapsed().as_secs_f64());
        }
        result
    }

    async fn run_inner(&self, request: ArchiveRequest) -> Result<ArchiveDelivery, ArchiveError> {
        let job = self
            .builder
            .build(&request)
            .map_err(|e| ArchiveError::Unexpected(anyhow::Error::new(e).context("writing job script")))?;
        let archive_name = job.archive_name.clone();
        let container_name = SandboxHandle::new(job.container_name());
        let spec = job.spec.clone();
        let mut cleanup = Cleanup::new(
            self.client.clone(),
            self.background.clone(),
            ArtifactGuard::new(&job.artifact_path),
            job.script,
        );

        let outcome = match self.execute(&mut cleanup, container_name, spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                cleanup.finish().await;
                return Err(e);
            },
        };

        let logs = match outcome {
            WorkerOutcome::TimedOut { logs } => {
                cleanup.finish().await;
                return Err(ArchiveError::WorkerTimeout {
                    timeout_secs: self.timeout.as_secs(),
                    logs,
                });
            },
            WorkerOutcome::Exited { code, logs } if code != 0 => {
                info!(archive = %archive_name, exit_code = code, "worker exited with non-zero status");
                cleanup.finish().await;
                return Err(ArchiveError::WorkerExit { code, logs });
            },
            WorkerOutcome::Exited { logs, .. } => logs,
        };

        let Some(artifact) = cleanup.into_artifact().await else {
            return Err(ArchiveError::unexpected(anyhow::anyhow!(
                "artifact guard already released"
            )));
        };
        match ArchiveDelivery::open(archive_name, artifact).await {
            Ok(delivery) => {
                info!(archive = %delivery.archive_name(), bytes = delivery.len(), "archive ready");
                Ok(delivery)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArchiveError::ArtifactMissing { logs })
            },
            Err(e) => Err(ArchiveError::Unexpected(
                anyhow::Error::new(e).context("opening archive"),
            )),
        }
    }

    /// Everything that happens while an admission slot is held. The slot is
    /// released when this returns, before any response is produced.
    async fn execute(
        &self,
        cleanup: &mut Cleanup,
        container_name: SandboxHandle,
        spec: archiver_sandbox::SandboxSpec,
    ) -> Result<WorkerOutcome, ArchiveError> {
        let _slot = self
            .gate
            .acquire()
            .await
            .ok_or_else(|| ArchiveError::unexpected(anyhow::anyhow!("admission gate closed")))?;

        // Tracked by name first: a cancellation during `create` still has
        // something to remove.
        cleanup.track_sandbox(container_name);
        let sandbox = self
            .client
            .create(spec)
            .await
            .map_err(|e| ArchiveError::Unexpected(anyhow::Error::new(e).context("creating worker")))?;
        cleanup.track_sandbox(sandbox.clone());
        #[cfg(feature = "metrics")]
        counter!(sandbox_metrics::CREATED_TOTAL).increment(1);

        self.client
            .start(&sandbox)
            .await
            .map_err(|e| ArchiveError::Unexpected(anyhow::Error::new(e).context("starting worker")))?;
        debug!(container = %sandbox, "worker started");

        match self.client.wait(&sandbox, self.timeout).await {
            Ok(code) => {
                let logs = self.client.logs(&sandbox).await.map_err(|e| {
                    ArchiveError::Unexpected(anyhow::Error::new(e).context("reading worker logs"))
                })?;
                Ok(WorkerOutcome::Exited { code, logs })
            },
            Err(e) if e.is_timeout() => {
                warn!(container = %sandbox, timeout_secs = self.timeout.as_secs(), "worker timed out");
                #[cfg(feature = "metrics")]
                counter!(sandbox_metrics::TIMEOUTS_TOTAL).increment(1);
                let logs = self.client.logs(&sandbox).await.unwrap_or_else(|e| {
                    debug!(container = %sandbox, error = %e, "no logs for timed out worker");
                    String::new()
                });
                Ok(WorkerOutcome::TimedOut { logs })
            },
            Err(e) => Err(ArchiveError::Unexpected(
                anyhow::Error::new(e).context("waiting for worker"),
            )),
        }
    }
}
