use std::{sync::Arc, time::Duration};

use {
    tokio::sync::oneshot,
    tracing::{debug, warn},
};

use crate::{
    error::{PoolError, SandboxError},
    pool::BlockingPool,
    runtime::{SandboxHandle, SandboxRuntime, SandboxSpec},
};

/// Async front for a [`SandboxRuntime`]: every lifecycle call is offloaded to
/// the shared [`BlockingPool`].
#[derive(Clone)]
pub struct SandboxClient {
    runtime: Arc<dyn SandboxRuntime>,
    pool: BlockingPool,
}

impl SandboxClient {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, pool: BlockingPool) -> Self {
        Self { runtime, pool }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.runtime.backend_name()
    }

    #[must_use]
    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }

    /// Create a container from `spec`.
    ///
    /// If the caller stops waiting before the backend returns, the container
    /// that was created anyway is removed on the pool worker.
    pub async fn create(&self, spec: SandboxSpec) -> Result<SandboxHandle, SandboxError> {
        let runtime = Arc::clone(&self.runtime);
        let (tx, mut rx) = oneshot::channel();
        self.pool
            .run(move || {
                let created = runtime.create(&spec);
                if let Err(Ok(orphan)) = tx.send(created) {
                    warn!(container = %orphan, "create abandoned by caller, removing container");
                    if let Err(e) = runtime.remove(&orphan) {
                        warn!(container = %orphan, error = %e, "failed to remove abandoned container");
                    }
                }
            })
            .await?;

        let handle = rx.try_recv().map_err(|_| PoolError::Closed)??;
        debug!(container = %handle, "sandbox created");
        Ok(handle)
    }

    pub async fn start(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        let runtime = Arc::clone(&self.runtime);
        let sandbox = sandbox.clone();
        self.pool.run(move || runtime.start(&sandbox)).await?
    }

    pub async fn wait(
        &self,
        sandbox: &SandboxHandle,
        timeout: Duration,
    ) -> Result<i64, SandboxError> {
        let runtime = Arc::clone(&self.runtime);
        let sandbox = sandbox.clone();
        self.pool
            .run(move || runtime.wait(&sandbox, timeout))
            .await?
    }

    pub async fn logs(&self, sandbox: &SandboxHandle) -> Result<String, SandboxError> {
        let runtime = Arc::clone(&self.runtime);
        let sandbox = sandbox.clone();
        self.pool.run(move || runtime.logs(&sandbox)).await?
    }

    pub async fn remove(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        let runtime = Arc::clone(&self.runtime);
        let sandbox = sandbox.clone();
        self.pool.run(move || runtime.remove(&sandbox)).await?
    }
}
