use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::PoolError;

/// Bounded executor for blocking calls.
///
/// At most `size` closures run at once on tokio's blocking threads; further
/// submissions wait (asynchronously) for a free worker. Dropping the future
/// returned by [`BlockingPool::run`] after the closure has started does not
/// stop it: the worker finishes, keeps its slot until then, and the result
/// is discarded.
#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of closures currently running.
    #[must_use]
    pub fn busy(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Run `f` on a pool worker and await its result.
    pub async fn run<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(PoolError::Panicked)
    }

    /// Stop accepting work. Closures already running are unaffected.
    pub fn close(&self) {
        self.permits.close();
    }
}

impl std::fmt::Debug for BlockingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingPool")
            .field("size", &self.size)
            .field("busy", &self.busy())
            .finish()
    }
}
