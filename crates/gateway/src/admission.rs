//! Admission gate bounding how many archive jobs run at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[cfg(feature = "metrics")]
use archiver_metrics::{gauge, jobs as job_metrics, sandbox as sandbox_metrics};

/// Counting gate with `capacity` slots.
///
/// A slot is held from acquisition until the [`AdmissionPermit`] is dropped.
/// Waiters are served in FIFO order. A waiter that is cancelled before it
/// obtains a slot consumes nothing.
#[derive(Clone)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a free slot.
    ///
    /// Returns `None` only once the gate has been closed for shutdown.
    pub async fn acquire(&self) -> Option<AdmissionPermit> {
        #[cfg(feature = "metrics")]
        let _waiting = WaitingGuard::enter();

        let permit = Arc::clone(&self.slots).acquire_owned().await.ok()?;

        #[cfg(feature = "metrics")]
        gauge!(sandbox_metrics::ACTIVE).increment(1.0);

        Some(AdmissionPermit { _permit: permit })
    }

    /// Refuse new acquisitions. Held permits stay valid.
    pub fn close(&self) {
        self.slots.close();
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// One occupied slot. Dropping it releases the slot.
#[must_use = "dropping the permit releases the slot immediately"]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(feature = "metrics")]
impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        gauge!(sandbox_metrics::ACTIVE).decrement(1.0);
    }
}

#[cfg(feature = "metrics")]
struct WaitingGuard;

#[cfg(feature = "metrics")]
impl WaitingGuard {
    fn enter() -> Self {
        gauge!(job_metrics::ADMISSION_WAITING).increment(1.0);
        Self
    }
}

#[cfg(feature = "metrics")]
impl Drop for WaitingGuard {
    fn drop(&mut self) {
        gauge!(job_metrics::ADMISSION_WAITING).decrement(1.0);
    }
}
