//! Bounded admission for tool execution.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{SynthesisError, SynthesisResult};

/// Counting gate limiting how many pipelines run at once.
///
/// Waiters are admitted in arrival order. Cloning shares the same gate.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of admission; the slot is released when this is dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Create a gate admitting up to `capacity` concurrent runs.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.get())),
            capacity: capacity.get(),
        }
    }

    /// A gate that serializes all runs.
    pub fn single_flight() -> Self {
        Self::new(NonZeroUsize::MIN)
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> SynthesisResult<AdmissionPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SynthesisError::internal("admission gate closed"))?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::single_flight()
    }
}
