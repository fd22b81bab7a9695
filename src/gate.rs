//! Process-wide admission control for outbound requests.
//!
//! One [`ConcurrencyGate`] is shared by every feed task. A task must hold a
//! [`GatePermit`] for the whole guarded section of a page fetch; dropping the
//! permit releases the slot, so early returns and `?` propagation release it
//! too.
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded gate admitting at most `capacity` concurrent holders.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot. Released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate with `capacity` slots. A capacity of 0 is raised to 1,
    /// a gate that never admits anyone would deadlock every feed.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) -> GatePermit {
        // The semaphore is owned by the gate and never closed, so acquisition
        // can only fail if that invariant is broken.
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("concurrency gate semaphore is never closed"),
        };
        GatePermit { _permit: permit }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
