//! Resizable admission gate.
//!
//! A counting gate whose capacity is an atomic: each admission compares the
//! in-flight count against the capacity current at that instant. Lowering the
//! capacity never preempts admitted holders, so the in-flight count can sit
//! above a freshly lowered capacity until those holders finish.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::Notify;

#[derive(Debug)]
pub struct BoundedDispatcher {
    capacity: AtomicUsize,
    in_flight: AtomicUsize,
    released: Notify,
}

/// Slot held by an admitted operation; dropping it releases the slot.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct DispatchPermit {
    gate: Arc<BoundedDispatcher>,
}

impl BoundedDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(capacity),
            in_flight: AtomicUsize::new(0),
            released: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn set_capacity(&self, capacity: usize) {
        let previous = self.capacity.swap(capacity, Ordering::AcqRel);
        if capacity > previous {
            self.released.notify_waiters();
        }
    }

    pub async fn acquire(self: &Arc<Self>) -> DispatchPermit {
        loop {
            // Register interest before checking, so a release between the
            // check and the await is not lost.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_admit() {
                return DispatchPermit {
                    gate: Arc::clone(self),
                };
            }
            notified.await;
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<DispatchPermit> {
        self.try_admit().then(|| DispatchPermit {
            gate: Arc::clone(self),
        })
    }

    fn try_admit(&self) -> bool {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.capacity() {
                return false;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.released.notify_one();
    }
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
