//! Shared helpers for the integration tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use ticketflow_pool::{PoolError, PoolResult};
use ticketflow_probe::AdmissionPool;

/// In-memory admission pool with a scriptable finished counter and
/// switchable resize rejection.
#[derive(Debug)]
pub struct FakePool {
    name: &'static str,
    capacity: AtomicU32,
    finished: AtomicU64,
    reject: AtomicBool,
}

impl FakePool {
    pub fn new(name: &'static str, capacity: u32) -> Self {
        Self {
            name,
            capacity: AtomicU32::new(capacity),
            finished: AtomicU64::new(0),
            reject: AtomicBool::new(false),
        }
    }

    pub fn set_finished(&self, n: u64) {
        self.finished.store(n, Ordering::SeqCst);
    }

    pub fn add_finished(&self, n: u64) {
        self.finished.fetch_add(n, Ordering::SeqCst);
    }

    pub fn reject_resizes(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

impl AdmissionPool for FakePool {
    fn name(&self) -> &str {
        self.name
    }

    fn capacity(&self) -> u32 {
        self.capacity.load(Ordering::SeqCst)
    }

    fn finished_operations(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    fn resize(&self, capacity: u32) -> PoolResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(PoolError::Closed(self.name.to_string()));
        }
        self.capacity.store(capacity, Ordering::SeqCst);
        Ok(())
    }
}
