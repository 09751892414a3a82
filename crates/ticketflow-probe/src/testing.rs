//! Test doubles for the controller's collaborators.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use ticketflow_pool::{PoolError, PoolResult};

use crate::actuator::AdmissionPool;

/// In-memory admission pool with a scriptable finished counter and
/// switchable resize rejection. Records every accepted resize.
#[derive(Debug)]
pub struct FakePool {
    name: &'static str,
    capacity: AtomicU32,
    finished: AtomicU64,
    reject: AtomicBool,
    resizes: Mutex<Vec<u32>>,
}

impl FakePool {
    pub fn new(name: &'static str, capacity: u32) -> Self {
        Self {
            name,
            capacity: AtomicU32::new(capacity),
            finished: AtomicU64::new(0),
            reject: AtomicBool::new(false),
            resizes: Mutex::new(Vec::new()),
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

    pub fn resizes(&self) -> Vec<u32> {
        self.resizes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
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
        self.resizes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(capacity);
        self.capacity.store(capacity, Ordering::SeqCst);
        Ok(())
    }
}
