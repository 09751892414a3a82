//! Concurrency actuator.
//!
//! Applies one concurrency level to the read and write admission pools.
//! The controller is the only caller that resizes the pools, so a level
//! check followed by a resize cannot race with another writer.

use std::sync::Arc;

use tracing::{debug, warn};

use ticketflow_pool::{PoolResult, TicketPool};

use crate::config::ConcurrencyBounds;
use crate::error::ActuationError;
use crate::stats::ProbingStats;

/// What the controller needs from an admission pool.
pub trait AdmissionPool: Send + Sync {
    fn name(&self) -> &str;

    /// Current capacity in tickets.
    fn capacity(&self) -> u32;

    /// Cumulative count of operations that released their ticket.
    fn finished_operations(&self) -> u64;

    /// Set the capacity. Must not block and must not revoke held tickets.
    fn resize(&self, capacity: u32) -> PoolResult<()>;
}

impl AdmissionPool for TicketPool {
    fn name(&self) -> &str {
        TicketPool::name(self)
    }

    fn capacity(&self) -> u32 {
        TicketPool::capacity(self)
    }

    fn finished_operations(&self) -> u64 {
        TicketPool::finished_operations(self)
    }

    fn resize(&self, capacity: u32) -> PoolResult<()> {
        TicketPool::resize(self, capacity)
    }
}

impl<P: AdmissionPool + ?Sized> AdmissionPool for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capacity(&self) -> u32 {
        (**self).capacity()
    }

    fn finished_operations(&self) -> u64 {
        (**self).finished_operations()
    }

    fn resize(&self, capacity: u32) -> PoolResult<()> {
        (**self).resize(capacity)
    }
}

/// Keeps the read and write pools at the same bounded capacity.
pub struct ConcurrencyActuator<P> {
    read: P,
    write: P,
    bounds: ConcurrencyBounds,
    stats: Arc<ProbingStats>,
}

impl<P: AdmissionPool> ConcurrencyActuator<P> {
    pub fn new(read: P, write: P, bounds: ConcurrencyBounds, stats: Arc<ProbingStats>) -> Self {
        Self {
            read,
            write,
            bounds,
            stats,
        }
    }

    pub fn read_pool(&self) -> &P {
        &self.read
    }

    pub fn write_pool(&self) -> &P {
        &self.write
    }

    /// Finished operations across both pools.
    pub fn finished_operations(&self) -> u64 {
        self.read
            .finished_operations()
            .saturating_add(self.write.finished_operations())
    }

    /// Clamp `level` into bounds and apply it to both pools.
    ///
    /// Pools already at the level are left alone, so repeating a call is
    /// free. If the write pool rejects the resize, the read pool is put
    /// back to its previous capacity before the error is returned.
    pub fn set_concurrency(&self, level: u32) -> Result<u32, ActuationError> {
        let level = self.bounds.clamp(level);

        let read_prev = self.read.capacity();
        if read_prev != level {
            self.read
                .resize(level)
                .map_err(|source| ActuationError::Read {
                    capacity: level,
                    source,
                })?;
        }

        if self.write.capacity() != level
            && let Err(source) = self.write.resize(level)
        {
            if read_prev != level
                && let Err(e) = self.read.resize(read_prev)
            {
                warn!(
                    pool = self.read.name(),
                    capacity = read_prev,
                    error = %e,
                    "failed to restore read pool after write resize was rejected"
                );
            }
            return Err(ActuationError::Write {
                capacity: level,
                source,
            });
        }

        if read_prev != level {
            debug!(from = read_prev, to = level, "concurrency applied");
        }
        self.stats.record_concurrency(level);
        Ok(level)
    }
}
