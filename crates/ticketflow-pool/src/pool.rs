//! Ticket pool: a resizable counting semaphore with completion accounting.
//!
//! Backed by a tokio `Semaphore`. The pool keeps its logical capacity in
//! an atomic and tracks how many permits still have to be retired from
//! an earlier shrink. A returned ticket whose permit is owed to a pending
//! shrink is forgotten instead of going back to the semaphore.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};

use crate::error::{PoolError, PoolResult};

struct PoolInner {
    name: String,
    semaphore: Arc<Semaphore>,
    /// Logical capacity, as last set by `resize`.
    capacity: AtomicU32,
    /// Permits still owed to a shrink that outran idle permits.
    pending_shrink: AtomicU32,
    /// Tickets currently held.
    in_use: AtomicU32,
    /// Tickets returned since the pool was created.
    finished: AtomicU64,
    /// Serializes resize calls against each other.
    resize_lock: Mutex<()>,
}

/// A resizable admission pool.
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Clone)]
pub struct TicketPool {
    inner: Arc<PoolInner>,
}

/// A held admission ticket. Returned to the pool on drop.
pub struct Ticket {
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl std::fmt::Debug for TicketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketPool")
            .field("name", &self.inner.name)
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .field("finished", &self.finished_operations())
            .finish()
    }
}

impl TicketPool {
    /// Create a pool named `name` with `capacity` tickets.
    pub fn new(name: impl Into<String>, capacity: u32) -> PoolResult<Self> {
        let name = name.into();
        validate_capacity(&name, capacity)?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                name,
                semaphore: Arc::new(Semaphore::new(capacity as usize)),
                capacity: AtomicU32::new(capacity),
                pending_shrink: AtomicU32::new(0),
                in_use: AtomicU32::new(0),
                finished: AtomicU64::new(0),
                resize_lock: Mutex::new(()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current logical capacity.
    pub fn capacity(&self) -> u32 {
        self.inner.capacity.load(Ordering::Acquire)
    }

    /// Tickets currently held by callers.
    pub fn in_use(&self) -> u32 {
        self.inner.in_use.load(Ordering::Relaxed)
    }

    /// Tickets that can be handed out right now without waiting.
    pub fn available(&self) -> u32 {
        self.inner.semaphore.available_permits() as u32
    }

    /// Total tickets returned since creation. Never decreases.
    pub fn finished_operations(&self) -> u64 {
        self.inner.finished.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    /// Wait for a ticket.
    pub async fn acquire(&self) -> PoolResult<Ticket> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed(self.inner.name.clone()))?;
        Ok(self.issue(permit))
    }

    /// Take a ticket if one is free, without waiting.
    pub fn try_acquire(&self) -> PoolResult<Option<Ticket>> {
        match self.inner.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(self.issue(permit))),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(PoolError::Closed(self.inner.name.clone())),
        }
    }

    fn issue(&self, permit: OwnedSemaphorePermit) -> Ticket {
        self.inner.in_use.fetch_add(1, Ordering::Relaxed);
        Ticket {
            permit: Some(permit),
            pool: self.inner.clone(),
        }
    }

    /// Change the capacity of the pool.
    ///
    /// Growing takes effect immediately. Shrinking retires idle permits
    /// right away and defers the remainder until outstanding tickets are
    /// returned. Never blocks and never revokes a held ticket. Resizing to
    /// the current capacity is a no-op.
    pub fn resize(&self, capacity: u32) -> PoolResult<()> {
        let inner = &self.inner;
        if inner.semaphore.is_closed() {
            return Err(PoolError::Closed(inner.name.clone()));
        }
        validate_capacity(&inner.name, capacity)?;

        let _guard = inner
            .resize_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let old = inner.capacity.load(Ordering::Acquire);
        if capacity == old {
            return Ok(());
        }

        if capacity > old {
            let delta = capacity - old;
            let cancelled = take_up_to(&inner.pending_shrink, delta);
            let added = delta - cancelled;
            if added > 0 {
                inner.semaphore.add_permits(added as usize);
            }
            debug!(pool = %inner.name, from = old, to = capacity, cancelled, added, "pool grown");
        } else {
            let delta = old - capacity;
            let forgotten = inner.semaphore.forget_permits(delta as usize) as u32;
            let deferred = delta - forgotten;
            if deferred > 0 {
                inner.pending_shrink.fetch_add(deferred, Ordering::AcqRel);
            }
            debug!(pool = %inner.name, from = old, to = capacity, forgotten, deferred, "pool shrunk");
        }

        inner.capacity.store(capacity, Ordering::Release);
        Ok(())
    }

    /// Close the pool. Waiters are woken with `PoolError::Closed` and
    /// further resizes are rejected. Held tickets stay valid.
    pub fn close(&self) {
        self.inner.semaphore.close();
        info!(pool = %self.inner.name, "ticket pool closed");
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let pool = &self.pool;
        pool.in_use.fetch_sub(1, Ordering::Relaxed);
        pool.finished.fetch_add(1, Ordering::AcqRel);

        if let Some(permit) = self.permit.take()
            && take_up_to(&pool.pending_shrink, 1) == 1
        {
            permit.forget();
        }
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket").field("pool", &self.pool.name).finish()
    }
}

/// Atomically subtract up to `n` from `counter`, returning how much was taken.
fn take_up_to(counter: &AtomicU32, n: u32) -> u32 {
    match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
        (v > 0).then(|| v - v.min(n))
    }) {
        Ok(prev) => prev.min(n),
        Err(_) => 0,
    }
}

fn validate_capacity(name: &str, capacity: u32) -> PoolResult<()> {
    if capacity == 0 || capacity as usize > Semaphore::MAX_PERMITS {
        return Err(PoolError::InvalidCapacity {
            pool: name.to_string(),
            capacity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hold(pool: &TicketPool, n: usize) -> Vec<Ticket> {
        (0..n)
            .map(|_| pool.try_acquire().unwrap().expect("ticket available"))
            .collect()
    }

    #[test]
    fn new_rejects_zero_capacity() {
        assert!(matches!(
            TicketPool::new("read", 0),
            Err(PoolError::InvalidCapacity { capacity: 0, .. })
        ));
    }

    #[test]
    fn try_acquire_respects_capacity() {
        let pool = TicketPool::new("read", 2).unwrap();
        let held = hold(&pool, 2);

        assert!(pool.try_acquire().unwrap().is_none());
        assert_eq!(pool.in_use(), 2);

        drop(held);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn dropped_tickets_count_as_finished() {
        let pool = TicketPool::new("write", 4).unwrap();
        assert_eq!(pool.finished_operations(), 0);

        drop(hold(&pool, 3));
        drop(hold(&pool, 1));
        assert_eq!(pool.finished_operations(), 4);
    }

    #[test]
    fn grow_adds_permits() {
        let pool = TicketPool::new("read", 2).unwrap();
        let _held = hold(&pool, 2);

        pool.resize(5).unwrap();
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn shrink_of_idle_pool_is_immediate() {
        let pool = TicketPool::new("read", 10).unwrap();
        pool.resize(4).unwrap();

        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn shrink_never_evicts_held_tickets() {
        let pool = TicketPool::new("read", 6).unwrap();
        let mut held = hold(&pool, 5);

        pool.resize(2).unwrap();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.in_use(), 5);
        assert_eq!(pool.available(), 0);

        // Three returns pay off the deferred shrink; none are reissued.
        held.truncate(2);
        assert_eq!(pool.available(), 0);
        assert!(pool.try_acquire().unwrap().is_none());

        held.clear();
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn grow_cancels_pending_shrink_first() {
        let pool = TicketPool::new("write", 4).unwrap();
        let held = hold(&pool, 4);

        pool.resize(1).unwrap();
        pool.resize(3).unwrap();
        assert_eq!(pool.available(), 0);

        drop(held);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn resize_to_same_capacity_is_noop() {
        let pool = TicketPool::new("read", 8).unwrap();
        let _held = hold(&pool, 3);

        pool.resize(8).unwrap();
        pool.resize(8).unwrap();
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.available(), 5);
    }

    #[test]
    fn resize_rejected_after_close() {
        let pool = TicketPool::new("read", 8).unwrap();
        pool.close();

        assert_eq!(pool.resize(4), Err(PoolError::Closed("read".to_string())));
        assert_eq!(pool.capacity(), 8);
        assert!(pool.try_acquire().is_err());
    }

    #[test]
    fn resize_rejects_zero() {
        let pool = TicketPool::new("read", 8).unwrap();
        assert!(pool.resize(0).is_err());
        assert_eq!(pool.capacity(), 8);
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let pool = TicketPool::new("read", 1).unwrap();
        let first = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.finished_operations(), 2);
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let pool = TicketPool::new("write", 1).unwrap();
        let _held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        assert!(!pool.is_closed());
        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed(_))));
        assert!(matches!(pool.resize(4), Err(PoolError::Closed(_))));
    }
}
