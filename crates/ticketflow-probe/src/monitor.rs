//! Periodic monitor plumbing.
//!
//! A `Monitor` is anything that runs one control cycle at a time inside a
//! scoped execution context. The `MonitorDriver` owns the monitor and a
//! `ContextProvider`, acquires a context per tick, and runs the cycle on a
//! fixed interval until told to shut down.
//!
//! ```text
//! MonitorDriver::run
//!   └── every interval
//!       ├── provider.acquire() ── Err ──▶ skip, monitor state untouched
//!       └── Ok(ctx) ──▶ monitor.run_cycle(&ctx) ──▶ ctx dropped
//! ```
//!
//! Shutdown is only observed between cycles; a cycle always runs to
//! completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ContextError;

/// The scoped context a single cycle runs in.
pub trait CycleContext {
    /// Timestamp for measurements taken during this cycle.
    fn now(&self) -> Instant;
}

/// Hands out one `CycleContext` per cycle. Contexts are released by drop.
pub trait ContextProvider: Send + Sync {
    type Context: CycleContext;

    fn acquire(&self) -> Result<Self::Context, ContextError>;
}

/// A periodic control strategy driven by `MonitorDriver`.
pub trait Monitor<C: CycleContext>: Send {
    type Report: std::fmt::Debug;

    fn name(&self) -> &'static str;

    /// Run one cycle. Must not block or sleep.
    fn run_cycle(&mut self, ctx: &C) -> Self::Report;

    /// Called instead of `run_cycle` when no context could be acquired.
    fn cycle_skipped(&mut self, _error: &ContextError) {}
}

/// Result of one driver tick.
#[derive(Debug)]
pub enum CycleOutcome<R> {
    Completed(R),
    Skipped(ContextError),
}

impl<R> CycleOutcome<R> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped(_))
    }

    pub fn report(self) -> Option<R> {
        match self {
            CycleOutcome::Completed(r) => Some(r),
            CycleOutcome::Skipped(_) => None,
        }
    }
}

/// Runs a monitor once per interval.
pub struct MonitorDriver<P, M> {
    provider: P,
    monitor: M,
    interval: Duration,
}

impl<P, M> MonitorDriver<P, M>
where
    P: ContextProvider,
    M: Monitor<P::Context>,
{
    pub fn new(provider: P, monitor: M, interval: Duration) -> Self {
        Self {
            provider,
            monitor,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_monitor(self) -> M {
        self.monitor
    }

    /// Run exactly one cycle now.
    pub fn tick(&mut self) -> CycleOutcome<M::Report> {
        let ctx = match self.provider.acquire() {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(monitor = self.monitor.name(), error = %e, "cycle skipped");
                self.monitor.cycle_skipped(&e);
                return CycleOutcome::Skipped(e);
            }
        };

        let report = self.monitor.run_cycle(&ctx);
        drop(ctx);
        CycleOutcome::Completed(report)
    }

    /// Tick every interval until `shutdown` changes, then hand the monitor back.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> M {
        let interval = self.interval;
        info!(
            monitor = self.monitor.name(),
            interval_ms = interval.as_millis() as u64,
            "monitor started"
        );

        if *shutdown.borrow_and_update() {
            info!(monitor = self.monitor.name(), "monitor shut down before first cycle");
            return self.monitor;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let outcome = self.tick();
                    debug!(monitor = self.monitor.name(), ?outcome, "cycle finished");
                }
                _ = shutdown.changed() => {
                    info!(monitor = self.monitor.name(), "monitor shutting down");
                    break;
                }
            }
        }

        self.monitor
    }
}

/// Wall-clock contexts. Refuses new contexts once shut down.
#[derive(Debug, Default)]
pub struct SystemContextProvider {
    closing: AtomicBool,
}

/// Context handed out by `SystemContextProvider`.
#[derive(Debug)]
pub struct SystemContext {
    started: Instant,
}

impl SystemContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop handing out contexts.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::Release);
    }
}

impl ContextProvider for SystemContextProvider {
    type Context = SystemContext;

    fn acquire(&self) -> Result<SystemContext, ContextError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(ContextError::ShuttingDown);
        }
        Ok(SystemContext {
            started: Instant::now(),
        })
    }
}

impl CycleContext for SystemContext {
    fn now(&self) -> Instant {
        self.started
    }
}

/// Contexts on a hand-advanced clock, with injectable acquisition
/// failures. Used by the simulator and by tests.
#[derive(Debug)]
pub struct ManualContextProvider {
    start: Instant,
    offset_nanos: AtomicU64,
    fail_next: AtomicU32,
    live: Arc<AtomicUsize>,
    acquired: AtomicU64,
}

/// Context handed out by `ManualContextProvider`.
#[derive(Debug)]
pub struct ManualContext {
    now: Instant,
    live: Arc<AtomicUsize>,
}

impl ManualContextProvider {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            offset_nanos: AtomicU64::new(0),
            fail_next: AtomicU32::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            acquired: AtomicU64::new(0),
        }
    }

    /// Current time on the manual clock.
    pub fn now(&self) -> Instant {
        self.start + Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
    }

    pub fn advance(&self, by: Duration) {
        self.offset_nanos
            .fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }

    /// Make the next `n` acquisitions fail.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.fetch_add(n, Ordering::AcqRel);
    }

    /// Contexts acquired and not yet dropped.
    pub fn live_contexts(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Contexts successfully handed out so far.
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Acquire)
    }
}

impl ContextProvider for ManualContextProvider {
    type Context = ManualContext;

    fn acquire(&self) -> Result<ManualContext, ContextError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ContextError::Unavailable("injected failure".into()));
        }

        self.live.fetch_add(1, Ordering::AcqRel);
        self.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(ManualContext {
            now: self.now(),
            live: self.live.clone(),
        })
    }
}

impl<T: ContextProvider + ?Sized> ContextProvider for Arc<T> {
    type Context = T::Context;

    fn acquire(&self) -> Result<Self::Context, ContextError> {
        (**self).acquire()
    }
}

impl CycleContext for ManualContext {
    fn now(&self) -> Instant {
        self.now
    }
}

impl Drop for ManualContext {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}
