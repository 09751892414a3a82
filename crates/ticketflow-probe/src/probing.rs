//! Throughput probing controller.
//!
//! Implements `Monitor` by combining the sampler, the probing state
//! machine and the actuator:
//!
//! ```text
//! run_cycle(ctx)
//!   ├── finished = read.finished + write.finished
//!   ├── sample   = sampler.sample(finished, ctx.now())
//!   ├── decision = probe.step(sample.ops_per_sec)
//!   └── actuator.set_concurrency(decision.target())
//! ```
//!
//! A rejected resize does not roll back the decision. The actuator is
//! called with the controller's level every cycle, so the next cycle
//! retries it.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actuator::{AdmissionPool, ConcurrencyActuator};
use crate::config::ProbingConfig;
use crate::error::{ConfigResult, ContextError};
use crate::fsm::{ProbeAction, ProbeState, ProbingState};
use crate::monitor::{CycleContext, Monitor};
use crate::sampler::{ThroughputSample, ThroughputSampler};
use crate::stats::ProbingStats;

/// Everything the controller carries from one cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub probe: ProbeState,
    pub sampler: ThroughputSampler,
}

impl ControllerState {
    pub fn concurrency(&self) -> u32 {
        self.probe.concurrency
    }

    pub fn phase(&self) -> ProbingState {
        self.probe.state
    }

    pub fn stable_throughput(&self) -> f64 {
        self.probe.stable_throughput
    }

    pub fn previous_finished(&self) -> u64 {
        self.sampler.previous_finished()
    }
}

/// What one completed cycle observed and did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub sample: ThroughputSample,
    pub action: ProbeAction,
    pub state: ProbingState,
    pub concurrency: u32,
    /// Both pools now run at `concurrency`.
    pub applied: bool,
}

/// Adjusts read and write pool concurrency to maximize throughput.
///
/// Assumes both pools start at the same capacity and always keeps them
/// equal.
pub struct ThroughputProbing<P> {
    config: ProbingConfig,
    actuator: ConcurrencyActuator<P>,
    state: ControllerState,
    stats: Arc<ProbingStats>,
}

impl<P: AdmissionPool> ThroughputProbing<P> {
    /// Build a controller over `read` and `write`, seeded from the read
    /// pool's capacity and both pools' finished counters as of `start`.
    pub fn new(read: P, write: P, config: ProbingConfig, start: Instant) -> ConfigResult<Self> {
        config.validate()?;

        let bounds = config.bounds();
        let initial = bounds.clamp(read.capacity());
        if read.capacity() != write.capacity() {
            warn!(
                read = read.capacity(),
                write = write.capacity(),
                using = initial,
                "read and write pools start at different capacities"
            );
        }

        let stats = Arc::new(ProbingStats::new());
        stats.record_concurrency(initial);
        let actuator = ConcurrencyActuator::new(read, write, bounds, stats.clone());
        let finished = actuator.finished_operations();

        info!(
            concurrency = initial,
            min = bounds.min,
            max = bounds.max,
            step_fraction = config.step_fraction,
            noise_tolerance = config.noise_tolerance,
            "throughput probing initialized"
        );

        Ok(Self {
            state: ControllerState {
                probe: ProbeState::new(initial),
                sampler: ThroughputSampler::new(finished, start),
            },
            config,
            actuator,
            stats,
        })
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn concurrency(&self) -> u32 {
        self.state.concurrency()
    }

    pub fn config(&self) -> &ProbingConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<ProbingStats> {
        self.stats.clone()
    }

    pub fn actuator(&self) -> &ConcurrencyActuator<P> {
        &self.actuator
    }

    /// One control cycle with measurements stamped at `now`.
    pub fn cycle_at(&mut self, now: Instant) -> CycleReport {
        let finished = self.actuator.finished_operations();
        let sample = self
            .state
            .sampler
            .sample(finished, now, self.config.interval);
        if sample.regressed {
            warn!(
                finished,
                "finished-operation counter went backwards; treating throughput as zero"
            );
            self.stats.record_regression();
        }

        let decision = self.state.probe.step(sample.ops_per_sec, &self.config);
        self.state.probe = decision.next;
        self.stats.record_action(&decision.action);
        log_action(&decision.action, sample.ops_per_sec, decision.next.stable_throughput);

        let applied = match self.actuator.set_concurrency(decision.target()) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    concurrency = decision.target(),
                    error = %e,
                    "resize rejected; will retry next cycle"
                );
                self.stats.record_resize_failure();
                false
            }
        };

        self.stats
            .record_cycle(sample.ops_per_sec, self.state.probe.stable_throughput);

        CycleReport {
            sample,
            action: decision.action,
            state: self.state.probe.state,
            concurrency: self.state.probe.concurrency,
            applied,
        }
    }
}

impl<P: AdmissionPool, C: CycleContext> Monitor<C> for ThroughputProbing<P> {
    type Report = CycleReport;

    fn name(&self) -> &'static str {
        "throughput_probing"
    }

    fn run_cycle(&mut self, ctx: &C) -> CycleReport {
        self.cycle_at(ctx.now())
    }

    fn cycle_skipped(&mut self, _error: &ContextError) {
        self.stats.record_skipped();
    }
}

fn log_action(action: &ProbeAction, throughput: f64, baseline: f64) {
    match *action {
        ProbeAction::Hold => {
            debug!(throughput, baseline, "holding concurrency");
        }
        ProbeAction::Probe {
            direction,
            from,
            to,
        } => {
            debug!(?direction, from, to, throughput, "probing");
        }
        ProbeAction::Accept { direction, level } => {
            info!(?direction, level, throughput, "probe accepted");
        }
        ProbeAction::Revert {
            direction,
            from,
            to,
        } => {
            debug!(?direction, from, to, throughput, baseline, "probe reverted");
        }
    }
}
