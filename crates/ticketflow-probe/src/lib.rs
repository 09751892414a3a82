//! ticketflow-probe: adaptive admission concurrency.
//!
//! Periodically samples completed-operation throughput across the read
//! and write ticket pools and hill-climbs the number of tickets toward
//! the level that maximizes it.
//!
//! # Architecture
//!
//! ```text
//! MonitorDriver (tokio, fixed interval, watch-channel shutdown)
//!   └── ContextProvider::acquire() ── fails ──▶ cycle skipped
//!       └── ThroughputProbing::run_cycle(&ctx)
//!           ├── ThroughputSampler   finished counter → ops/sec
//!           ├── ProbeState::step    Stable / ProbingUp / ProbingDown
//!           └── ConcurrencyActuator same capacity on read + write pools
//! ```
//!
//! # Probing
//!
//! From Stable the controller moves one step (a fraction of the current
//! level, at least one ticket) and waits a cycle. If throughput beats the
//! stable baseline by more than the noise tolerance the new level is
//! kept; otherwise the level reverts and the next probe goes the other
//! way. A throughput drop while stable triggers a probe downward. The
//! controller never settles for good: it keeps probing around the best
//! level it has found, so it follows workload drift.
//!
//! Nothing on the cycle path panics. Every failure degrades to holding
//! the current level until the next cycle.

pub mod actuator;
pub mod config;
pub mod error;
pub mod fsm;
pub mod monitor;
pub mod probing;
pub mod sampler;
pub mod stats;

#[cfg(test)]
mod testing;

pub use actuator::{AdmissionPool, ConcurrencyActuator};
pub use config::{ConcurrencyBounds, ProbingConfig};
pub use error::{ActuationError, ConfigError, ConfigResult, ContextError};
pub use fsm::{Decision, Direction, ProbeAction, ProbeState, ProbingState};
pub use monitor::{
    ContextProvider, CycleContext, CycleOutcome, ManualContext, ManualContextProvider, Monitor,
    MonitorDriver, SystemContext, SystemContextProvider,
};
pub use probing::{ControllerState, CycleReport, ThroughputProbing};
pub use sampler::{ThroughputSample, ThroughputSampler};
pub use stats::{ProbingStats, StatsSnapshot, render_prometheus};
