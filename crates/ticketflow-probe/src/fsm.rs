//! Probing state machine.
//!
//! A hill climb over the concurrency level with throughput as the
//! objective. Each tick feeds one throughput sample through `ProbeState::step`,
//! a pure function returning the next state and the action taken:
//!
//! ```text
//! Stable ──(dropped)──────────────▶ ProbingDown
//! Stable ──(otherwise)────────────▶ ProbingUp / ProbingDown (preferred direction)
//! Probing* ──(improved)───────────▶ Stable, keep level, new baseline
//! Probing* ──(not improved)───────▶ Stable, revert to pre-probe level
//! ```
//!
//! "Improved" and "dropped" are relative to the stable baseline and only
//! count when they exceed the configured noise tolerance. A probe blocked
//! by a bound goes the other way instead; the controller only holds when
//! the bounds leave no room in either direction.

use serde::Serialize;

use crate::config::ProbingConfig;

/// Direction of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Controller phase. Probing phases remember the level they revert to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbingState {
    Stable,
    ProbingUp { from: u32 },
    ProbingDown { from: u32 },
}

impl ProbingState {
    pub fn name(&self) -> &'static str {
        match self {
            ProbingState::Stable => "stable",
            ProbingState::ProbingUp { .. } => "probing_up",
            ProbingState::ProbingDown { .. } => "probing_down",
        }
    }

    fn probing(direction: Direction, from: u32) -> Self {
        match direction {
            Direction::Up => ProbingState::ProbingUp { from },
            Direction::Down => ProbingState::ProbingDown { from },
        }
    }
}

/// What a tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAction {
    /// Stay at the current level.
    Hold,
    /// Start a probe away from the stable level.
    Probe { direction: Direction, from: u32, to: u32 },
    /// The probe paid off; its level becomes the stable level.
    Accept { direction: Direction, level: u32 },
    /// The probe did not pay off; back to the pre-probe level.
    Revert { direction: Direction, from: u32, to: u32 },
}

/// The hill-climbing part of the controller state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeState {
    /// Level currently applied (or about to be applied) to the pools.
    pub concurrency: u32,
    /// Throughput last seen while stable, or from the last accepted probe.
    pub stable_throughput: f64,
    pub state: ProbingState,
    /// Direction the next unforced probe from Stable will take.
    pub preferred: Direction,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub next: ProbeState,
    pub action: ProbeAction,
}

impl Decision {
    /// The concurrency level to apply.
    pub fn target(&self) -> u32 {
        self.next.concurrency
    }
}

impl ProbeState {
    /// Initial state: stable at `concurrency` with a zero baseline, so the
    /// first tick probes upward.
    pub fn new(concurrency: u32) -> Self {
        Self {
            concurrency,
            stable_throughput: 0.0,
            state: ProbingState::Stable,
            preferred: Direction::Up,
        }
    }

    /// Advance the machine by one throughput observation.
    pub fn step(self, throughput: f64, config: &ProbingConfig) -> Decision {
        match self.state {
            ProbingState::Stable => self.from_stable(throughput, config),
            ProbingState::ProbingUp { from } => self.settle(Direction::Up, from, throughput, config),
            ProbingState::ProbingDown { from } => {
                self.settle(Direction::Down, from, throughput, config)
            }
        }
    }

    fn from_stable(self, throughput: f64, config: &ProbingConfig) -> Decision {
        let baseline = self.stable_throughput;
        let tolerance = config.noise_tolerance;

        let (direction, preferred) = if dropped(throughput, baseline, tolerance) {
            (Direction::Down, self.preferred)
        } else if improved(throughput, baseline, tolerance) {
            (Direction::Up, Direction::Up)
        } else {
            (self.preferred, self.preferred)
        };

        let from = self.concurrency;
        // Pinned at a bound: probe the other way so drift is still noticed.
        let (direction, to) = match stepped(from, direction, config) {
            to if to == from => (direction.flip(), stepped(from, direction.flip(), config)),
            to => (direction, to),
        };

        let mut next = ProbeState {
            stable_throughput: throughput,
            preferred,
            ..self
        };

        if to == from {
            return Decision {
                next,
                action: ProbeAction::Hold,
            };
        }

        next.concurrency = to;
        next.state = ProbingState::probing(direction, from);
        Decision {
            next,
            action: ProbeAction::Probe {
                direction,
                from,
                to,
            },
        }
    }

    fn settle(
        self,
        direction: Direction,
        from: u32,
        throughput: f64,
        config: &ProbingConfig,
    ) -> Decision {
        if improved(throughput, self.stable_throughput, config.noise_tolerance) {
            return Decision {
                next: ProbeState {
                    stable_throughput: throughput,
                    state: ProbingState::Stable,
                    preferred: direction,
                    ..self
                },
                action: ProbeAction::Accept {
                    direction,
                    level: self.concurrency,
                },
            };
        }

        let to = config.bounds().clamp(from);
        Decision {
            next: ProbeState {
                concurrency: to,
                state: ProbingState::Stable,
                preferred: direction.flip(),
                ..self
            },
            action: ProbeAction::Revert {
                direction,
                from: self.concurrency,
                to,
            },
        }
    }
}

/// `throughput` beats `baseline` by more than the tolerance.
pub fn improved(throughput: f64, baseline: f64, tolerance: f64) -> bool {
    throughput > baseline * (1.0 + tolerance)
}

/// `throughput` fell short of `baseline` by more than the tolerance.
pub fn dropped(throughput: f64, baseline: f64, tolerance: f64) -> bool {
    throughput < baseline * (1.0 - tolerance)
}

fn stepped(level: u32, direction: Direction, config: &ProbingConfig) -> u32 {
    let step = config.step_size(level);
    let bounds = config.bounds();
    match direction {
        Direction::Up => bounds.clamp(level.saturating_add(step)),
        Direction::Down => bounds.clamp(level.saturating_sub(step)),
    }
}
