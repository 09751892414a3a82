//! Synthetic workloads and the closed-loop simulation behind
//! `ticketflowd simulate`.
//!
//! Each simulated cycle pushes `objective(capacity) * interval` operations
//! through both ticket pools, advances a manual clock by one interval and
//! runs one driver tick, so the controller sees exactly the throughput the
//! objective dictates for the level it chose.

use std::fmt::Write as _;
use std::num::NonZeroU32;

use clap::ValueEnum;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use ticketflow_pool::{PoolResult, TicketPool};
use ticketflow_probe::{
    CycleOutcome, ManualContextProvider, MonitorDriver, ProbingConfig, StatsSnapshot,
    ThroughputProbing,
};

/// Ops/sec the `peak` and `flat` shapes reach.
const PEAK_OPS: f64 = 1000.0;

/// How throughput responds to the number of tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Single maximum at `--peak`, falling off on both sides.
    Peak,
    /// More tickets always help.
    Increasing,
    /// Fewer tickets always help.
    Decreasing,
    /// Concurrency makes no difference.
    Flat,
}

/// Throughput of one pool as a function of its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Objective {
    pub shape: Shape,
    pub peak: u32,
}

impl Objective {
    pub fn ops_per_sec(&self, level: u32) -> f64 {
        let c = level.max(1) as f64;
        match self.shape {
            Shape::Peak => {
                let peak = self.peak as f64;
                let width = (peak / 4.0).max(1.0);
                let d = (c - peak) / width;
                PEAK_OPS / (1.0 + d * d)
            }
            Shape::Increasing => c * c,
            Shape::Decreasing => 250_000.0 / (c * c),
            Shape::Flat => PEAK_OPS,
        }
    }
}

/// Deterministic multiplicative noise in `[1 - amplitude, 1 + amplitude)`.
#[derive(Debug, Clone)]
pub struct Noise {
    state: u64,
    amplitude: f64,
}

impl Noise {
    pub fn new(seed: u64, amplitude: f64) -> Self {
        Self {
            // xorshift never leaves zero
            state: seed.max(1),
            amplitude,
        }
    }

    pub fn factor(&mut self) -> f64 {
        if self.amplitude == 0.0 {
            return 1.0;
        }
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        let unit = (self.state % 1_000_000) as f64 / 1_000_000.0;
        1.0 + (unit * 2.0 - 1.0) * self.amplitude
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub objective: Objective,
    pub cycles: u32,
    pub start_concurrency: u32,
    /// Relative noise amplitude, in [0, 1).
    pub noise: f64,
    /// Fail context acquisition on every n-th cycle.
    pub fail_every: Option<NonZeroU32>,
    pub seed: u64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            objective: Objective {
                shape: Shape::Peak,
                peak: 40,
            },
            cycles: 200,
            start_concurrency: 20,
            noise: 0.0,
            fail_every: None,
            seed: 0x2545_F491_4F6C_DD1D,
        }
    }
}

/// One completed cycle as seen from outside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TracePoint {
    pub cycle: u32,
    pub concurrency: u32,
    pub throughput: f64,
    pub phase: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub shape: Shape,
    pub peak: Option<u32>,
    pub cycles: u32,
    pub skipped: u32,
    pub initial_concurrency: u32,
    pub final_concurrency: u32,
    /// Cycle with the highest measured throughput.
    pub best: Option<TracePoint>,
    pub trace: Vec<TracePoint>,
    pub stats: StatsSnapshot,
}

/// Run `ops` operations through `pool`, never more than its capacity at
/// once. Returns the number completed.
pub fn complete(pool: &TicketPool, ops: u64) -> PoolResult<u64> {
    let mut done = 0;
    let mut held = Vec::new();
    while done < ops {
        while (held.len() as u64) < ops - done {
            match pool.try_acquire()? {
                Some(ticket) => held.push(ticket),
                None => break,
            }
        }
        if held.is_empty() {
            break;
        }
        done += held.len() as u64;
        held.clear();
    }
    Ok(done)
}

pub fn run_simulation(
    config: ProbingConfig,
    opts: &SimulationOptions,
) -> anyhow::Result<SimulationReport> {
    if !(0.0..1.0).contains(&opts.noise) {
        anyhow::bail!("noise must be in [0, 1), got {}", opts.noise);
    }

    let read = TicketPool::new("read", opts.start_concurrency)?;
    let write = TicketPool::new("write", opts.start_concurrency)?;

    let start = Instant::now();
    let interval = config.interval;
    let probing = ThroughputProbing::new(read.clone(), write.clone(), config, start)?;
    let stats = probing.stats();
    let initial_concurrency = probing.concurrency();
    let mut driver = MonitorDriver::new(ManualContextProvider::new(start), probing, interval);
    let mut noise = Noise::new(opts.seed, opts.noise);

    info!(
        shape = ?opts.objective.shape,
        cycles = opts.cycles,
        start = initial_concurrency,
        noise = opts.noise,
        "simulation starting"
    );

    let mut trace = Vec::with_capacity(opts.cycles as usize);
    let mut skipped = 0;
    for cycle in 1..=opts.cycles {
        for pool in [&read, &write] {
            let rate = opts.objective.ops_per_sec(pool.capacity()) * noise.factor();
            let ops = (rate * interval.as_secs_f64()).round().max(0.0) as u64;
            complete(pool, ops)?;
        }

        if let Some(every) = opts.fail_every
            && cycle % every.get() == 0
        {
            driver.provider().fail_next(1);
        }
        driver.provider().advance(interval);

        match driver.tick() {
            CycleOutcome::Completed(report) => {
                let point = TracePoint {
                    cycle,
                    concurrency: report.concurrency,
                    throughput: report.sample.ops_per_sec,
                    phase: report.state.name(),
                };
                debug!(
                    cycle,
                    concurrency = point.concurrency,
                    throughput = point.throughput,
                    phase = point.phase,
                    "simulated cycle"
                );
                trace.push(point);
            }
            CycleOutcome::Skipped(_) => skipped += 1,
        }
    }

    let final_concurrency = driver.monitor().concurrency();
    info!(final_concurrency, skipped, "simulation finished");

    let best = trace
        .iter()
        .copied()
        .max_by(|a, b| a.throughput.total_cmp(&b.throughput));

    Ok(SimulationReport {
        shape: opts.objective.shape,
        peak: (opts.objective.shape == Shape::Peak).then_some(opts.objective.peak),
        cycles: opts.cycles,
        skipped,
        initial_concurrency,
        final_concurrency,
        best,
        trace,
        stats: stats.snapshot(),
    })
}

/// Human-readable summary.
pub fn format_report(report: &SimulationReport) -> String {
    let mut out = String::new();
    let shape = match report.peak {
        Some(peak) => format!("{:?} (peak at {peak})", report.shape),
        None => format!("{:?}", report.shape),
    };
    let _ = writeln!(out, "workload      {shape}");
    let _ = writeln!(
        out,
        "cycles        {} ({} skipped)",
        report.cycles, report.skipped
    );
    let _ = writeln!(
        out,
        "concurrency   {} -> {}",
        report.initial_concurrency, report.final_concurrency
    );
    if let Some(best) = report.best {
        let _ = writeln!(
            out,
            "best          {:.1} ops/s at {} (cycle {})",
            best.throughput, best.concurrency, best.cycle
        );
    }
    let s = &report.stats;
    let _ = writeln!(
        out,
        "probes        {} up, {} down; {} accepted up, {} accepted down, {} reverted",
        s.probes_up, s.probes_down, s.accepted_up, s.accepted_down, s.reverted
    );
    let _ = writeln!(
        out,
        "errors        {} resize failures, {} counter regressions",
        s.resize_failures, s.counter_regressions
    );
    out
}
