//! Probing statistics and Prometheus text exposition.
//!
//! Counters are plain atomics so an exporter on another task can read
//! them while the controller runs. Floats are stored as their bit
//! patterns.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::fsm::{Direction, ProbeAction};

/// Live counters for one probing controller.
#[derive(Debug, Default)]
pub struct ProbingStats {
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    probes_up: AtomicU64,
    probes_down: AtomicU64,
    accepted_up: AtomicU64,
    accepted_down: AtomicU64,
    reverted: AtomicU64,
    resize_failures: AtomicU64,
    counter_regressions: AtomicU64,
    concurrency: AtomicU64,
    stable_throughput: AtomicU64,
    last_throughput: AtomicU64,
}

/// Point-in-time copy of `ProbingStats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub probes_up: u64,
    pub probes_down: u64,
    pub accepted_up: u64,
    pub accepted_down: u64,
    pub reverted: u64,
    pub resize_failures: u64,
    pub counter_regressions: u64,
    pub concurrency: u64,
    pub stable_throughput: f64,
    pub last_throughput: f64,
}

impl ProbingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_action(&self, action: &ProbeAction) {
        let counter = match action {
            ProbeAction::Hold => return,
            ProbeAction::Probe {
                direction: Direction::Up,
                ..
            } => &self.probes_up,
            ProbeAction::Probe {
                direction: Direction::Down,
                ..
            } => &self.probes_down,
            ProbeAction::Accept {
                direction: Direction::Up,
                ..
            } => &self.accepted_up,
            ProbeAction::Accept {
                direction: Direction::Down,
                ..
            } => &self.accepted_down,
            ProbeAction::Revert { .. } => &self.reverted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle(&self, throughput: f64, stable_throughput: f64) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.last_throughput
            .store(throughput.to_bits(), Ordering::Relaxed);
        self.stable_throughput
            .store(stable_throughput.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resize_failure(&self) {
        self.resize_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_regression(&self) {
        self.counter_regressions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_concurrency(&self, level: u32) {
        self.concurrency.store(level as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            probes_up: self.probes_up.load(Ordering::Relaxed),
            probes_down: self.probes_down.load(Ordering::Relaxed),
            accepted_up: self.accepted_up.load(Ordering::Relaxed),
            accepted_down: self.accepted_down.load(Ordering::Relaxed),
            reverted: self.reverted.load(Ordering::Relaxed),
            resize_failures: self.resize_failures.load(Ordering::Relaxed),
            counter_regressions: self.counter_regressions.load(Ordering::Relaxed),
            concurrency: self.concurrency.load(Ordering::Relaxed),
            stable_throughput: f64::from_bits(self.stable_throughput.load(Ordering::Relaxed)),
            last_throughput: f64::from_bits(self.last_throughput.load(Ordering::Relaxed)),
        }
    }
}

/// Render a stats snapshot in the Prometheus text exposition format.
pub fn render_prometheus(s: &StatsSnapshot) -> String {
    let mut out = String::new();

    let counters: [(&str, &str, String); 3] = [
        (
            "ticketflow_cycles_total",
            "Controller cycles by outcome.",
            format!(
                "ticketflow_cycles_total{{outcome=\"completed\"}} {}\n\
                 ticketflow_cycles_total{{outcome=\"skipped\"}} {}\n",
                s.cycles_completed, s.cycles_skipped
            ),
        ),
        (
            "ticketflow_probes_total",
            "Probes by direction and outcome.",
            format!(
                "ticketflow_probes_total{{direction=\"up\",outcome=\"started\"}} {}\n\
                 ticketflow_probes_total{{direction=\"down\",outcome=\"started\"}} {}\n\
                 ticketflow_probes_total{{direction=\"up\",outcome=\"accepted\"}} {}\n\
                 ticketflow_probes_total{{direction=\"down\",outcome=\"accepted\"}} {}\n\
                 ticketflow_probes_total{{outcome=\"reverted\"}} {}\n",
                s.probes_up, s.probes_down, s.accepted_up, s.accepted_down, s.reverted
            ),
        ),
        (
            "ticketflow_errors_total",
            "Non-fatal controller anomalies.",
            format!(
                "ticketflow_errors_total{{kind=\"resize_rejected\"}} {}\n\
                 ticketflow_errors_total{{kind=\"counter_regression\"}} {}\n",
                s.resize_failures, s.counter_regressions
            ),
        ),
    ];

    for (name, help, body) in &counters {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} counter\n"));
        out.push_str(body);
    }

    out.push_str("# HELP ticketflow_concurrency Tickets per admission pool.\n");
    out.push_str("# TYPE ticketflow_concurrency gauge\n");
    out.push_str(&format!("ticketflow_concurrency {}\n", s.concurrency));

    out.push_str("# HELP ticketflow_throughput_ops Completed operations per second.\n");
    out.push_str("# TYPE ticketflow_throughput_ops gauge\n");
    out.push_str(&format!(
        "ticketflow_throughput_ops{{kind=\"last\"}} {:.2}\n",
        s.last_throughput
    ));
    out.push_str(&format!(
        "ticketflow_throughput_ops{{kind=\"stable\"}} {:.2}\n",
        s.stable_throughput
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_increment_matching_counters() {
        let stats = ProbingStats::new();
        stats.record_action(&ProbeAction::Hold);
        stats.record_action(&ProbeAction::Probe {
            direction: Direction::Up,
            from: 20,
            to: 22,
        });
        stats.record_action(&ProbeAction::Accept {
            direction: Direction::Up,
            level: 22,
        });
        stats.record_action(&ProbeAction::Probe {
            direction: Direction::Down,
            from: 22,
            to: 20,
        });
        stats.record_action(&ProbeAction::Revert {
            direction: Direction::Down,
            from: 20,
            to: 22,
        });

        let snap = stats.snapshot();
        assert_eq!(snap.probes_up, 1);
        assert_eq!(snap.probes_down, 1);
        assert_eq!(snap.accepted_up, 1);
        assert_eq!(snap.accepted_down, 0);
        assert_eq!(snap.reverted, 1);
    }

    #[test]
    fn snapshot_carries_gauges() {
        let stats = ProbingStats::new();
        stats.record_concurrency(32);
        stats.record_cycle(812.5, 790.0);
        stats.record_skipped();

        let snap = stats.snapshot();
        assert_eq!(snap.concurrency, 32);
        assert_eq!(snap.last_throughput, 812.5);
        assert_eq!(snap.stable_throughput, 790.0);
        assert_eq!(snap.cycles_completed, 1);
        assert_eq!(snap.cycles_skipped, 1);
    }

    #[test]
    fn render_prometheus_format() {
        let snap = StatsSnapshot {
            cycles_completed: 10,
            cycles_skipped: 2,
            concurrency: 40,
            last_throughput: 1234.5,
            ..Default::default()
        };
        let output = render_prometheus(&snap);

        assert!(output.contains("# TYPE ticketflow_cycles_total counter"));
        assert!(output.contains("ticketflow_cycles_total{outcome=\"completed\"} 10"));
        assert!(output.contains("ticketflow_cycles_total{outcome=\"skipped\"} 2"));
        assert!(output.contains("# TYPE ticketflow_concurrency gauge"));
        assert!(output.contains("ticketflow_concurrency 40"));
        assert!(output.contains("ticketflow_throughput_ops{kind=\"last\"} 1234.50"));
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let snap = StatsSnapshot {
            concurrency: 7,
            ..Default::default()
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["concurrency"], 7);
    }
}
