//! Probe run statistics

use dispatcher::MetricsSnapshot;
use observability::{DispatchStatsAggregator, RunningStats};

use super::ProbeReport;

/// Statistics over all probes of one run
#[derive(Debug, Clone, Default)]
pub struct ProbeStats {
    /// Outcomes, attempts and latency per probe
    pub dispatches: DispatchStatsAggregator,

    /// TCP connect time of the winning attempts
    pub connect_ms: RunningStats,
}

impl ProbeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &ProbeReport) {
        let winner = report.outcome.as_ref().ok();
        self.dispatches.update(
            report.status,
            report.attempts,
            report.latency_ms,
            winner.map(|hit| hit.index),
        );
        if let Some(hit) = winner {
            self.connect_ms.push(hit.connect_ms);
        }
    }

    /// Number of probes that reached an endpoint
    pub fn completed(&self) -> u64 {
        self.dispatches.summary().completed
    }

    /// Print detailed summary
    pub fn print_summary(&self, endpoints: &[String], next_index: usize, metrics: MetricsSnapshot) {
        println!("\n{}", self.dispatches.summary());

        if self.connect_ms.count() > 0 {
            println!(
                "Connect (ms): mean={:.1}, min={:.1}, max={:.1}",
                self.connect_ms.mean(),
                self.connect_ms.min(),
                self.connect_ms.max()
            );
        }

        let next = endpoints.get(next_index).map(String::as_str).unwrap_or("?");
        println!("Next start: #{} ({})", next_index, next);
        println!(
            "Registry: {} dispatched, {} attempts, {} late deliveries",
            metrics.dispatched, metrics.attempts, metrics.late_deliveries
        );
    }
}
