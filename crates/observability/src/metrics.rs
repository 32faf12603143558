//! Dispatch metrics
//!
//! Thin wrappers over the `metrics` facade plus an in-memory aggregator
//! for run summaries.

use std::collections::BTreeMap;

use contracts::DispatchStatus;
use metrics::{counter, gauge, histogram};

/// Record one issued attempt against the resource at `index`
pub fn record_attempt_issued(index: usize) {
    counter!("failover_attempts_total", "index" => index.to_string()).increment(1);
}

/// Record an attempt cancelled by rotation overflow or dispatch end
pub fn record_attempt_cancelled() {
    counter!("failover_attempts_cancelled_total").increment(1);
}

/// Record a terminal dispatch outcome
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_dispatch_outcome;
///
/// record_dispatch_outcome(DispatchStatus::Completed, snapshot.attempt);
/// ```
pub fn record_dispatch_outcome(status: DispatchStatus, attempts: u64) {
    counter!(
        "failover_dispatches_total",
        "status" => status.as_str()
    )
    .increment(1);
    histogram!("failover_dispatch_attempts").record(attempts as f64);
}

/// Record time from dispatch creation to its terminal state
pub fn record_dispatch_latency_ms(latency_ms: f64) {
    histogram!("failover_dispatch_latency_ms").record(latency_ms);
}

/// Record data accepted after the dispatch had already timed out
pub fn record_late_delivery() {
    counter!("failover_late_deliveries_total").increment(1);
}

/// Record the start index remembered for future dispatches
pub fn record_start_index(index: usize) {
    gauge!("failover_start_index").set(index as f64);
}

/// Dispatch statistics aggregator
///
/// Aggregates outcomes in memory for printing a summary.
#[derive(Debug, Clone, Default)]
pub struct DispatchStatsAggregator {
    /// Total dispatches
    pub total: u64,

    /// Dispatches per terminal status
    pub by_status: BTreeMap<&'static str, u64>,

    /// Attempts per dispatch
    pub attempt_stats: RunningStats,

    /// Latency per dispatch (milliseconds)
    pub latency_stats: RunningStats,

    /// Successful dispatches per winning resource index
    pub winners: BTreeMap<usize, u64>,
}

impl DispatchStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one finished dispatch
    pub fn update(
        &mut self,
        status: DispatchStatus,
        attempts: u64,
        latency_ms: f64,
        winner: Option<usize>,
    ) {
        self.total += 1;
        *self.by_status.entry(status.as_str()).or_insert(0) += 1;
        self.attempt_stats.push(attempts as f64);
        self.latency_stats.push(latency_ms);

        if let Some(index) = winner {
            *self.winners.entry(index).or_insert(0) += 1;
        }
    }

    /// Build the summary report
    pub fn summary(&self) -> DispatchSummary {
        let completed = self.by_status.get("completed").copied().unwrap_or(0);
        DispatchSummary {
            total: self.total,
            completed,
            success_rate: if self.total > 0 {
                completed as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            by_status: self.by_status.clone(),
            attempts: StatsSummary::from(&self.attempt_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
            winners: self.winners.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Summary report
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub total: u64,
    pub completed: u64,
    pub success_rate: f64,
    pub by_status: BTreeMap<&'static str, u64>,
    pub attempts: StatsSummary,
    pub latency_ms: StatsSummary,
    pub winners: BTreeMap<usize, u64>,
}

impl std::fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Dispatch Summary ===")?;
        writeln!(
            f,
            "Dispatches: {} ({} completed, {:.2}%)",
            self.total, self.completed, self.success_rate
        )?;
        for (status, count) in &self.by_status {
            writeln!(f, "  {}: {}", status, count)?;
        }
        writeln!(f, "Attempts: {}", self.attempts)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if !self.winners.is_empty() {
            writeln!(f, "Winning resources:")?;
            for (index, count) in &self.winners {
                writeln!(f, "  #{}: {}", index, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [10.0, 20.0, 30.0, 40.0, 50.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 30.0).abs() < 1e-10);
        assert!((stats.min() - 10.0).abs() < 1e-10);
        assert!((stats.max() - 50.0).abs() < 1e-10);
        assert!((stats.variance() - 250.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = DispatchStatsAggregator::new();

        aggregator.update(DispatchStatus::Completed, 2, 100.0, Some(1));
        aggregator.update(DispatchStatus::Completed, 1, 5.0, Some(1));
        aggregator.update(DispatchStatus::Failed, 4, 3000.0, None);

        assert_eq!(aggregator.total, 3);
        assert_eq!(aggregator.by_status.get("completed"), Some(&2));
        assert_eq!(aggregator.by_status.get("failed"), Some(&1));
        assert_eq!(aggregator.winners.get(&1), Some(&2));

        let summary = aggregator.summary();
        assert_eq!(summary.completed, 2);
        assert!((summary.success_rate - 66.666).abs() < 0.01);
        assert_eq!(summary.attempts.count, 3);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = DispatchStatsAggregator::new();
        aggregator.update(DispatchStatus::Completed, 2, 100.0, Some(0));

        let output = aggregator.summary().to_string();
        assert!(output.contains("Dispatches: 1 (1 completed, 100.00%)"));
        assert!(output.contains("#0: 1"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = DispatchStatsAggregator::new().summary();
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.latency_ms.to_string(), "N/A");
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls must be no-ops
        record_attempt_issued(0);
        record_attempt_cancelled();
        record_dispatch_outcome(DispatchStatus::Failed, 3);
        record_dispatch_latency_ms(12.5);
        record_late_delivery();
        record_start_index(2);
    }
}
