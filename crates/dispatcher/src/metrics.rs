//! Registry metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::DispatchStatus;

/// Counters shared by every dispatch created from one registry
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    /// Dispatches created
    dispatched: AtomicU64,
    /// Attempts issued across all dispatches
    attempts: AtomicU64,
    /// Dispatches that delivered data
    completed: AtomicU64,
    /// Dispatches that failed (limit, zero delay, fail-fast)
    failed: AtomicU64,
    /// Dispatches cancelled by the caller
    aborted: AtomicU64,
    /// Failed dispatches later completed by late data
    late_deliveries: AtomicU64,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn inc_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    pub fn late_deliveries(&self) -> u64 {
        self.late_deliveries.load(Ordering::Relaxed)
    }

    /// Count a dispatch reaching a terminal status
    pub fn record_finished(&self, status: DispatchStatus) {
        let counter = match status {
            DispatchStatus::Completed => &self.completed,
            DispatchStatus::Failed => &self.failed,
            DispatchStatus::Aborted => &self.aborted,
            DispatchStatus::Pending => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed dispatch turned completed by late data
    pub fn record_late_delivery(&self) {
        self.late_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched(),
            attempts: self.attempts(),
            completed: self.completed(),
            failed: self.failed(),
            aborted: self.aborted(),
            late_deliveries: self.late_deliveries(),
        }
    }
}

/// Snapshot of registry metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub attempts: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub late_deliveries: u64,
}
