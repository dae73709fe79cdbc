//! Coordinator metrics.
//!
//! Lock-free counters and gauges, bundled per coordinator.

use crate::federated::history::FailureKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric (monotonically increasing).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by amount.
    pub fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64, // Store as bits for f64
}

impl Gauge {
    /// Create a new gauge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge value.
    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

/// Point-in-time copy of [`CoordinatorMetrics`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub rounds_committed: u64,
    pub rounds_failed: u64,
    pub participant_timeouts: u64,
    pub participant_errors: u64,
    pub shape_mismatches: u64,
    pub non_finite_updates: u64,
    pub cancelled_dispatches: u64,
    pub checkpoint_failures: u64,
    pub last_round_accuracy: f64,
    pub last_round_duration_ms: f64,
}

/// Metrics maintained by a coordinator.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    pub rounds_committed: Counter,
    pub rounds_failed: Counter,
    pub participant_timeouts: Counter,
    pub participant_errors: Counter,
    pub shape_mismatches: Counter,
    pub non_finite_updates: Counter,
    pub cancelled_dispatches: Counter,
    pub checkpoint_failures: Counter,
    pub last_round_accuracy: Gauge,
    pub last_round_duration_ms: Gauge,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a participant failure under its kind.
    pub fn record_failure(&self, kind: FailureKind) {
        match kind {
            FailureKind::Timeout => self.participant_timeouts.inc(),
            FailureKind::LocalTraining => self.participant_errors.inc(),
            FailureKind::ShapeMismatch => self.shape_mismatches.inc(),
            FailureKind::NonFiniteWeights => self.non_finite_updates.inc(),
            FailureKind::Cancelled => self.cancelled_dispatches.inc(),
        }
    }

    /// Copy current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_committed: self.rounds_committed.get(),
            rounds_failed: self.rounds_failed.get(),
            participant_timeouts: self.participant_timeouts.get(),
            participant_errors: self.participant_errors.get(),
            shape_mismatches: self.shape_mismatches.get(),
            non_finite_updates: self.non_finite_updates.get(),
            cancelled_dispatches: self.cancelled_dispatches.get(),
            checkpoint_failures: self.checkpoint_failures.get(),
            last_round_accuracy: self.last_round_accuracy.get(),
            last_round_duration_ms: self.last_round_duration_ms.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        assert_eq!(gauge.get(), 0.0);
        gauge.set(0.8125);
        assert_eq!(gauge.get(), 0.8125);
    }

    #[test]
    fn test_record_failure_by_kind() {
        let metrics = CoordinatorMetrics::new();
        metrics.record_failure(FailureKind::Timeout);
        metrics.record_failure(FailureKind::Timeout);
        metrics.record_failure(FailureKind::ShapeMismatch);
        metrics.record_failure(FailureKind::Cancelled);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.participant_timeouts, 2);
        assert_eq!(snapshot.shape_mismatches, 1);
        assert_eq!(snapshot.cancelled_dispatches, 1);
        assert_eq!(snapshot.participant_errors, 0);
    }
}
