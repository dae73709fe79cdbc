//! Append-only log of committed rounds.
//!
//! The ordered sequence of [`RoundRecord`]s is the audit trail of a training
//! run. Records are never rewritten, and round numbers are gapless starting
//! at 1.

use crate::core::{Error, ParticipantId, Result, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Why a participant contributed nothing to a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Did not answer within the participant timeout
    Timeout,
    /// The training capability returned an error or panicked
    LocalTraining,
    /// Returned weights whose structure differs from the global snapshot
    ShapeMismatch,
    /// Returned weights containing NaN or infinite values
    NonFiniteWeights,
    /// Dispatch was cancelled once quorum became unreachable
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::LocalTraining => write!(f, "local_training"),
            FailureKind::ShapeMismatch => write!(f, "shape_mismatch"),
            FailureKind::NonFiniteWeights => write!(f, "non_finite_weights"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A per-participant failure within one round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantFailure {
    pub participant_id: ParticipantId,
    pub kind: FailureKind,
    pub message: String,
}

/// Metrics of one contributor in a committed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub participant_id: ParticipantId,
    pub accuracy: f32,
    pub loss: f32,
    pub samples: u64,
}

/// Outcome of one committed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round index, starting at 1
    pub round: u64,
    /// Weighted mean of contributors' local accuracies (proxy metric)
    pub accuracy: f32,
    /// Accuracy of the aggregated weights on held-out data, when evaluated
    #[serde(default)]
    pub evaluated_accuracy: Option<f32>,
    /// Contributors, ascending by id
    pub participant_ids: Vec<ParticipantId>,
    /// Samples behind the aggregated update
    pub total_samples: u64,
    /// Commit time
    pub timestamp: Timestamp,
    /// Per-contributor metrics
    #[serde(default)]
    pub contributions: Vec<Contribution>,
    /// Selected participants that contributed nothing
    #[serde(default)]
    pub failures: Vec<ParticipantFailure>,
}

/// Append-only, concurrently readable round log.
#[derive(Debug, Default)]
pub struct RoundHistory {
    records: RwLock<Vec<RoundRecord>>,
}

impl RoundHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from persisted records, checking ordering.
    pub fn from_records(records: Vec<RoundRecord>) -> Result<Self> {
        let history = Self::new();
        for record in records {
            history.append(record)?;
        }
        Ok(history)
    }

    /// Append a record; its round must be exactly one past the last.
    pub fn append(&self, record: RoundRecord) -> Result<()> {
        let mut records = self.records.write();
        let expected = records.last().map_or(1, |r| r.round + 1);
        if record.round != expected {
            return Err(Error::HistoryOrderingViolation {
                expected,
                got: record.round,
            });
        }
        records.push(record);
        Ok(())
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<RoundRecord> {
        self.records.read().last().cloned()
    }

    /// Round index of the most recent record, 0 when empty.
    pub fn last_round(&self) -> u64 {
        self.records.read().last().map_or(0, |r| r.round)
    }

    /// Record for `round`.
    pub fn get(&self, round: u64) -> Option<RoundRecord> {
        if round == 0 {
            return None;
        }
        self.records.read().get(round as usize - 1).cloned()
    }

    /// Percentage change of `round`'s accuracy relative to the round before.
    ///
    /// Returns 0 when there is no preceding round or its accuracy was zero.
    pub fn improvement(&self, round: u64) -> f64 {
        let records = self.records.read();
        if round < 2 || round as usize > records.len() {
            return 0.0;
        }
        let current = f64::from(records[round as usize - 1].accuracy);
        let previous = f64::from(records[round as usize - 2].accuracy);
        if previous == 0.0 {
            return 0.0;
        }
        (current - previous) / previous * 100.0
    }

    /// Accuracy of every round, in order.
    pub fn accuracy_history(&self) -> Vec<f32> {
        self.records.read().iter().map(|r| r.accuracy).collect()
    }

    /// Copy of all records, in order.
    pub fn records(&self) -> Vec<RoundRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.records.read())?)
    }

    /// Import from JSON, re-checking ordering.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<RoundRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::now;

    fn record(round: u64, accuracy: f32) -> RoundRecord {
        RoundRecord {
            round,
            accuracy,
            evaluated_accuracy: None,
            participant_ids: vec!["H001".into(), "H002".into()],
            total_samples: 3800,
            timestamp: now(),
            contributions: Vec::new(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_append_in_order() {
        let history = RoundHistory::new();
        assert!(history.latest().is_none());
        assert_eq!(history.last_round(), 0);

        history.append(record(1, 0.5)).unwrap();
        history.append(record(2, 0.6)).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().round, 2);
        assert_eq!(history.get(1).unwrap().accuracy, 0.5);
        assert!(history.get(0).is_none());
        assert!(history.get(3).is_none());
    }

    #[test]
    fn test_first_record_must_be_round_one() {
        let history = RoundHistory::new();
        let err = history.append(record(2, 0.5)).unwrap_err();
        assert!(matches!(err, Error::HistoryOrderingViolation { expected: 1, got: 2 }));
    }

    #[test]
    fn test_append_rejects_gap() {
        let history = RoundHistory::new();
        history.append(record(1, 0.5)).unwrap();

        let err = history.append(record(3, 0.7)).unwrap_err();
        assert!(matches!(err, Error::HistoryOrderingViolation { expected: 2, got: 3 }));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_append_rejects_repeat() {
        let history = RoundHistory::new();
        history.append(record(1, 0.5)).unwrap();
        assert!(history.append(record(1, 0.55)).is_err());
    }

    #[test]
    fn test_improvement() {
        let history = RoundHistory::new();
        history.append(record(1, 0.5)).unwrap();
        history.append(record(2, 0.6)).unwrap();
        history.append(record(3, 0.54)).unwrap();

        assert_eq!(history.improvement(1), 0.0);
        assert!((history.improvement(2) - 20.0).abs() < 1e-3);
        assert!((history.improvement(3) + 10.0).abs() < 1e-3);
        assert_eq!(history.improvement(9), 0.0);
    }

    #[test]
    fn test_improvement_after_zero_accuracy() {
        let history = RoundHistory::new();
        history.append(record(1, 0.0)).unwrap();
        history.append(record(2, 0.4)).unwrap();
        assert_eq!(history.improvement(2), 0.0);
    }

    #[test]
    fn test_json_roundtrip_checks_order() {
        let history = RoundHistory::new();
        history.append(record(1, 0.5)).unwrap();
        history.append(record(2, 0.6)).unwrap();

        let restored = RoundHistory::from_json(&history.to_json().unwrap()).unwrap();
        assert_eq!(restored.records(), history.records());

        let mut tampered = history.records();
        tampered.remove(0);
        let json = serde_json::to_string(&tampered).unwrap();
        assert!(matches!(
            RoundHistory::from_json(&json),
            Err(Error::HistoryOrderingViolation { .. })
        ));
    }

    #[test]
    fn test_accuracy_history() {
        let history = RoundHistory::new();
        history.append(record(1, 0.41)).unwrap();
        history.append(record(2, 0.47)).unwrap();
        assert_eq!(history.accuracy_history(), vec![0.41, 0.47]);
    }
}
