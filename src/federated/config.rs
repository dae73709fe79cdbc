//! Training run configuration.

use crate::core::{Error, Result};
use crate::federated::aggregator::AggregationMethod;
use crate::federated::history::RoundHistory;
use crate::federated::participant::Hyperparameters;
use crate::federated::selection::SelectionStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Stop training once accuracy stops improving.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlateauCriterion {
    /// Number of consecutive rounds that must fall below the threshold
    pub patience: u32,
    /// Minimum round-over-round improvement, in percent
    pub min_improvement_pct: f64,
}

impl PlateauCriterion {
    /// Whether the last `patience` rounds each improved by less than the threshold.
    pub fn reached(&self, history: &RoundHistory) -> bool {
        let last = history.last_round();
        if self.patience == 0 || last <= u64::from(self.patience) {
            return false;
        }
        (last - u64::from(self.patience) + 1..=last)
            .all(|round| history.improvement(round) < self.min_improvement_pct)
    }
}

/// Federated training configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederatedConfig {
    /// Round budget
    pub rounds: u32,
    /// Local epochs per round
    pub epochs_per_round: u32,
    /// Local mini-batch size
    pub batch_size: usize,
    /// Local learning rate
    pub learning_rate: f32,
    /// Minimum valid updates per round; `None` means every selected participant
    pub quorum: Option<usize>,
    /// How updates are combined
    pub aggregation_strategy: AggregationMethod,
    /// Per-participant training timeout
    pub participant_timeout_ms: u64,
    /// Which participants train each round
    pub selection: SelectionStrategy,
    /// Retries of a round that missed quorum before giving up
    pub max_round_retries: u32,
    /// Optional early stopping
    pub plateau: Option<PlateauCriterion>,
    /// Persist a checkpoint every N committed rounds
    pub checkpoint_every: u32,
}

impl Default for FederatedConfig {
    fn default() -> Self {
        Self {
            rounds: 6,
            epochs_per_round: 5,
            batch_size: 32,
            learning_rate: 0.001,
            quorum: None,
            aggregation_strategy: AggregationMethod::WeightedAverage,
            participant_timeout_ms: 300_000, // 5 minutes
            selection: SelectionStrategy::All,
            max_round_retries: 0,
            plateau: None,
            checkpoint_every: 1,
        }
    }
}

impl FederatedConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the round budget.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    /// Set the quorum.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = Some(quorum);
        self
    }

    /// Set the participant timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.participant_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn participant_timeout(&self) -> Duration {
        Duration::from_millis(self.participant_timeout_ms)
    }

    /// Hyperparameters sent to every participant.
    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
        }
    }

    /// Quorum for a round with `selected` participants.
    pub fn required_updates(&self, selected: usize) -> usize {
        self.quorum.unwrap_or(selected)
    }

    /// Reject settings that can never produce a valid run.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(Error::InvalidConfig("rounds must be at least 1".into()));
        }
        if self.epochs_per_round == 0 {
            return Err(Error::InvalidConfig("epochs_per_round must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.quorum == Some(0) {
            return Err(Error::InvalidConfig("quorum must be at least 1".into()));
        }
        if self.participant_timeout_ms == 0 {
            return Err(Error::InvalidConfig("participant_timeout_ms must be positive".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(Error::InvalidConfig("checkpoint_every must be at least 1".into()));
        }
        if let SelectionStrategy::RandomSubset { count, .. } = self.selection {
            if count == 0 {
                return Err(Error::InvalidConfig("random subset must select at least 1".into()));
            }
            if let Some(quorum) = self.quorum {
                if count < quorum {
                    return Err(Error::InvalidConfig(format!(
                        "random subset of {} can never reach quorum {}",
                        count, quorum
                    )));
                }
            }
        }
        Ok(())
    }
}
