//! Participants: data holders that train locally.
//!
//! A participant receives a copy of the global weights, runs its injected
//! [`Trainable`] capability on data it never shares, and reports the
//! resulting weights and metrics. It never sees the round index or any other
//! participant's update.

use crate::core::{Error, ParticipantId, Result};
use crate::federated::weights::WeightVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Opaque reference to data held by a participant.
///
/// The coordinator stores and forwards this value but never interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataHandle(String);

impl DataHandle {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-round training hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Mini-batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f32,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 0.001,
        }
    }
}

/// Quality metrics reported by local training or evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Local accuracy in [0, 1]
    pub accuracy: f32,
    /// Local loss
    pub loss: f32,
    /// Accuracy on a local validation split, if the trainer keeps one
    pub validation_accuracy: Option<f32>,
}

/// Opaque local training capability supplied by the ML layer.
#[async_trait]
pub trait Trainable: Send + Sync {
    /// Train starting from `weights` for `epochs` epochs.
    ///
    /// `weights` is an owned copy; implementations are free to consume it.
    async fn train(
        &self,
        weights: WeightVector,
        epochs: u32,
        hyperparameters: &Hyperparameters,
    ) -> Result<(WeightVector, TrainingMetrics)>;

    /// Evaluate `weights` against the data referenced by `test_data`.
    async fn evaluate(&self, weights: &WeightVector, test_data: &DataHandle)
        -> Result<TrainingMetrics>;
}

/// Size tier of a data holder, as declared in its registry entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeTier {
    Small,
    Medium,
    Large,
}

/// Registry entry describing one participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Stable identity
    pub id: ParticipantId,
    /// Display name
    pub name: String,
    /// Declared size tier
    #[serde(default)]
    pub size: Option<SizeTier>,
    /// Declared number of local training samples
    pub samples: u64,
    /// Reference to locally held training data
    pub data: DataHandle,
}

impl ParticipantRecord {
    /// Create a new record.
    pub fn new(id: impl Into<ParticipantId>, name: &str, samples: u64, data: DataHandle) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            size: None,
            samples,
            data,
        }
    }

    /// Set the size tier.
    pub fn with_size(mut self, size: SizeTier) -> Self {
        self.size = Some(size);
        self
    }
}

/// Result of one participant's local training in one round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    /// Contributing participant
    pub participant_id: ParticipantId,
    /// Locally trained weights
    pub weights: WeightVector,
    /// Samples the update was trained on
    pub samples: u64,
    /// Local quality metrics
    pub metrics: TrainingMetrics,
}

/// A registered data holder bound to its training capability.
#[derive(Clone)]
pub struct Participant {
    record: ParticipantRecord,
    trainer: Arc<dyn Trainable>,
}

impl Participant {
    /// Create a participant from its record and capability.
    pub fn new(record: ParticipantRecord, trainer: Arc<dyn Trainable>) -> Self {
        Self { record, trainer }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.record.id
    }

    pub fn record(&self) -> &ParticipantRecord {
        &self.record
    }

    /// Declared number of local samples.
    pub fn sample_count(&self) -> u64 {
        self.record.samples
    }

    /// Replace the data reference and sample count after re-registration.
    pub fn reregister(&mut self, samples: u64, data: DataHandle) {
        self.record.samples = samples;
        self.record.data = data;
    }

    /// Train locally from a copy of `global`.
    ///
    /// Any capability error surfaces as [`Error::LocalTraining`].
    pub async fn train(
        &self,
        global: &WeightVector,
        epochs: u32,
        hyperparameters: &Hyperparameters,
    ) -> Result<ParticipantUpdate> {
        let (weights, metrics) = self
            .trainer
            .train(global.clone(), epochs, hyperparameters)
            .await
            .map_err(|e| match e {
                Error::LocalTraining(_) => e,
                other => Error::LocalTraining(other.to_string()),
            })?;

        Ok(ParticipantUpdate {
            participant_id: self.record.id.clone(),
            weights,
            samples: self.record.samples,
            metrics,
        })
    }

    /// Evaluate `weights` on held-out data through the capability.
    pub async fn evaluate(
        &self,
        weights: &WeightVector,
        test_data: &DataHandle,
    ) -> Result<TrainingMetrics> {
        self.trainer.evaluate(weights, test_data).await
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
