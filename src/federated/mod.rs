//! Federated Learning Module
//!
//! Coordinates training across data holders that never share raw data:
//! - Weight vectors and deterministic aggregation (FedAvg)
//! - Participants behind an injected training capability
//! - Round coordination with quorum, timeouts and atomic commit
//! - Append-only round history, checkpoints and restore

pub mod aggregator;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod history;
pub mod learner;
pub mod participant;
pub mod roster;
pub mod selection;
pub mod weights;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{AggregationMethod, Aggregator};
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{FederatedConfig, PlateauCriterion};
pub use coordinator::{
    Coordinator, CoordinatorState, CoordinatorStatus, GlobalModelState, TrainingSummary,
};
pub use history::{Contribution, FailureKind, ParticipantFailure, RoundHistory, RoundRecord};
pub use learner::{LocalSample, LogisticTrainer};
pub use participant::{
    DataHandle, Hyperparameters, Participant, ParticipantRecord, ParticipantUpdate, SizeTier,
    Trainable, TrainingMetrics,
};
pub use roster::{JsonRoster, ParticipantRoster, StaticRoster};
pub use selection::{AllParticipants, RandomSubset, SelectionPolicy, SelectionStrategy};
pub use weights::{Tensor, WeightVector};
