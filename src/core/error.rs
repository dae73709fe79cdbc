//! Error types for fedcoord.

use thiserror::Error;

/// Result type alias for fedcoord operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating federated training.
#[derive(Error, Debug)]
pub enum Error {
    // Model shape errors
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    // Participant errors
    #[error("Local training failed: {0}")]
    LocalTraining(String),

    #[error("Participant {participant_id} timed out after {timeout_ms}ms")]
    Timeout {
        participant_id: String,
        timeout_ms: u64,
    },

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("No participants registered")]
    NoParticipantsRegistered,

    // Round errors
    #[error("Invalid aggregation input: {0}")]
    InvalidAggregationInput(String),

    #[error("Quorum not met in round {round}: {received} valid updates, {required} required")]
    QuorumNotMet {
        round: u64,
        required: usize,
        received: usize,
    },

    #[error("History ordering violated: expected round {expected}, got {got}")]
    HistoryOrderingViolation { expected: u64, got: u64 },

    #[error("Cannot {operation} while coordinator is {state}")]
    InvalidState { operation: String, state: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Persistence errors
    #[error("No checkpoint found")]
    CheckpointNotFound,

    #[error("Checkpoint corrupted: {0}")]
    CheckpointCorrupted(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failed operation may be retried with the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QuorumNotMet { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
