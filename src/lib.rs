//! # fedcoord - Federated Learning Coordination
//!
//! Trains one global model across data holders that never share raw data:
//! - **Coordinator**: round lifecycle, quorum and atomic commit
//! - **Aggregator**: deterministic sample-weighted averaging (FedAvg)
//! - **History**: append-only record of committed rounds, checkpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fedcoord::federated::{
//!     Coordinator, DataHandle, FederatedConfig, LocalSample, LogisticTrainer, Participant,
//!     ParticipantRecord,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> fedcoord::Result<()> {
//!     let coordinator = Coordinator::new(FederatedConfig::default().with_rounds(3))?;
//!     coordinator.initialize_weights(LogisticTrainer::initial_weights(2))?;
//!
//!     let mut learner = LogisticTrainer::new(2);
//!     learner.add_data(LocalSample::new(vec![0.9, 0.1], 1.0));
//!     let data = DataHandle::new("mem://h001");
//!     let record = ParticipantRecord::new("H001", "Metro General Hospital", 1, data);
//!     coordinator.register_participant(Participant::new(record, Arc::new(learner)))?;
//!
//!     let summary = coordinator.train().await?;
//!     println!("final accuracy: {:?}", summary.final_accuracy);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod federated;
pub mod monitoring;

pub use core::error::{Error, Result};
pub use federated::{Coordinator, FederatedConfig};
