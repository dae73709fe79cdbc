//! Round coordinator for federated averaging.
//!
//! The coordinator owns the single global model. Each round it snapshots the
//! global weights, fans them out to the selected participants, waits for
//! every dispatch to finish, fail or time out, and commits the aggregate only
//! when enough valid updates arrived. Partial rounds never commit.

use crate::core::{now, Error, ParticipantId, Result, Timestamp};
use crate::federated::aggregator::Aggregator;
use crate::federated::checkpoint::{Checkpoint, CheckpointStore};
use crate::federated::config::FederatedConfig;
use crate::federated::history::{
    Contribution, FailureKind, ParticipantFailure, RoundHistory, RoundRecord,
};
use crate::federated::participant::{
    DataHandle, Participant, ParticipantRecord, ParticipantUpdate, Trainable,
};
use crate::federated::roster::ParticipantRoster;
use crate::federated::selection::SelectionPolicy;
use crate::federated::weights::WeightVector;
use crate::monitoring::metrics::{CoordinatorMetrics, MetricsSnapshot};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of a coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "round", rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Missing initial weights or participants
    Uninitialized,
    /// Weights loaded and at least one participant registered
    Ready,
    /// Participants are training for this round
    RoundInProgress(u64),
    /// This round was committed
    RoundCommitted(u64),
    /// The round budget was spent or training stopped early
    Completed(u64),
    /// This round did not commit; it may be retried
    Failed(u64),
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorState::Uninitialized => write!(f, "uninitialized"),
            CoordinatorState::Ready => write!(f, "ready"),
            CoordinatorState::RoundInProgress(r) => write!(f, "running round {}", r),
            CoordinatorState::RoundCommitted(r) => write!(f, "committed round {}", r),
            CoordinatorState::Completed(r) => write!(f, "completed at round {}", r),
            CoordinatorState::Failed(r) => write!(f, "failed in round {}", r),
        }
    }
}

/// The current global weights and the round that produced them.
///
/// Round 0 is the initial model. Snapshots are immutable; a commit replaces
/// the whole value.
#[derive(Clone, Debug)]
pub struct GlobalModelState {
    pub round: u64,
    pub weights: Arc<WeightVector>,
}

/// Read-only view for status queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub run_id: Uuid,
    pub state: CoordinatorState,
    pub current_round: u64,
    pub global_accuracy_history: Vec<f32>,
    /// Whether the most recent round attempt reached quorum
    pub quorum_met: bool,
    pub participant_count: usize,
    /// Failures of the most recent round attempt
    pub last_failures: Vec<ParticipantFailure>,
}

/// Outcome of a `start_training` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub run_id: Uuid,
    /// Rounds committed by this call
    pub rounds_completed: u32,
    pub final_round: u64,
    pub final_accuracy: Option<f32>,
    pub participants: usize,
    pub total_parameters: usize,
    pub stopped_early: bool,
    pub completed_at: Timestamp,
}

type DispatchResult = std::result::Result<
    std::result::Result<Result<ParticipantUpdate>, tokio::time::error::Elapsed>,
    Box<dyn std::any::Any + Send>,
>;

/// Orchestrates federated training rounds.
pub struct Coordinator {
    run_id: Uuid,
    config: RwLock<FederatedConfig>,
    custom_selection: Option<Arc<dyn SelectionPolicy>>,
    participants: RwLock<BTreeMap<ParticipantId, Arc<Participant>>>,
    global: RwLock<Option<GlobalModelState>>,
    history: RoundHistory,
    state: RwLock<CoordinatorState>,
    quorum_met: RwLock<bool>,
    last_failures: RwLock<Vec<ParticipantFailure>>,
    store: Option<Arc<dyn CheckpointStore>>,
    last_checkpoint_round: RwLock<Option<u64>>,
    evaluator: Option<(Arc<dyn Trainable>, DataHandle)>,
    metrics: CoordinatorMetrics,
    round_lock: tokio::sync::Mutex<()>,
    training_lock: tokio::sync::Mutex<()>,
}

impl Coordinator {
    /// Create a coordinator with a validated configuration.
    pub fn new(config: FederatedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            config: RwLock::new(config),
            custom_selection: None,
            participants: RwLock::new(BTreeMap::new()),
            global: RwLock::new(None),
            history: RoundHistory::new(),
            state: RwLock::new(CoordinatorState::Uninitialized),
            quorum_met: RwLock::new(true),
            last_failures: RwLock::new(Vec::new()),
            store: None,
            last_checkpoint_round: RwLock::new(None),
            evaluator: None,
            metrics: CoordinatorMetrics::new(),
            round_lock: tokio::sync::Mutex::new(()),
            training_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Persist checkpoints and history to `store`.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Evaluate every committed model on held-out data.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Trainable>, test_data: DataHandle) -> Self {
        self.evaluator = Some((evaluator, test_data));
        self
    }

    /// Use `policy` instead of the configured selection strategy.
    pub fn with_selection_policy(mut self, policy: impl SelectionPolicy + 'static) -> Self {
        self.custom_selection = Some(Arc::new(policy));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    pub fn config(&self) -> FederatedConfig {
        self.config.read().clone()
    }

    /// Load the initial global weights (round 0).
    pub fn initialize_weights(&self, weights: WeightVector) -> Result<()> {
        if weights.layer_count() == 0 {
            return Err(Error::InvalidTensor("global model has no layers".into()));
        }
        if !weights.is_finite() {
            return Err(Error::InvalidTensor("global model contains non-finite values".into()));
        }

        let state = self.state();
        let fresh = matches!(state, CoordinatorState::Uninitialized | CoordinatorState::Ready);
        if !fresh || !self.history.is_empty() {
            return Err(Error::InvalidState {
                operation: "initialize weights".into(),
                state: state.to_string(),
            });
        }

        info!(
            run_id = %self.run_id,
            layers = weights.layer_count(),
            parameters = weights.parameter_count(),
            "global model initialized"
        );
        *self.global.write() = Some(GlobalModelState {
            round: 0,
            weights: Arc::new(weights),
        });
        self.refresh_ready();
        Ok(())
    }

    /// Register a participant, or re-register an existing id.
    ///
    /// Re-registration replaces only the sample count and data reference;
    /// the display name must match and the original capability is kept.
    pub fn register_participant(&self, participant: Participant) -> Result<()> {
        {
            let mut participants = self.participants.write();
            let id = participant.id().clone();
            let entry = match participants.get(&id) {
                Some(existing) => {
                    if existing.record().name != participant.record().name {
                        return Err(Error::InvalidConfig(format!(
                            "participant {} is registered as {:?}, not {:?}",
                            id,
                            existing.record().name,
                            participant.record().name
                        )));
                    }
                    let mut updated = existing.as_ref().clone();
                    updated.reregister(
                        participant.sample_count(),
                        participant.record().data.clone(),
                    );
                    info!(
                        participant_id = %id,
                        samples = updated.sample_count(),
                        "participant re-registered"
                    );
                    updated
                }
                None => {
                    info!(
                        participant_id = %id,
                        name = %participant.record().name,
                        samples = participant.sample_count(),
                        "participant registered"
                    );
                    participant
                }
            };
            participants.insert(id, Arc::new(entry));
        }
        self.refresh_ready();
        Ok(())
    }

    /// Register every record of `roster`, binding each to the capability
    /// returned by `connect`.
    pub async fn register_roster<F>(
        &self,
        roster: &dyn ParticipantRoster,
        connect: F,
    ) -> Result<usize>
    where
        F: Fn(&ParticipantRecord) -> Result<Arc<dyn Trainable>>,
    {
        let records = roster.records().await?;
        let count = records.len();
        for record in records {
            let trainer = connect(&record)?;
            self.register_participant(Participant::new(record, trainer))?;
        }
        Ok(count)
    }

    /// Remove a participant; it is not selected in later rounds.
    pub fn remove_participant(&self, id: &ParticipantId) -> Result<()> {
        match self.participants.write().remove(id) {
            Some(_) => {
                info!(participant_id = %id, "participant removed");
                Ok(())
            }
            None => Err(Error::UnknownParticipant(id.to_string())),
        }
    }

    /// Records of all registered participants, ascending by id.
    pub fn participants(&self) -> Vec<ParticipantRecord> {
        self.participants
            .read()
            .values()
            .map(|p| p.record().clone())
            .collect()
    }

    /// Immutable snapshot of the global model.
    pub fn global_model(&self) -> Option<GlobalModelState> {
        self.global.read().clone()
    }

    /// Status for the serving layer.
    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            run_id: self.run_id,
            state: self.state(),
            current_round: self.global.read().as_ref().map_or(0, |g| g.round),
            global_accuracy_history: self.history.accuracy_history(),
            quorum_met: *self.quorum_met.read(),
            participant_count: self.participants.read().len(),
            last_failures: self.last_failures.read().clone(),
        }
    }

    /// All committed round records, in order.
    pub fn get_history(&self) -> Vec<RoundRecord> {
        self.history.records()
    }

    pub fn history(&self) -> &RoundHistory {
        &self.history
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Replace the configuration and train for `round_budget` rounds.
    pub async fn start_training(
        &self,
        round_budget: u32,
        config: FederatedConfig,
    ) -> Result<TrainingSummary> {
        let config = config.with_rounds(round_budget);
        config.validate()?;
        *self.config.write() = config;
        self.train().await
    }

    /// Train for the configured number of rounds.
    ///
    /// A round that misses quorum is retried with the same snapshot up to
    /// `max_round_retries` times; after that the error is returned and the
    /// coordinator stays `Failed` with the global model unchanged.
    pub async fn train(&self) -> Result<TrainingSummary> {
        let _training = self.training_lock.try_lock().map_err(|_| Error::InvalidState {
            operation: "start training".into(),
            state: "already training".into(),
        })?;

        self.ensure_can_run("start training")?;

        let config = self.config();
        info!(
            run_id = %self.run_id,
            rounds = config.rounds,
            epochs = config.epochs_per_round,
            participants = self.participants.read().len(),
            strategy = %config.aggregation_strategy,
            "starting federated training"
        );

        let mut rounds_completed = 0u32;
        let mut stopped_early = false;

        while rounds_completed < config.rounds {
            let mut attempts = 0u32;
            let record = loop {
                match self.run_round().await {
                    Ok(record) => break record,
                    Err(e) if e.is_retryable() && attempts < config.max_round_retries => {
                        attempts += 1;
                        warn!(
                            run_id = %self.run_id,
                            attempt = attempts,
                            error = %e,
                            "retrying round"
                        );
                    }
                    Err(e) => {
                        error!(run_id = %self.run_id, error = %e, "federated training aborted");
                        let last_committed = self.global_model().map_or(0, |g| g.round);
                        self.persist(last_committed, true).await;
                        return Err(e);
                    }
                }
            };
            rounds_completed += 1;

            let improvement = self.history.improvement(record.round);
            info!(
                run_id = %self.run_id,
                round = record.round,
                accuracy = record.accuracy,
                improvement_pct = improvement,
                "round complete"
            );

            if let Some(plateau) = &config.plateau {
                if plateau.reached(&self.history) {
                    info!(
                        run_id = %self.run_id,
                        round = record.round,
                        "accuracy plateau reached, stopping"
                    );
                    stopped_early = true;
                    break;
                }
            }
        }

        let final_state = self.global_model();
        let final_round = final_state.as_ref().map_or(0, |g| g.round);
        self.persist(final_round, true).await;
        *self.state.write() = CoordinatorState::Completed(final_round);

        let summary = TrainingSummary {
            run_id: self.run_id,
            rounds_completed,
            final_round,
            final_accuracy: self.history.latest().map(|r| r.accuracy),
            participants: self.participants.read().len(),
            total_parameters: final_state.map_or(0, |g| g.weights.parameter_count()),
            stopped_early,
            completed_at: now(),
        };
        info!(
            run_id = %self.run_id,
            rounds = summary.rounds_completed,
            final_round = summary.final_round,
            final_accuracy = ?summary.final_accuracy,
            "federated training complete"
        );
        Ok(summary)
    }

    /// Run a single round attempt.
    #[tracing::instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn run_round(&self) -> Result<RoundRecord> {
        let _round = self.round_lock.lock().await;
        self.ensure_can_run("run a round")?;

        let started = Instant::now();
        let config = self.config();
        let snapshot = self.global_model().ok_or_else(|| Error::InvalidState {
            operation: "run a round".into(),
            state: CoordinatorState::Uninitialized.to_string(),
        })?;
        let round = snapshot.round + 1;

        let selected = self.select(round, &config)?;
        let required = config.required_updates(selected.len()).max(1);
        *self.state.write() = CoordinatorState::RoundInProgress(round);
        let _attempt = RoundAttempt { coordinator: self, round };
        info!(round, selected = selected.len(), required, "round started");

        let (updates, failures) = self
            .dispatch(&snapshot.weights, selected, required, &config)
            .await;

        for failure in &failures {
            self.metrics.record_failure(failure.kind);
            warn!(
                round,
                participant_id = %failure.participant_id,
                kind = %failure.kind,
                reason = %failure.message,
                "participant excluded from round"
            );
        }

        if updates.len() < required {
            let err = Error::QuorumNotMet {
                round,
                required,
                received: updates.len(),
            };
            return Err(self.fail_round(round, failures, err));
        }

        let aggregator = Aggregator::new(config.aggregation_strategy);
        let aggregated = match aggregator.aggregate(&updates) {
            Ok(weights) => weights,
            Err(e) => return Err(self.fail_round(round, failures, e)),
        };
        let accuracy = match aggregator.mean_accuracy(&updates) {
            Ok(accuracy) => accuracy,
            Err(e) => return Err(self.fail_round(round, failures, e)),
        };
        let evaluated_accuracy = self.evaluate(&aggregated).await;

        let record = RoundRecord {
            round,
            accuracy,
            evaluated_accuracy,
            participant_ids: updates.iter().map(|u| u.participant_id.clone()).collect(),
            total_samples: updates.iter().map(|u| u.samples).sum(),
            timestamp: now(),
            contributions: updates
                .iter()
                .map(|u| Contribution {
                    participant_id: u.participant_id.clone(),
                    accuracy: u.metrics.accuracy,
                    loss: u.metrics.loss,
                    samples: u.samples,
                })
                .collect(),
            failures,
        };

        // History append and model swap happen under the global write lock so
        // readers never see one without the other.
        {
            let mut global = self.global.write();
            if let Err(e) = self.history.append(record.clone()) {
                drop(global);
                error!(round, error = %e, "history rejected committed round");
                return Err(self.fail_round(round, record.failures.clone(), e));
            }
            *global = Some(GlobalModelState {
                round,
                weights: Arc::new(aggregated),
            });
        }

        *self.state.write() = CoordinatorState::RoundCommitted(round);
        *self.quorum_met.write() = true;
        *self.last_failures.write() = record.failures.clone();
        self.metrics.rounds_committed.inc();
        self.metrics.last_round_accuracy.set(f64::from(accuracy));
        self.metrics
            .last_round_duration_ms
            .set(started.elapsed().as_secs_f64() * 1000.0);

        info!(
            round,
            contributors = record.participant_ids.len(),
            total_samples = record.total_samples,
            accuracy = record.accuracy,
            "round committed"
        );

        self.persist(round, false).await;
        Ok(record)
    }

    /// Reload the latest checkpoint and history from the store.
    ///
    /// History beyond the checkpoint's round is dropped, since the weights
    /// for those rounds were not persisted. Returns the restored round.
    pub async fn restore(&self) -> Result<u64> {
        let store = self
            .store
            .clone()
            .ok_or_else(|| Error::InvalidConfig("no checkpoint store configured".into()))?;

        let state = self.state();
        let fresh = matches!(state, CoordinatorState::Uninitialized | CoordinatorState::Ready);
        if !fresh || !self.history.is_empty() {
            return Err(Error::InvalidState {
                operation: "restore".into(),
                state: state.to_string(),
            });
        }

        let checkpoint = store.latest_checkpoint().await?.ok_or(Error::CheckpointNotFound)?;
        let mut records = store.load_history().await?;

        if records.len() as u64 > checkpoint.round {
            warn!(
                checkpoint_round = checkpoint.round,
                history_rounds = records.len(),
                "discarding history recorded after the latest checkpoint"
            );
            records.truncate(checkpoint.round as usize);
        }
        if (records.len() as u64) < checkpoint.round {
            return Err(Error::CheckpointCorrupted(format!(
                "checkpoint is round {} but history ends at round {}",
                checkpoint.round,
                records.len()
            )));
        }

        // Validate ordering before touching live history.
        RoundHistory::from_records(records.clone())?;
        for record in records {
            self.history.append(record)?;
        }

        *self.global.write() = Some(GlobalModelState {
            round: checkpoint.round,
            weights: Arc::new(checkpoint.weights),
        });
        *self.last_checkpoint_round.write() = Some(checkpoint.round);
        self.refresh_ready();

        info!(run_id = %self.run_id, round = checkpoint.round, "restored from checkpoint");
        Ok(checkpoint.round)
    }

    fn refresh_ready(&self) {
        let ready = self.global.read().is_some() && !self.participants.read().is_empty();
        let mut state = self.state.write();
        if ready && *state == CoordinatorState::Uninitialized {
            *state = CoordinatorState::Ready;
        }
    }

    fn ensure_can_run(&self, operation: &str) -> Result<()> {
        if self.participants.read().is_empty() {
            return Err(Error::NoParticipantsRegistered);
        }
        match self.state() {
            CoordinatorState::Ready
            | CoordinatorState::RoundCommitted(_)
            | CoordinatorState::Failed(_) => Ok(()),
            state => Err(Error::InvalidState {
                operation: operation.into(),
                state: state.to_string(),
            }),
        }
    }

    fn select(&self, round: u64, config: &FederatedConfig) -> Result<Vec<Arc<Participant>>> {
        let participants = self.participants.read();
        if participants.is_empty() {
            return Err(Error::NoParticipantsRegistered);
        }

        let candidates: Vec<ParticipantId> = participants.keys().cloned().collect();
        let chosen = match &self.custom_selection {
            Some(policy) => policy.select(round, &candidates),
            None => config.selection.policy().select(round, &candidates),
        };

        let unique: BTreeSet<ParticipantId> = chosen.into_iter().collect();
        let selected = unique
            .iter()
            .filter_map(|id| {
                let participant = participants.get(id).cloned();
                if participant.is_none() {
                    debug!(round, participant_id = %id, "selection returned unknown participant");
                }
                participant
            })
            .collect();
        Ok(selected)
    }

    /// Fan the snapshot out and wait for every dispatch.
    ///
    /// Returns valid updates ascending by participant id, plus failures.
    /// Outstanding dispatches are cancelled as soon as quorum is out of reach.
    async fn dispatch(
        &self,
        snapshot: &Arc<WeightVector>,
        selected: Vec<Arc<Participant>>,
        required: usize,
        config: &FederatedConfig,
    ) -> (Vec<ParticipantUpdate>, Vec<ParticipantFailure>) {
        let timeout = config.participant_timeout();
        let epochs = config.epochs_per_round;
        let hyperparameters = config.hyperparameters();

        let mut pending: BTreeSet<ParticipantId> = BTreeSet::new();
        let mut tasks: JoinSet<(ParticipantId, DispatchResult)> = JoinSet::new();
        for participant in selected {
            pending.insert(participant.id().clone());
            let weights = Arc::clone(snapshot);
            let hyperparameters = hyperparameters.clone();
            tasks.spawn(async move {
                let id = participant.id().clone();
                let training = tokio::time::timeout(
                    timeout,
                    participant.train(&weights, epochs, &hyperparameters),
                );
                let outcome = AssertUnwindSafe(training).catch_unwind().await;
                (id, outcome)
            });
        }

        let mut updates: Vec<ParticipantUpdate> = Vec::new();
        let mut failures: Vec<ParticipantFailure> = Vec::new();

        loop {
            if updates.len() + pending.len() < required {
                if !pending.is_empty() {
                    debug!(
                        valid = updates.len(),
                        outstanding = pending.len(),
                        required,
                        "quorum unreachable, cancelling outstanding participants"
                    );
                    tasks.abort_all();
                }
                break;
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (id, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "participant task lost");
                    continue;
                }
            };
            pending.remove(&id);

            match classify(&id, outcome, snapshot, timeout) {
                Ok(update) => {
                    debug!(participant_id = %id, samples = update.samples, "update received");
                    updates.push(update);
                }
                Err(failure) => failures.push(failure),
            }
        }

        let kind_for_leftovers = if tasks.is_empty() {
            FailureKind::LocalTraining
        } else {
            FailureKind::Cancelled
        };
        for id in pending {
            let message = match kind_for_leftovers {
                FailureKind::Cancelled => "cancelled: quorum unreachable".to_string(),
                _ => "training task ended without a result".to_string(),
            };
            failures.push(ParticipantFailure {
                participant_id: id,
                kind: kind_for_leftovers,
                message,
            });
        }

        updates.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        failures.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        (updates, failures)
    }

    async fn evaluate(&self, weights: &WeightVector) -> Option<f32> {
        let (evaluator, test_data) = self.evaluator.as_ref()?;
        match evaluator.evaluate(weights, test_data).await {
            Ok(metrics) => Some(metrics.accuracy),
            Err(e) => {
                warn!(error = %e, "held-out evaluation failed");
                None
            }
        }
    }

    fn fail_round(&self, round: u64, failures: Vec<ParticipantFailure>, err: Error) -> Error {
        warn!(round, error = %err, "round failed, global model unchanged");
        *self.state.write() = CoordinatorState::Failed(round);
        *self.quorum_met.write() = !matches!(err, Error::QuorumNotMet { .. });
        *self.last_failures.write() = failures;
        self.metrics.rounds_failed.inc();
        err
    }

    /// Write a checkpoint when due (or when `force`d) and the history.
    ///
    /// Failures are logged and counted; the commit they follow stands.
    async fn persist(&self, round: u64, force: bool) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let Some(global) = self.global_model() else {
            return;
        };

        let every = u64::from(self.config.read().checkpoint_every);
        let already_saved = *self.last_checkpoint_round.read() == Some(round);
        if round > 0 && !already_saved && (force || round % every == 0) {
            let checkpoint = Checkpoint::new(round, global.weights.as_ref().clone());
            match store.save_checkpoint(&checkpoint).await {
                Ok(()) => {
                    *self.last_checkpoint_round.write() = Some(round);
                    debug!(round, digest = %checkpoint.digest, "checkpoint saved");
                }
                Err(e) => {
                    self.metrics.checkpoint_failures.inc();
                    error!(round, error = %e, "failed to save checkpoint");
                }
            }
        }

        if let Err(e) = store.save_history(&self.history.records()).await {
            self.metrics.checkpoint_failures.inc();
            error!(round, error = %e, "failed to save round history");
        }
    }
}

/// Marks a round attempt `Failed` if it is dropped before commit or failure
/// handling, e.g. when the caller's future is cancelled mid-round.
struct RoundAttempt<'a> {
    coordinator: &'a Coordinator,
    round: u64,
}

impl Drop for RoundAttempt<'_> {
    fn drop(&mut self) {
        let mut state = self.coordinator.state.write();
        if *state == CoordinatorState::RoundInProgress(self.round) {
            warn!(round = self.round, "round abandoned before commit");
            *state = CoordinatorState::Failed(self.round);
            self.coordinator.metrics.rounds_failed.inc();
        }
    }
}

fn classify(
    id: &ParticipantId,
    outcome: DispatchResult,
    snapshot: &WeightVector,
    timeout: Duration,
) -> std::result::Result<ParticipantUpdate, ParticipantFailure> {
    let failure = |kind: FailureKind, message: String| ParticipantFailure {
        participant_id: id.clone(),
        kind,
        message,
    };

    let update = match outcome {
        Err(_) => return Err(failure(FailureKind::LocalTraining, "training panicked".into())),
        Ok(Err(_)) => {
            let err = Error::Timeout {
                participant_id: id.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            };
            return Err(failure(FailureKind::Timeout, err.to_string()));
        }
        Ok(Ok(Err(e))) => return Err(failure(FailureKind::LocalTraining, e.to_string())),
        Ok(Ok(Ok(update))) => update,
    };

    if let Err(e) = snapshot.ensure_same_shape(&update.weights) {
        return Err(failure(FailureKind::ShapeMismatch, e.to_string()));
    }
    if !update.weights.is_finite() {
        return Err(failure(
            FailureKind::NonFiniteWeights,
            "update contains NaN or infinite values".into(),
        ));
    }
    Ok(update)
}
