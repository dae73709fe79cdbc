//! Checkpoint persistence for global weights and round history.
//!
//! A checkpoint is `{round, weights}` plus a SHA3-256 digest of the weights
//! that is verified whenever the checkpoint is read back.

use crate::core::{Error, Hash256, Result, Timestamp};
use crate::federated::history::RoundRecord;
use crate::federated::weights::WeightVector;
use crate::monitoring::metrics::Counter;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global weights as of a committed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Round the weights were committed in (0 for the initial weights)
    pub round: u64,
    /// Global weights
    pub weights: WeightVector,
    /// Digest of `weights`
    pub digest: Hash256,
    /// When the checkpoint was taken
    pub created: Timestamp,
}

impl Checkpoint {
    /// Create a checkpoint, computing the digest.
    pub fn new(round: u64, weights: WeightVector) -> Self {
        let digest = weights.digest();
        Self {
            round,
            weights,
            digest,
            created: crate::core::now(),
        }
    }

    /// Check that the digest matches the weights.
    pub fn verify(&self) -> Result<()> {
        let actual = self.weights.digest();
        if actual != self.digest {
            return Err(Error::CheckpointCorrupted(format!(
                "round {}: digest {} does not match weights ({})",
                self.round, self.digest, actual
            )));
        }
        Ok(())
    }
}

/// Storage for checkpoints and history.
///
/// Only the latest checkpoint and the full history must be retained.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, superseding earlier ones as "latest".
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Most recent checkpoint, verified.
    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>>;

    /// Persist the full history, replacing the stored copy.
    async fn save_history(&self, records: &[RoundRecord]) -> Result<()>;

    /// Stored history, empty if none was saved.
    async fn load_history(&self) -> Result<Vec<RoundRecord>>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    latest: RwLock<Option<Checkpoint>>,
    history: RwLock<Vec<RoundRecord>>,
    saves: Counter,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints written so far.
    pub fn save_count(&self) -> u64 {
        self.saves.get()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        *self.latest.write() = Some(checkpoint.clone());
        self.saves.inc();
        Ok(())
    }

    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let latest = self.latest.read().clone();
        if let Some(checkpoint) = &latest {
            checkpoint.verify()?;
        }
        Ok(latest)
    }

    async fn save_history(&self, records: &[RoundRecord]) -> Result<()> {
        *self.history.write() = records.to_vec();
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<RoundRecord>> {
        Ok(self.history.read().clone())
    }
}

const LATEST_FILE: &str = "latest.ckpt";
const HISTORY_FILE: &str = "training_history.json";

/// Directory-backed store.
///
/// Layout: `latest.ckpt` (bincode), optional `round_<n>.ckpt` copies, and
/// `training_history.json`.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    keep_intermediate: bool,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            keep_intermediate: false,
        })
    }

    /// Also keep one file per round.
    pub fn keep_intermediate(mut self, keep: bool) -> Self {
        self.keep_intermediate = keep;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the per-round copy for `round`.
    pub fn round_path(&self, round: u64) -> PathBuf {
        self.dir.join(format!("round_{}.ckpt", round))
    }

    /// Load and verify the per-round copy for `round`.
    pub async fn checkpoint_for_round(&self, round: u64) -> Result<Option<Checkpoint>> {
        read_checkpoint(&self.round_path(round)).await
    }

    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let tmp = self.dir.join(format!("{}.tmp", name));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.dir.join(name)).await?;
        Ok(())
    }
}

async fn read_checkpoint(path: &Path) -> Result<Option<Checkpoint>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let checkpoint: Checkpoint = bincode::deserialize(&bytes)
        .map_err(|e| Error::CheckpointCorrupted(format!("{}: {}", path.display(), e)))?;
    checkpoint.verify()?;
    Ok(Some(checkpoint))
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = bincode::serialize(checkpoint)?;
        if self.keep_intermediate {
            let name = format!("round_{}.ckpt", checkpoint.round);
            self.write_atomic(&name, &bytes).await?;
        }
        self.write_atomic(LATEST_FILE, &bytes).await
    }

    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>> {
        read_checkpoint(&self.dir.join(LATEST_FILE)).await
    }

    async fn save_history(&self, records: &[RoundRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        self.write_atomic(HISTORY_FILE, json.as_bytes()).await
    }

    async fn load_history(&self) -> Result<Vec<RoundRecord>> {
        match tokio::fs::read_to_string(self.dir.join(HISTORY_FILE)).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::now;
    use crate::federated::weights::Tensor;

    fn weights(value: f32) -> WeightVector {
        WeightVector::new(vec![
            Tensor::new(vec![2, 2], vec![value; 4]).unwrap(),
            Tensor::scalar(-value),
        ])
    }

    fn record(round: u64) -> RoundRecord {
        RoundRecord {
            round,
            accuracy: 0.5,
            evaluated_accuracy: None,
            participant_ids: vec!["H001".into()],
            total_samples: 2000,
            timestamp: now(),
            contributions: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("fedcoord-ckpt-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_checkpoint_verify_detects_tampering() {
        let mut checkpoint = Checkpoint::new(3, weights(1.0));
        assert!(checkpoint.verify().is_ok());

        checkpoint.weights.layers_mut()[1].values_mut()[0] = 5.0;
        assert!(matches!(checkpoint.verify(), Err(Error::CheckpointCorrupted(_))));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCheckpointStore::new();
        assert!(store.latest_checkpoint().await.unwrap().is_none());

        store.save_checkpoint(&Checkpoint::new(1, weights(1.0))).await.unwrap();
        store.save_checkpoint(&Checkpoint::new(2, weights(2.0))).await.unwrap();
        store.save_history(&[record(1), record(2)]).await.unwrap();

        let latest = store.latest_checkpoint().await.unwrap().unwrap();
        assert_eq!(latest.round, 2);
        assert_eq!(latest.weights, weights(2.0));
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_latest_only() {
        let dir = temp_dir();
        let store = FileCheckpointStore::open(&dir).await.unwrap();

        assert!(store.latest_checkpoint().await.unwrap().is_none());
        assert!(store.load_history().await.unwrap().is_empty());

        store.save_checkpoint(&Checkpoint::new(1, weights(1.0))).await.unwrap();
        store.save_checkpoint(&Checkpoint::new(2, weights(2.0))).await.unwrap();

        let latest = store.latest_checkpoint().await.unwrap().unwrap();
        assert_eq!(latest.round, 2);
        assert_eq!(latest.weights, weights(2.0));
        assert!(store.checkpoint_for_round(1).await.unwrap().is_none());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_keeps_intermediate() {
        let dir = temp_dir();
        let store = FileCheckpointStore::open(&dir).await.unwrap().keep_intermediate(true);

        store.save_checkpoint(&Checkpoint::new(1, weights(1.0))).await.unwrap();
        store.save_checkpoint(&Checkpoint::new(2, weights(2.0))).await.unwrap();

        let first = store.checkpoint_for_round(1).await.unwrap().unwrap();
        assert_eq!(first.weights, weights(1.0));
        assert!(store.round_path(2).exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_history_roundtrip() {
        let dir = temp_dir();
        let store = FileCheckpointStore::open(&dir).await.unwrap();

        let records = vec![record(1), record(2), record(3)];
        store.save_history(&records).await.unwrap();
        assert_eq!(store.load_history().await.unwrap(), records);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = temp_dir();
        let store = FileCheckpointStore::open(&dir).await.unwrap();
        tokio::fs::write(dir.join(LATEST_FILE), b"not a checkpoint").await.unwrap();

        let err = store.latest_checkpoint().await.unwrap_err();
        assert!(matches!(err, Error::CheckpointCorrupted(_)));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
