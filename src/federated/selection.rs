//! Participant selection policies.

use crate::core::ParticipantId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Chooses which registered participants take part in a round.
///
/// Implementations must be deterministic for a given round and candidate
/// list so that runs can be replayed.
pub trait SelectionPolicy: Send + Sync {
    /// Select from `candidates` (ascending by id) for `round`.
    fn select(&self, round: u64, candidates: &[ParticipantId]) -> Vec<ParticipantId>;
}

/// Select every registered participant.
#[derive(Clone, Debug, Default)]
pub struct AllParticipants;

impl SelectionPolicy for AllParticipants {
    fn select(&self, _round: u64, candidates: &[ParticipantId]) -> Vec<ParticipantId> {
        candidates.to_vec()
    }
}

/// Select a seeded random subset of fixed size each round.
#[derive(Clone, Debug)]
pub struct RandomSubset {
    count: usize,
    seed: u64,
}

impl RandomSubset {
    pub fn new(count: usize, seed: u64) -> Self {
        Self { count, seed }
    }
}

impl SelectionPolicy for RandomSubset {
    fn select(&self, round: u64, candidates: &[ParticipantId]) -> Vec<ParticipantId> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(round));
        let mut chosen: Vec<ParticipantId> = candidates
            .choose_multiple(&mut rng, self.count.min(candidates.len()))
            .cloned()
            .collect();
        chosen.sort();
        chosen
    }
}

/// Serializable selection setting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Every registered participant
    All,
    /// `count` participants drawn per round from a generator seeded with `seed + round`
    RandomSubset { count: usize, seed: u64 },
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::All
    }
}

impl SelectionStrategy {
    /// Build the policy this setting describes.
    pub fn policy(&self) -> Box<dyn SelectionPolicy> {
        match self {
            SelectionStrategy::All => Box::new(AllParticipants),
            SelectionStrategy::RandomSubset { count, seed } => {
                Box::new(RandomSubset::new(*count, *seed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(n: usize) -> Vec<ParticipantId> {
        (1..=n).map(|i| ParticipantId::new(format!("H{:03}", i))).collect()
    }

    #[test]
    fn test_all_participants() {
        let ids = candidates(4);
        assert_eq!(AllParticipants.select(7, &ids), ids);
    }

    #[test]
    fn test_random_subset_is_deterministic() {
        let ids = candidates(8);
        let policy = RandomSubset::new(3, 42);

        let a = policy.select(1, &ids);
        let b = policy.select(1, &ids);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|id| ids.contains(id)));
    }

    #[test]
    fn test_random_subset_varies_across_rounds() {
        let ids = candidates(8);
        let policy = RandomSubset::new(4, 7);
        let picks: Vec<Vec<ParticipantId>> = (1..=10).map(|r| policy.select(r, &ids)).collect();
        assert!(picks.iter().any(|p| p != &picks[0]));
    }

    #[test]
    fn test_random_subset_caps_at_candidate_count() {
        let ids = candidates(2);
        let picked = RandomSubset::new(5, 1).select(1, &ids);
        assert_eq!(picked, ids);
    }

    #[test]
    fn test_strategy_serde() {
        let strategy: SelectionStrategy =
            serde_json::from_str(r#"{"type":"random_subset","count":3,"seed":9}"#).unwrap();
        assert_eq!(strategy, SelectionStrategy::RandomSubset { count: 3, seed: 9 });
        assert_eq!(strategy.policy().select(1, &candidates(5)).len(), 3);
    }
}
