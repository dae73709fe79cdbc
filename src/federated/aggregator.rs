//! Weight aggregation for federated learning.
//!
//! Implements FedAvg (sample-weighted averaging) and plain averaging.

use crate::core::{Error, Result};
use crate::federated::participant::ParticipantUpdate;
use crate::federated::weights::WeightVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Aggregation methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// FedAvg: each update weighted by its share of the round's samples
    WeightedAverage,
    /// Unweighted mean across contributors
    SimpleAverage,
}

impl Default for AggregationMethod {
    fn default() -> Self {
        Self::WeightedAverage
    }
}

impl std::fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationMethod::WeightedAverage => write!(f, "weighted_average"),
            AggregationMethod::SimpleAverage => write!(f, "simple_average"),
        }
    }
}

/// Stateless combiner of participant updates.
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    method: AggregationMethod,
}

impl Aggregator {
    /// Create an aggregator using `method`.
    pub fn new(method: AggregationMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> AggregationMethod {
        self.method
    }

    /// Combine updates into a single weight vector.
    ///
    /// Updates are accumulated in ascending participant-id order in f64, so
    /// the result does not depend on the order of `updates`.
    pub fn aggregate(&self, updates: &[ParticipantUpdate]) -> Result<WeightVector> {
        let sorted = sorted_updates(updates)?;
        let reference = &sorted[0].weights;
        for update in &sorted[1..] {
            reference.ensure_same_shape(&update.weights).map_err(|e| {
                Error::ShapeMismatch(format!("participant {}: {}", update.participant_id, e))
            })?;
        }

        let factors = self.factors(&sorted)?;

        let mut accumulators: Vec<Vec<f64>> = reference
            .layers()
            .iter()
            .map(|layer| vec![0.0; layer.len()])
            .collect();

        for (update, factor) in sorted.iter().zip(&factors) {
            for (acc, layer) in accumulators.iter_mut().zip(update.weights.layers()) {
                for (a, v) in acc.iter_mut().zip(layer.values()) {
                    *a += factor * f64::from(*v);
                }
            }
        }

        let mut aggregated = WeightVector::zeros_like(reference);
        for (layer, acc) in aggregated.layers_mut().iter_mut().zip(accumulators) {
            for (v, a) in layer.values_mut().iter_mut().zip(acc) {
                *v = a as f32;
            }
        }

        Ok(aggregated)
    }

    /// Mean of the contributors' local accuracies, weighted like the weights.
    ///
    /// This is a proxy built from each participant's own data, not an
    /// evaluation of the aggregated model on held-out data.
    pub fn mean_accuracy(&self, updates: &[ParticipantUpdate]) -> Result<f32> {
        let sorted = sorted_updates(updates)?;
        let factors = self.factors(&sorted)?;
        let mean: f64 = sorted
            .iter()
            .zip(&factors)
            .map(|(u, f)| f * f64::from(u.metrics.accuracy))
            .sum();
        Ok(mean as f32)
    }

    fn factors(&self, sorted: &[&ParticipantUpdate]) -> Result<Vec<f64>> {
        match self.method {
            AggregationMethod::WeightedAverage => {
                let total_samples: u64 = sorted.iter().map(|u| u.samples).sum();
                if total_samples == 0 {
                    return Err(Error::InvalidAggregationInput(
                        "total sample count is zero".to_string(),
                    ));
                }
                let total = total_samples as f64;
                Ok(sorted.iter().map(|u| u.samples as f64 / total).collect())
            }
            AggregationMethod::SimpleAverage => {
                let share = 1.0 / sorted.len() as f64;
                Ok(vec![share; sorted.len()])
            }
        }
    }
}

fn sorted_updates(updates: &[ParticipantUpdate]) -> Result<Vec<&ParticipantUpdate>> {
    if updates.is_empty() {
        return Err(Error::InvalidAggregationInput("no updates to aggregate".to_string()));
    }

    let mut seen = HashSet::with_capacity(updates.len());
    for update in updates {
        if !seen.insert(&update.participant_id) {
            return Err(Error::InvalidAggregationInput(format!(
                "duplicate update from participant {}",
                update.participant_id
            )));
        }
    }

    let mut sorted: Vec<&ParticipantUpdate> = updates.iter().collect();
    sorted.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::participant::TrainingMetrics;
    use crate::federated::weights::Tensor;

    fn update(id: &str, samples: u64, weights: WeightVector, accuracy: f32) -> ParticipantUpdate {
        ParticipantUpdate {
            participant_id: id.into(),
            weights,
            samples,
            metrics: TrainingMetrics {
                accuracy,
                loss: 0.0,
                validation_accuracy: None,
            },
        }
    }

    fn scalar(id: &str, samples: u64, value: f32) -> ParticipantUpdate {
        update(id, samples, WeightVector::new(vec![Tensor::scalar(value)]), 0.5)
    }

    fn layered(value: f32) -> WeightVector {
        WeightVector::new(vec![
            Tensor::new(vec![2, 3], vec![value; 6]).unwrap(),
            Tensor::from_vec(vec![value, -value]),
        ])
    }

    fn first(w: &WeightVector) -> f32 {
        w.layers()[0].values()[0]
    }

    #[test]
    fn test_equal_samples_scenario() {
        let agg = Aggregator::default();
        let updates = vec![scalar("a", 100, 1.0), scalar("b", 100, 2.0), scalar("c", 100, 3.0)];
        let result = agg.aggregate(&updates).unwrap();
        assert!((first(&result) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_skewed_samples_scenario() {
        let agg = Aggregator::new(AggregationMethod::WeightedAverage);
        let updates = vec![scalar("a", 900, 1.0), scalar("b", 100, 11.0)];
        let result = agg.aggregate(&updates).unwrap();
        // 0.9 * 1.0 + 0.1 * 11.0
        assert!((first(&result) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_simple_average_ignores_samples() {
        let agg = Aggregator::new(AggregationMethod::SimpleAverage);
        let updates = vec![scalar("a", 900, 1.0), scalar("b", 100, 11.0)];
        let result = agg.aggregate(&updates).unwrap();
        assert!((first(&result) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_shape_preserved() {
        let agg = Aggregator::default();
        let updates = vec![
            update("a", 10, layered(1.0), 0.5),
            update("b", 30, layered(2.0), 0.5),
        ];
        let result = agg.aggregate(&updates).unwrap();
        assert_eq!(result.shapes(), layered(0.0).shapes());
        assert!((result.layers()[1].values()[1] + 1.75).abs() < 1e-5);
    }

    #[test]
    fn test_equal_samples_matches_simple_average() {
        let updates = vec![
            update("a", 50, layered(0.3), 0.5),
            update("b", 50, layered(-1.7), 0.5),
            update("c", 50, layered(4.1), 0.5),
        ];
        let weighted = Aggregator::new(AggregationMethod::WeightedAverage)
            .aggregate(&updates)
            .unwrap();
        let simple = Aggregator::new(AggregationMethod::SimpleAverage)
            .aggregate(&updates)
            .unwrap();

        for (w, s) in weighted.layers().iter().zip(simple.layers()) {
            for (a, b) in w.values().iter().zip(s.values()) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_single_update_returned_unchanged() {
        let weights = WeightVector::new(vec![
            Tensor::from_vec(vec![0.1, 0.2, 0.3]),
            Tensor::new(vec![1, 2], vec![1e-7, 123.456]).unwrap(),
        ]);
        let updates = vec![update("only", 42, weights.clone(), 0.9)];

        for method in [AggregationMethod::WeightedAverage, AggregationMethod::SimpleAverage] {
            let result = Aggregator::new(method).aggregate(&updates).unwrap();
            assert_eq!(result, weights);
        }
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let agg = Aggregator::default();
        let forward = vec![scalar("a", 3, 0.1), scalar("b", 7, 0.7), scalar("c", 11, 1.3)];
        let mut reversed = forward.clone();
        reversed.reverse();

        let x = agg.aggregate(&forward).unwrap();
        let y = agg.aggregate(&reversed).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = Aggregator::default().aggregate(&[]).unwrap_err();
        assert!(matches!(err, Error::InvalidAggregationInput(_)));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let updates = vec![scalar("a", 0, 1.0), scalar("b", 0, 2.0)];
        let err = Aggregator::default().aggregate(&updates).unwrap_err();
        assert!(matches!(err, Error::InvalidAggregationInput(_)));

        // Simple averaging does not depend on sample counts
        assert!(Aggregator::new(AggregationMethod::SimpleAverage)
            .aggregate(&updates)
            .is_ok());
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let updates = vec![update("a", 10, layered(1.0), 0.5), scalar("b", 10, 1.0)];
        let err = Aggregator::default().aggregate(&updates).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_duplicate_participant_rejected() {
        let updates = vec![scalar("a", 10, 1.0), scalar("a", 10, 2.0)];
        let err = Aggregator::default().aggregate(&updates).unwrap_err();
        assert!(matches!(err, Error::InvalidAggregationInput(_)));
    }

    #[test]
    fn test_mean_accuracy_weighted_by_samples() {
        let updates = vec![
            update("a", 300, layered(0.0), 0.9),
            update("b", 100, layered(0.0), 0.5),
        ];
        let acc = Aggregator::default().mean_accuracy(&updates).unwrap();
        assert!((acc - 0.8).abs() < 1e-5);

        let simple = Aggregator::new(AggregationMethod::SimpleAverage)
            .mean_accuracy(&updates)
            .unwrap();
        assert!((simple - 0.7).abs() < 1e-5);
    }
}
