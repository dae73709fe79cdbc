//! Reference local learner.
//!
//! A small logistic-regression [`Trainable`] over in-memory samples. It lets
//! the protocol run end to end without an external ML stack.

use crate::core::{Error, Result};
use crate::federated::participant::{DataHandle, Hyperparameters, Trainable, TrainingMetrics};
use crate::federated::weights::{Tensor, WeightVector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Training data sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalSample {
    /// Input features
    pub features: Vec<f32>,
    /// Binary label, 0.0 or 1.0
    pub label: f32,
}

impl LocalSample {
    /// Create a new training sample.
    pub fn new(features: Vec<f32>, label: f32) -> Self {
        Self { features, label }
    }
}

/// Logistic-regression learner holding its own data.
pub struct LogisticTrainer {
    /// Number of input features
    feature_count: usize,
    /// Local training data
    training_data: Vec<LocalSample>,
    /// Held-out sets addressable by handle
    eval_sets: HashMap<String, Vec<LocalSample>>,
}

impl LogisticTrainer {
    /// Create a learner for `feature_count` inputs.
    pub fn new(feature_count: usize) -> Self {
        Self {
            feature_count,
            training_data: Vec::new(),
            eval_sets: HashMap::new(),
        }
    }

    /// Zero weights with the layout this learner expects: `[features]` and a bias `[1]`.
    pub fn initial_weights(feature_count: usize) -> WeightVector {
        WeightVector::new(vec![Tensor::zeros(vec![feature_count]), Tensor::zeros(vec![1])])
    }

    /// Add training data.
    pub fn add_data(&mut self, sample: LocalSample) {
        self.training_data.push(sample);
    }

    /// Add batch of training data.
    pub fn add_data_batch(&mut self, samples: Vec<LocalSample>) {
        self.training_data.extend(samples);
    }

    /// Register a held-out set under `handle`.
    pub fn with_eval_set(mut self, handle: &DataHandle, samples: Vec<LocalSample>) -> Self {
        self.eval_sets.insert(handle.as_str().to_string(), samples);
        self
    }

    /// Get data sample count.
    pub fn data_count(&self) -> usize {
        self.training_data.len()
    }

    fn unpack<'a>(&self, weights: &'a WeightVector) -> Result<(&'a [f32], f32)> {
        let layers = weights.layers();
        if layers.len() != 2 || layers[0].len() != self.feature_count || layers[1].len() != 1 {
            return Err(Error::LocalTraining(format!(
                "expected weights [{}] + [1], got {:?}",
                self.feature_count,
                weights.shapes()
            )));
        }
        Ok((layers[0].values(), layers[1].values()[0]))
    }

    fn score(&self, weights: &WeightVector, samples: &[LocalSample]) -> Result<TrainingMetrics> {
        let (w, b) = self.unpack(weights)?;
        if samples.is_empty() {
            return Ok(TrainingMetrics::default());
        }

        let mut correct = 0usize;
        let mut loss = 0.0f32;
        for sample in samples {
            let p = predict(w, b, &sample.features).clamp(1e-7, 1.0 - 1e-7);
            if (p >= 0.5) == (sample.label >= 0.5) {
                correct += 1;
            }
            loss -= sample.label * p.ln() + (1.0 - sample.label) * (1.0 - p).ln();
        }

        let n = samples.len() as f32;
        Ok(TrainingMetrics {
            accuracy: correct as f32 / n,
            loss: loss / n,
            validation_accuracy: None,
        })
    }
}

fn predict(w: &[f32], b: f32, features: &[f32]) -> f32 {
    let z: f32 = w.iter().zip(features).map(|(w, x)| w * x).sum::<f32>() + b;
    1.0 / (1.0 + (-z).exp())
}

#[async_trait]
impl Trainable for LogisticTrainer {
    async fn train(
        &self,
        mut weights: WeightVector,
        epochs: u32,
        hyperparameters: &Hyperparameters,
    ) -> Result<(WeightVector, TrainingMetrics)> {
        if self.training_data.is_empty() {
            return Err(Error::LocalTraining("no local data loaded".to_string()));
        }
        self.unpack(&weights)?;

        let batch_size = hyperparameters.batch_size.max(1);
        let lr = hyperparameters.learning_rate;
        let mut grad_w = vec![0.0f32; self.feature_count];

        for _epoch in 0..epochs {
            for batch in self.training_data.chunks(batch_size) {
                grad_w.fill(0.0);
                let mut grad_b = 0.0f32;
                {
                    let (w, b) = self.unpack(&weights)?;
                    for sample in batch {
                        let error = predict(w, b, &sample.features) - sample.label;
                        for (g, x) in grad_w.iter_mut().zip(&sample.features) {
                            *g += error * x;
                        }
                        grad_b += error;
                    }
                }

                let scale = lr / batch.len() as f32;
                let layers = weights.layers_mut();
                for (param, grad) in layers[0].values_mut().iter_mut().zip(&grad_w) {
                    *param -= scale * grad;
                }
                layers[1].values_mut()[0] -= scale * grad_b;
            }
        }

        let metrics = self.score(&weights, &self.training_data)?;
        Ok((weights, metrics))
    }

    async fn evaluate(
        &self,
        weights: &WeightVector,
        test_data: &DataHandle,
    ) -> Result<TrainingMetrics> {
        let samples = self.eval_sets.get(test_data.as_str()).ok_or_else(|| {
            Error::LocalTraining(format!("unknown evaluation data {}", test_data.as_str()))
        })?;
        self.score(weights, samples)
    }
}
