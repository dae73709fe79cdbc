//! Scripted training capability for unit tests.

use crate::core::{Error, Result};
use crate::federated::participant::{DataHandle, Hyperparameters, Trainable, TrainingMetrics};
use crate::federated::weights::{Tensor, WeightVector};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A single scalar layer holding `value`.
pub fn scalar_weights(value: f32) -> WeightVector {
    WeightVector::new(vec![Tensor::scalar(value)])
}

/// What a [`ScriptedTrainer`] does when asked to train.
#[derive(Clone, Debug)]
pub enum Script {
    /// Return these weights with the given local accuracy
    Return(WeightVector, f32),
    /// Add a constant to every input value, accuracy 0.5
    AddToInput(f32),
    /// Fail with a local training error
    Fail(String),
    /// Sleep, then run the inner script
    Delay(Duration, Box<Script>),
    /// Return a vector with an extra layer
    WrongShape,
    /// Panic inside the training task
    Panic,
    /// Fail the first `n` calls, then run the inner script
    FailTimes(usize, Box<Script>),
    /// Run the inner script for the first `n` calls, then fail
    FailAfter(usize, Box<Script>),
}

/// Trainable whose behaviour is fixed up front.
pub struct ScriptedTrainer {
    script: Script,
    eval_accuracy: f32,
    calls: AtomicUsize,
}

impl ScriptedTrainer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            eval_accuracy: 0.75,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_eval_accuracy(mut self, accuracy: f32) -> Self {
        self.eval_accuracy = accuracy;
        self
    }

    async fn run(
        script: &Script,
        call: usize,
        mut weights: WeightVector,
    ) -> Result<(WeightVector, TrainingMetrics)> {
        let mut script = script;
        loop {
            match script {
                Script::FailTimes(n, inner) => {
                    if call < *n {
                        return Err(Error::LocalTraining(format!("scripted failure {}", call + 1)));
                    }
                    script = inner.as_ref();
                }
                Script::FailAfter(n, inner) => {
                    if call >= *n {
                        let message = format!("scripted failure after {} calls", n);
                        return Err(Error::LocalTraining(message));
                    }
                    script = inner.as_ref();
                }
                Script::Delay(delay, inner) => {
                    tokio::time::sleep(*delay).await;
                    script = inner.as_ref();
                }
                Script::Return(w, accuracy) => {
                    return Ok((w.clone(), metrics(*accuracy)));
                }
                Script::AddToInput(delta) => {
                    for layer in weights.layers_mut() {
                        for v in layer.values_mut() {
                            *v += delta;
                        }
                    }
                    return Ok((weights, metrics(0.5)));
                }
                Script::Fail(msg) => return Err(Error::LocalTraining(msg.clone())),
                Script::WrongShape => {
                    let mut layers = weights.layers().to_vec();
                    layers.push(Tensor::scalar(0.0));
                    return Ok((WeightVector::new(layers), metrics(0.9)));
                }
                Script::Panic => panic!("scripted trainer panic"),
            }
        }
    }
}

fn metrics(accuracy: f32) -> TrainingMetrics {
    TrainingMetrics {
        accuracy,
        loss: 1.0 - accuracy,
        validation_accuracy: None,
    }
}

#[async_trait]
impl Trainable for ScriptedTrainer {
    async fn train(
        &self,
        weights: WeightVector,
        _epochs: u32,
        _hyperparameters: &Hyperparameters,
    ) -> Result<(WeightVector, TrainingMetrics)> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Self::run(&self.script, call, weights).await
    }

    async fn evaluate(
        &self,
        _weights: &WeightVector,
        _test_data: &DataHandle,
    ) -> Result<TrainingMetrics> {
        Ok(metrics(self.eval_accuracy))
    }
}
