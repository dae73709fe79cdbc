//! Model parameter containers.
//!
//! A [`WeightVector`] is an ordered list of dense tensors, one per trainable
//! layer. Aggregation only ever combines vectors of identical structure.

use crate::core::{sha3_256_multi, Error, Hash256, Result};
use serde::{Deserialize, Serialize};

/// A dense f32 tensor with a fixed shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Dimensions, outermost first
    shape: Vec<usize>,
    /// Row-major values
    values: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that the value count matches the shape.
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(Error::InvalidTensor(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Create a zero-filled tensor.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            values: vec![0.0; len],
        }
    }

    /// Create a one-dimensional tensor.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Create a single-value tensor of shape `[1]`.
    pub fn scalar(value: f32) -> Self {
        Self::from_vec(vec![value])
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Number of scalar values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The trainable parameters of a model, one tensor per layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    layers: Vec<Tensor>,
}

impl WeightVector {
    /// Create from layers.
    pub fn new(layers: Vec<Tensor>) -> Self {
        Self { layers }
    }

    /// Create a zero-filled vector with the same structure as `other`.
    pub fn zeros_like(other: &WeightVector) -> Self {
        Self {
            layers: other
                .layers
                .iter()
                .map(|l| Tensor::zeros(l.shape.clone()))
                .collect(),
        }
    }

    pub fn layers(&self) -> &[Tensor] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Tensor] {
        &mut self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Shapes of every layer, in order.
    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.layers.iter().map(|l| l.shape.clone()).collect()
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Tensor::len).sum()
    }

    /// Check that `other` has the same layer count and per-layer shapes.
    pub fn ensure_same_shape(&self, other: &WeightVector) -> Result<()> {
        if self.layers.len() != other.layers.len() {
            return Err(Error::ShapeMismatch(format!(
                "expected {} layers, got {}",
                self.layers.len(),
                other.layers.len()
            )));
        }

        for (index, (ours, theirs)) in self.layers.iter().zip(&other.layers).enumerate() {
            if ours.shape != theirs.shape || ours.values.len() != theirs.values.len() {
                return Err(Error::ShapeMismatch(format!(
                    "layer {}: expected shape {:?}, got {:?}",
                    index, ours.shape, theirs.shape
                )));
            }
        }

        Ok(())
    }

    /// Whether every value is finite.
    pub fn is_finite(&self) -> bool {
        self.layers
            .iter()
            .all(|l| l.values.iter().all(|v| v.is_finite()))
    }

    /// SHA3-256 over shapes and little-endian values.
    pub fn digest(&self) -> Hash256 {
        let mut bytes = Vec::with_capacity(self.parameter_count() * 4 + self.layers.len() * 16);
        for layer in &self.layers {
            bytes.extend_from_slice(&(layer.shape.len() as u64).to_le_bytes());
            for dim in &layer.shape {
                bytes.extend_from_slice(&(*dim as u64).to_le_bytes());
            }
            for value in &layer.values {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        sha3_256_multi(&[&bytes])
    }
}
