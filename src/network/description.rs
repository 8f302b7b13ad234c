//! Network-description input: the reader interface the engine consumes and
//! an in-memory dense implementation of it.

use serde::{Deserialize, Serialize};

use crate::types::{CegarError, Result};

/// Read-only view of a feed-forward ReLU network.
///
/// Layer 0 holds the inputs. Hidden layers apply a ReLU; the last layer is
/// linear.
pub trait NetworkDescription {
    /// Number of layers including input and output.
    fn number_of_layers(&self) -> usize;

    /// Neurons in `layer`.
    fn nodes_in_layer(&self, layer: usize) -> usize;

    /// Bias of neuron `index` in `layer`. Never queried for layer 0.
    fn bias(&self, layer: usize, index: usize) -> f64;

    /// Weight from neuron `src` of `layer - 1` to neuron `dst` of `layer`.
    fn weight(&self, layer: usize, dst: usize, src: usize) -> f64;

    /// `(min, max)` bounds of input `index`.
    fn input_bounds(&self, index: usize) -> (f64, f64);
}

/// Range of one network input.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRange {
    /// Lowest admissible value.
    pub min: f64,
    /// Highest admissible value.
    pub max: f64,
}

/// Weights and biases feeding one non-input layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenseLayer {
    /// `weights[dst][src]`.
    pub weights: Vec<Vec<f64>>,
    /// One bias per neuron.
    pub biases: Vec<f64>,
}

/// Fully connected network held in memory.
///
/// ```json
/// { "inputs": [{"min": 0, "max": 1}],
///   "layers": [{"weights": [[1.0]], "biases": [0.0]}] }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenseNetwork {
    /// Input ranges; their count is the width of layer 0.
    pub inputs: Vec<InputRange>,
    /// Hidden layers followed by the output layer.
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Builds a network, checking that the dimensions line up.
    pub fn new(inputs: Vec<InputRange>, layers: Vec<DenseLayer>) -> Result<Self> {
        let network = Self { inputs, layers };
        network.validate()?;
        Ok(network)
    }

    /// Parses and validates the JSON form.
    pub fn from_json(text: &str) -> Result<Self> {
        let network: Self = serde_json::from_str(text)?;
        network.validate()?;
        Ok(network)
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks dimensions and bounds.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(CegarError::InvalidArgument("network has no inputs".into()));
        }
        if self.layers.is_empty() {
            return Err(CegarError::InvalidArgument("network has no output layer".into()));
        }
        for (i, range) in self.inputs.iter().enumerate() {
            if range.min.is_nan() || range.max.is_nan() || range.min > range.max {
                return Err(CegarError::InvalidArgument(format!(
                    "input {i} has empty range [{}, {}]",
                    range.min, range.max
                )));
            }
        }
        let mut width = self.inputs.len();
        for (offset, layer) in self.layers.iter().enumerate() {
            let index = offset + 1;
            if layer.weights.is_empty() {
                return Err(CegarError::InvalidArgument(format!("layer {index} is empty")));
            }
            if layer.biases.len() != layer.weights.len() {
                return Err(CegarError::InvalidArgument(format!(
                    "layer {index} has {} biases for {} neurons",
                    layer.biases.len(),
                    layer.weights.len()
                )));
            }
            if let Some(dst) = layer.weights.iter().position(|row| row.len() != width) {
                return Err(CegarError::InvalidArgument(format!(
                    "layer {index} neuron {dst} expects {width} inputs"
                )));
            }
            width = layer.weights.len();
        }
        Ok(())
    }

    /// Forward pass: ReLU on hidden layers, linear output.
    pub fn evaluate(&self, inputs: &[f64]) -> Result<Vec<f64>> {
        if inputs.len() != self.inputs.len() {
            return Err(CegarError::InvalidArgument(format!(
                "expected {} inputs, got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }
        let last = self.layers.len().saturating_sub(1);
        let mut values = inputs.to_vec();
        for (offset, layer) in self.layers.iter().enumerate() {
            values = layer
                .weights
                .iter()
                .zip(&layer.biases)
                .map(|(row, bias)| {
                    let sum: f64 = row.iter().zip(&values).map(|(w, v)| w * v).sum::<f64>() + bias;
                    if offset == last {
                        sum
                    } else {
                        sum.max(0.0)
                    }
                })
                .collect();
        }
        Ok(values)
    }
}

impl NetworkDescription for DenseNetwork {
    fn number_of_layers(&self) -> usize {
        self.layers.len() + 1
    }

    fn nodes_in_layer(&self, layer: usize) -> usize {
        match layer {
            0 => self.inputs.len(),
            n => self.layers.get(n - 1).map_or(0, |l| l.weights.len()),
        }
    }

    fn bias(&self, layer: usize, index: usize) -> f64 {
        layer
            .checked_sub(1)
            .and_then(|l| self.layers.get(l))
            .and_then(|l| l.biases.get(index))
            .copied()
            .unwrap_or(0.0)
    }

    fn weight(&self, layer: usize, dst: usize, src: usize) -> f64 {
        layer
            .checked_sub(1)
            .and_then(|l| self.layers.get(l))
            .and_then(|l| l.weights.get(dst))
            .and_then(|row| row.get(src))
            .copied()
            .unwrap_or(0.0)
    }

    fn input_bounds(&self, index: usize) -> (f64, f64) {
        self.inputs
            .get(index)
            .map_or((0.0, 0.0), |range| (range.min, range.max))
    }
}
