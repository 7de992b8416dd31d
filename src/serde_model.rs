//! Network serialization/deserialization (feature: `serde`).
//!
//! This module defines a versioned on-disk format for a set-up [`NeuralNetwork`].
//!
//! Design notes:
//! - Internal `Layer`/`Parameter` structs are not serialized directly; the
//!   format is a separate set of plain structs.
//! - Deserialization validates widths, parameter lengths and finiteness.
//! - Dropout generator state is not stored. Loaded networks reseed their
//!   dropout masks from the snapshot's `dropout_seed`.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    Activation, DropoutFullyConnected, Error, FullyConnected, Layer, Loss, NeuralNetwork,
    Parameter, Result, Tensor,
};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNetwork {
    pub format_version: u32,
    pub input_width: usize,
    pub loss: SerializedLoss,
    /// Seeds the dropout generators of a loaded network.
    #[serde(default)]
    pub dropout_seed: u64,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedLoss {
    SoftmaxCrossEntropy { n_classes: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedLayer {
    Dropout { rate: f64 },
    Activation { activation: SerializedActivation },
    FullyConnected(SerializedDense),
    DropoutFullyConnected { rate: f64, dense: SerializedDense },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedDense {
    pub n_in: usize,
    pub n_out: usize,
    /// Row-major (n_in, n_out).
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub weights_decay: f64,
    #[serde(default)]
    pub bias_decay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedActivation {
    Tanh,
    Relu,
    LeakyRelu { alpha: f64 },
    Sigmoid,
    Identity,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::Tanh => SerializedActivation::Tanh,
            Activation::ReLU => SerializedActivation::Relu,
            Activation::LeakyReLU { alpha } => SerializedActivation::LeakyRelu { alpha },
            Activation::Sigmoid => SerializedActivation::Sigmoid,
            Activation::Identity => SerializedActivation::Identity,
        }
    }
}

impl SerializedActivation {
    fn into_activation(self) -> Activation {
        match self {
            SerializedActivation::Tanh => Activation::Tanh,
            SerializedActivation::Relu => Activation::ReLU,
            SerializedActivation::LeakyRelu { alpha } => Activation::LeakyReLU { alpha },
            SerializedActivation::Sigmoid => Activation::Sigmoid,
            SerializedActivation::Identity => Activation::Identity,
        }
    }
}

impl From<Loss> for SerializedLoss {
    fn from(value: Loss) -> Self {
        match value {
            Loss::SoftmaxCrossEntropy { n_classes } => {
                SerializedLoss::SoftmaxCrossEntropy { n_classes }
            }
        }
    }
}

impl SerializedLoss {
    fn into_loss(self) -> Loss {
        match self {
            SerializedLoss::SoftmaxCrossEntropy { n_classes } => {
                Loss::softmax_cross_entropy(n_classes)
            }
        }
    }
}

impl SerializedDense {
    fn from_layer(layer: &FullyConnected) -> Result<Self> {
        let (Some(n_in), Some(weights), Some(bias)) = (layer.n_in(), layer.weights(), layer.bias())
        else {
            return Err(Error::InvalidState(
                "cannot serialize a fully connected layer before setup".to_owned(),
            ));
        };
        Ok(Self {
            n_in,
            n_out: layer.n_out(),
            weights: weights.value().as_slice().to_vec(),
            bias: bias.value().as_slice().to_vec(),
            weights_decay: weights.weight_decay(),
            bias_decay: bias.weight_decay(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.n_in == 0 || self.n_out == 0 {
            return Err(Error::InvalidData(format!(
                "layer dims must be > 0, got n_in={} n_out={}",
                self.n_in, self.n_out
            )));
        }
        let expected_w = self
            .n_in
            .checked_mul(self.n_out)
            .ok_or_else(|| Error::InvalidData("layer weight shape overflow".to_owned()))?;
        if self.weights.len() != expected_w {
            return Err(Error::InvalidData(format!(
                "weights length {} does not match n_in * n_out ({} * {})",
                self.weights.len(),
                self.n_in,
                self.n_out
            )));
        }
        if self.bias.len() != self.n_out {
            return Err(Error::InvalidData(format!(
                "bias length {} does not match n_out {}",
                self.bias.len(),
                self.n_out
            )));
        }
        Ok(())
    }

    fn into_parameters(self) -> Result<(Parameter, Parameter)> {
        self.validate()?;
        let weights = Parameter::from_tensor(
            "weights",
            Tensor::from_vec(&[self.n_in, self.n_out], self.weights)?,
            self.weights_decay,
        )?;
        let bias = Parameter::from_tensor(
            "bias",
            Tensor::from_vec(&[self.n_out], self.bias)?,
            self.bias_decay,
        )?;
        Ok((weights, bias))
    }
}

impl TryFrom<&NeuralNetwork> for SerializedNetwork {
    type Error = Error;

    fn try_from(network: &NeuralNetwork) -> std::result::Result<Self, Self::Error> {
        let input_width = network.input_width().ok_or_else(|| {
            Error::InvalidState("cannot serialize a network before setup".to_owned())
        })?;

        let layers = network
            .layers()
            .iter()
            .map(|layer| {
                Ok(match layer {
                    Layer::Dropout(l) => SerializedLayer::Dropout { rate: l.rate() },
                    Layer::Activation(l) => SerializedLayer::Activation {
                        activation: l.activation().into(),
                    },
                    Layer::FullyConnected(l) => {
                        SerializedLayer::FullyConnected(SerializedDense::from_layer(l)?)
                    }
                    Layer::DropoutFullyConnected(l) => SerializedLayer::DropoutFullyConnected {
                        rate: l.rate(),
                        dense: SerializedDense::from_layer(l.dense())?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            input_width,
            loss: network.loss_fn().into(),
            dropout_seed: network.dropout_seed().unwrap_or_default(),
            layers,
        })
    }
}

impl SerializedNetwork {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }
        if self.input_width == 0 {
            return Err(Error::InvalidData("input_width must be > 0".to_owned()));
        }
        Ok(())
    }

    /// Rebuild a ready network, seeding every dropout mask from `dropout_seed`.
    pub fn into_network(self) -> Result<NeuralNetwork> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.dropout_seed);

        let mut width = self.input_width;
        let mut layers = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.into_iter().enumerate() {
            let layer = rebuild_layer(layer, width, &mut rng)
                .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;
            width = layer.output_width().unwrap_or(width);
            layers.push(layer);
        }

        NeuralNetwork::from_ready_layers(
            layers,
            self.loss.into_loss(),
            self.input_width,
            self.dropout_seed,
        )
    }
}

fn rebuild_layer(layer: SerializedLayer, width: usize, rng: &mut StdRng) -> Result<Layer> {
    let check_width = |dense: &SerializedDense| {
        if dense.n_in == width {
            Ok(())
        } else {
            Err(Error::InvalidData(format!(
                "n_in {} does not match previous width {width}",
                dense.n_in
            )))
        }
    };

    match layer {
        SerializedLayer::Dropout { rate } => {
            let mut l = Layer::dropout(rate)?;
            l.setup(width, rng)?;
            Ok(l)
        }
        SerializedLayer::Activation { activation } => {
            let mut l = Layer::activation(activation.into_activation())?;
            l.setup(width, rng)?;
            Ok(l)
        }
        SerializedLayer::FullyConnected(dense) => {
            check_width(&dense)?;
            let (weights, bias) = dense.into_parameters()?;
            Ok(FullyConnected::from_parameters(weights, bias)?.into())
        }
        SerializedLayer::DropoutFullyConnected { rate, dense } => {
            check_width(&dense)?;
            let (weights, bias) = dense.into_parameters()?;
            Ok(DropoutFullyConnected::from_parameters(weights, bias, rate, rng.r#gen())?.into())
        }
    }
}

impl TryFrom<SerializedNetwork> for NeuralNetwork {
    type Error = Error;

    fn try_from(value: SerializedNetwork) -> std::result::Result<Self, Self::Error> {
        value.into_network()
    }
}

impl NeuralNetwork {
    /// Serialize the network to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedNetwork::try_from(self)?;
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Serialize the network to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = SerializedNetwork::try_from(self)?;
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a network from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedNetwork = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the network to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))?;
        Ok(())
    }

    /// Load a network from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}
