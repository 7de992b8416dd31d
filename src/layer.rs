//! The closed set of layer variants a network is composed of.
//!
//! Every variant follows the same contract:
//! - `setup(input_width, rng)` resolves shapes, allocates parameters and seeds
//!   dropout generators. Called once, by the network.
//! - `forward(input, training)` maps `(batch, in)` to `(batch, out)`. Training
//!   mode caches what `backward` needs; inference mode caches nothing.
//! - `backward(d_output)` returns `d_input` and overwrites the gradients of the
//!   layer's parameters.

use rand::Rng;

use crate::{
    Activation, Dropout, DropoutFullyConnected, Error, FullyConnected, Parameter, Result, Tensor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Dropout,
    Activation,
    FullyConnected,
    DropoutFullyConnected,
}

impl LayerKind {
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Dropout => "dropout",
            LayerKind::Activation => "activation",
            LayerKind::FullyConnected => "fully_connected",
            LayerKind::DropoutFullyConnected => "dropout_fully_connected",
        }
    }
}

/// Element-wise nonlinearity; caches its output for the derivative.
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    activation: Activation,
    width: Option<usize>,
    output: Option<Tensor>,
}

impl ActivationLayer {
    pub fn new(activation: Activation) -> Result<Self> {
        activation.validate()?;
        Ok(Self {
            activation,
            width: None,
            output: None,
        })
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn forward(&mut self, input: &Tensor, training: bool) -> Tensor {
        let mut out = Tensor::zeros(input.shape());
        self.activation.apply(input.as_slice(), out.as_mut_slice());
        self.output = training.then(|| out.clone());
        out
    }

    fn backward(&mut self, d_output: &Tensor) -> Result<Tensor> {
        let output = self.output.as_ref().ok_or_else(|| {
            Error::InvalidState(
                "activation backward requires a preceding training-mode forward".to_owned(),
            )
        })?;
        if output.shape() != d_output.shape() {
            return Err(Error::InvalidData(format!(
                "activation backward expects gradient of shape {:?}, got {:?}",
                output.shape(),
                d_output.shape()
            )));
        }
        let mut d_input = Tensor::zeros(d_output.shape());
        self.activation
            .backprop(output.as_slice(), d_output.as_slice(), d_input.as_mut_slice());
        Ok(d_input)
    }
}

#[derive(Debug, Clone)]
pub enum Layer {
    Dropout(Dropout),
    Activation(ActivationLayer),
    FullyConnected(FullyConnected),
    DropoutFullyConnected(DropoutFullyConnected),
}

impl Layer {
    pub fn dropout(rate: f64) -> Result<Self> {
        Ok(Layer::Dropout(Dropout::new(rate)?))
    }

    pub fn activation(activation: Activation) -> Result<Self> {
        Ok(Layer::Activation(ActivationLayer::new(activation)?))
    }

    pub fn fully_connected(n_out: usize) -> Result<Self> {
        Ok(Layer::FullyConnected(FullyConnected::new(n_out)?))
    }

    pub fn dropout_fully_connected(n_out: usize, rate: f64) -> Result<Self> {
        Ok(Layer::DropoutFullyConnected(DropoutFullyConnected::new(
            n_out, rate,
        )?))
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Dropout(_) => LayerKind::Dropout,
            Layer::Activation(_) => LayerKind::Activation,
            Layer::FullyConnected(_) => LayerKind::FullyConnected,
            Layer::DropoutFullyConnected(_) => LayerKind::DropoutFullyConnected,
        }
    }

    /// Whether this layer owns a learnable weight matrix.
    #[inline]
    pub fn has_weights(&self) -> bool {
        matches!(
            self,
            Layer::FullyConnected(_) | Layer::DropoutFullyConnected(_)
        )
    }

    /// The weight matrix `(n_in, n_out)`, if this layer has one and is set up.
    pub fn weights(&self) -> Option<&Parameter> {
        match self {
            Layer::FullyConnected(l) => l.weights(),
            Layer::DropoutFullyConnected(l) => l.dense().weights(),
            Layer::Dropout(_) | Layer::Activation(_) => None,
        }
    }

    /// Output width once set up.
    pub fn output_width(&self) -> Option<usize> {
        match self {
            Layer::Dropout(l) => l.output_width(),
            Layer::Activation(l) => l.width,
            Layer::FullyConnected(l) => l.output_width(),
            Layer::DropoutFullyConnected(l) => l.output_width(),
        }
    }

    /// Resolve shapes and allocate parameters. Returns the output width.
    pub fn setup<R: Rng + ?Sized>(&mut self, input_width: usize, rng: &mut R) -> Result<usize> {
        match self {
            Layer::Dropout(l) => l.setup(input_width, rng),
            Layer::Activation(l) => {
                l.width = Some(input_width);
                Ok(input_width)
            }
            Layer::FullyConnected(l) => l.setup(input_width, rng),
            Layer::DropoutFullyConnected(l) => l.setup(input_width, rng),
        }
    }

    pub fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        match self {
            Layer::Dropout(l) => l.forward(input, training),
            Layer::Activation(l) => Ok(l.forward(input, training)),
            Layer::FullyConnected(l) => l.forward(input, training),
            Layer::DropoutFullyConnected(l) => l.forward(input, training),
        }
    }

    pub fn backward(&mut self, d_output: &Tensor) -> Result<Tensor> {
        match self {
            Layer::Dropout(l) => l.backward(d_output),
            Layer::Activation(l) => l.backward(d_output),
            Layer::FullyConnected(l) => l.backward(d_output),
            Layer::DropoutFullyConnected(l) => l.backward(d_output),
        }
    }

    /// Owned parameters, empty for stateless layers.
    pub fn parameters(&self) -> &[Parameter] {
        match self {
            Layer::Dropout(_) | Layer::Activation(_) => &[],
            Layer::FullyConnected(l) => l.params(),
            Layer::DropoutFullyConnected(l) => l.params(),
        }
    }

    pub fn parameters_mut(&mut self) -> &mut [Parameter] {
        match self {
            Layer::Dropout(_) | Layer::Activation(_) => &mut [],
            Layer::FullyConnected(l) => l.params_mut(),
            Layer::DropoutFullyConnected(l) => l.params_mut(),
        }
    }
}

impl From<Dropout> for Layer {
    fn from(value: Dropout) -> Self {
        Layer::Dropout(value)
    }
}

impl From<ActivationLayer> for Layer {
    fn from(value: ActivationLayer) -> Self {
        Layer::Activation(value)
    }
}

impl From<FullyConnected> for Layer {
    fn from(value: FullyConnected) -> Self {
        Layer::FullyConnected(value)
    }
}

impl From<DropoutFullyConnected> for Layer {
    fn from(value: DropoutFullyConnected) -> Self {
        Layer::DropoutFullyConnected(value)
    }
}
