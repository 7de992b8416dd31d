//! Network orchestration.
//!
//! A [`NeuralNetwork`] is an ordered stack of [`Layer`]s ending in a [`Loss`].
//! It starts unconfigured; `setup(input_width, rng)` resolves every width,
//! allocates parameters and seeds dropout generators exactly once. Shape errors
//! surface there, never during training.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error};

use crate::{Batch, Error, Layer, Loss, Parameter, Result, SupervisedInput, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unconfigured,
    Ready {
        input_width: usize,
        dropout_seed: u64,
    },
}

#[derive(Debug, Clone)]
pub struct NeuralNetwork {
    layers: Vec<Layer>,
    loss: Loss,
    state: State,
    /// Set by a training-mode forward, cleared by inference.
    backward_ready: bool,
}

impl NeuralNetwork {
    pub fn new(layers: Vec<Layer>, loss: Loss) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one layer".to_owned(),
            ));
        }
        loss.validate()?;
        Ok(Self {
            layers,
            loss,
            state: State::Unconfigured,
            backward_ready: false,
        })
    }

    /// Assemble a network whose layers are already set up (used when loading).
    pub(crate) fn from_ready_layers(
        layers: Vec<Layer>,
        loss: Loss,
        input_width: usize,
        dropout_seed: u64,
    ) -> Result<Self> {
        let mut net = Self::new(layers, loss)?;
        let mut width = input_width;
        for (idx, layer) in net.layers.iter().enumerate() {
            width = layer.output_width().ok_or_else(|| {
                Error::InvalidData(format!("layer {idx} has no resolved shape"))
            })?;
        }
        if width != loss.n_classes() {
            return Err(Error::InvalidData(format!(
                "network output width {width} does not match loss class count {}",
                loss.n_classes()
            )));
        }
        net.state = State::Ready {
            input_width,
            dropout_seed,
        };
        Ok(net)
    }

    /// Resolve shapes and allocate parameters using a deterministic seed.
    pub fn setup_with_seed(&mut self, input_width: usize, seed: u64) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.setup(input_width, &mut rng)
    }

    /// Resolve shapes and allocate parameters.
    ///
    /// Irreversible: a second call is an error.
    pub fn setup<R: Rng + ?Sized>(&mut self, input_width: usize, rng: &mut R) -> Result<()> {
        if let State::Ready { .. } = self.state {
            return Err(Error::InvalidState("network is already set up".to_owned()));
        }
        if input_width == 0 {
            return Err(Error::InvalidConfig("input width must be > 0".to_owned()));
        }

        let mut width = input_width;
        for (idx, layer) in self.layers.iter_mut().enumerate() {
            let out = layer.setup(width, rng).map_err(|e| match e {
                Error::InvalidConfig(msg) => Error::InvalidConfig(format!(
                    "layer {idx} ({}): {msg}",
                    layer_kind_name(layer)
                )),
                other => other,
            })?;
            debug!(
                layer = idx,
                kind = layer_kind_name(layer),
                input_width = width,
                output_width = out,
                "layer set up"
            );
            width = out;
        }

        if width != self.loss.n_classes() {
            return Err(Error::InvalidConfig(format!(
                "network output width {width} does not match loss class count {}",
                self.loss.n_classes()
            )));
        }

        // Recorded so a saved network reloads with its own mask stream.
        let dropout_seed: u64 = rng.r#gen();
        self.state = State::Ready {
            input_width,
            dropout_seed,
        };
        debug!(
            input_width,
            layers = self.layers.len(),
            parameters = self.num_parameters(),
            "network ready"
        );
        Ok(())
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    /// Input width once set up.
    #[inline]
    pub fn input_width(&self) -> Option<usize> {
        match self.state {
            State::Ready { input_width, .. } => Some(input_width),
            State::Unconfigured => None,
        }
    }

    /// Seed drawn at setup (or read from a snapshot) for reseeding dropout masks.
    #[inline]
    pub fn dropout_seed(&self) -> Option<u64> {
        match self.state {
            State::Ready { dropout_seed, .. } => Some(dropout_seed),
            State::Unconfigured => None,
        }
    }

    #[inline]
    pub fn loss_fn(&self) -> Loss {
        self.loss
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.layers.iter().flat_map(|l| l.parameters().iter())
    }

    pub fn parameters_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.parameters_mut().iter_mut())
    }

    /// Total number of learnable scalars.
    pub fn num_parameters(&self) -> usize {
        self.parameters().map(Parameter::len).sum()
    }

    /// Weights of the first layer that has them (e.g. for visualization).
    pub fn first_weights(&self) -> Option<&Parameter> {
        self.layers
            .iter()
            .find(|l| l.has_weights())
            .and_then(Layer::weights)
    }

    fn ready_input_width(&self) -> Result<usize> {
        self.input_width()
            .ok_or_else(|| Error::InvalidState("network used before setup".to_owned()))
    }

    /// Run every layer in order. `training = false` disables dropout.
    pub fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        let width = self.ready_input_width()?;
        if input.shape().len() != 2 || input.row_width() != width {
            return Err(Error::InvalidData(format!(
                "network expects (batch, {width}) input, got {:?}",
                input.shape()
            )));
        }
        if input.rows() == 0 {
            return Err(Error::InvalidData("batch must not be empty".to_owned()));
        }

        self.backward_ready = false;
        let mut x = self.layers[0].forward(input, training)?;
        for layer in &mut self.layers[1..] {
            x = layer.forward(&x, training)?;
        }
        self.backward_ready = training;
        Ok(x)
    }

    /// Run every layer's backward in reverse, overwriting parameter gradients.
    ///
    /// Fails with [`Error::NonFinite`] naming the first layer/parameter whose
    /// gradient contains NaN or infinity.
    pub fn backward(&mut self, loss_gradient: &Tensor) -> Result<Tensor> {
        self.ready_input_width()?;
        if !self.backward_ready {
            return Err(Error::InvalidState(
                "backward requires a preceding training-mode forward".to_owned(),
            ));
        }

        let mut grad = loss_gradient.clone();
        for (idx, layer) in self.layers.iter_mut().enumerate().rev() {
            grad = layer.backward(&grad)?;

            for p in layer.parameters() {
                if !p.grad().is_finite() {
                    return Err(non_finite(format!(
                        "layer {idx} ({}) {} gradient",
                        layer_kind_name(layer),
                        p.name()
                    )));
                }
            }
            if !grad.is_finite() {
                return Err(non_finite(format!(
                    "layer {idx} ({}) input gradient",
                    layer_kind_name(layer)
                )));
            }
        }
        Ok(grad)
    }

    /// One forward → loss → backward pass on a training batch. Returns the loss.
    pub fn train_step(&mut self, batch: &Batch) -> Result<f64> {
        let scores = self.forward(&batch.x, true)?;
        let mut d_scores = Tensor::zeros(scores.shape());
        let loss = self.loss.backward(&scores, &batch.y, &mut d_scores)?;
        if !loss.is_finite() {
            return Err(non_finite("loss".to_owned()));
        }
        self.backward(&d_scores)?;
        Ok(loss)
    }

    /// Predicted class for every example, in order.
    pub fn predict(&mut self, input: &SupervisedInput) -> Result<Vec<usize>> {
        let mut out = Vec::with_capacity(input.len());
        for batch in input.batches() {
            let scores = self.forward(&batch.x, false)?;
            out.extend(self.loss.predict(&scores)?);
        }
        Ok(out)
    }

    /// Fraction of misclassified examples, in `[0, 1]`.
    pub fn error(&mut self, input: &SupervisedInput) -> Result<f64> {
        let mut wrong = 0_usize;
        for batch in input.batches() {
            let scores = self.forward(&batch.x, false)?;
            let predicted = self.loss.predict(&scores)?;
            wrong += predicted
                .iter()
                .zip(&batch.y)
                .filter(|(p, y)| p != y)
                .count();
        }
        Ok(wrong as f64 / input.len() as f64)
    }

    /// Mean loss over an evaluation set (inference mode).
    pub fn loss(&mut self, input: &SupervisedInput) -> Result<f64> {
        let mut total = 0.0_f64;
        for batch in input.batches() {
            let scores = self.forward(&batch.x, false)?;
            total += self.loss.forward(&scores, &batch.y)? * batch.len() as f64;
        }
        Ok(total / input.len() as f64)
    }
}

fn layer_kind_name(layer: &Layer) -> &'static str {
    layer.kind().name()
}

fn non_finite(location: String) -> Error {
    error!(%location, "non-finite value, aborting");
    Error::NonFinite { location }
}
