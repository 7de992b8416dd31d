//! A small feed-forward classifier trainer with dropout.
//!
//! `rust-dropnet` composes a network from a closed set of layers (dropout,
//! fully connected, dropout + fully connected, element-wise activations), ends
//! it in a softmax cross-entropy loss and trains it with mini-batch stochastic
//! gradient descent plus momentum and per-parameter weight decay.
//!
//! # Lifecycle
//!
//! 1. Build a [`NeuralNetwork`] from a list of [`Layer`]s and a [`Loss`].
//! 2. `setup(input_width, rng)` resolves every layer's width, allocates and
//!    initializes [`Parameter`]s and seeds each dropout layer's generator.
//!    Width mismatches are reported here.
//! 3. Train with [`StochasticGradientDescent`] over a [`SupervisedInput`].
//! 4. Evaluate with [`NeuralNetwork::error`] / [`NeuralNetwork::predict`]
//!    (inference mode: dropout is the identity).
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - Batches are row-major [`Tensor`]s of shape `(batch, width)`.
//! - Fully connected weights have shape `(n_in, n_out)`; `y = x · W + b`.
//! - Parameter gradients are overwritten by each backward pass.
//!
//! # Reproducibility
//!
//! Given the same seed, layer list and data, training is bit-for-bit
//! reproducible: initialization, dropout masks and shuffling all draw from
//! seeded [`rand::rngs::StdRng`] generators and the whole pipeline is
//! single-threaded.
//!
//! # Quick start
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use rust_dropnet::{
//!     Activation, ErrorRate, Layer, LearnRule, Loss, NeuralNetwork, StochasticGradientDescent,
//!     SupervisedInput, Validation,
//! };
//!
//! # fn main() -> rust_dropnet::Result<()> {
//! let rows = vec![
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ];
//! let train = SupervisedInput::from_rows(&rows, vec![0, 1, 1, 0], 2)?;
//!
//! let mut net = NeuralNetwork::new(
//!     vec![
//!         Layer::dropout_fully_connected(16, 0.1)?,
//!         Layer::activation(Activation::ReLU)?,
//!         Layer::fully_connected(2)?,
//!     ],
//!     Loss::softmax_cross_entropy(2),
//! )?;
//! net.setup_with_seed(2, 0)?;
//!
//! let sgd = StochasticGradientDescent::new(
//!     20,
//!     LearnRule::Momentum { learn_rate: 0.1, momentum: 0.9 },
//! )?;
//! let mut error_rate = ErrorRate;
//! let report = sgd.train(
//!     &mut net,
//!     &train,
//!     &mut StdRng::seed_from_u64(0),
//!     Some(Validation::new(&train, &mut error_rate)),
//! )?;
//! assert_eq!(report.epochs.len(), 20);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod data;
pub mod dense;
pub mod dropout;
pub mod error;
pub mod init;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod network;
pub mod optim;
pub mod parameter;
pub mod scaler;
pub mod tensor;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use data::{Batch, Batches, DatasetProvider, InMemoryDataset, SupervisedInput};
pub use dense::{DropoutFullyConnected, FullyConnected};
pub use dropout::Dropout;
pub use error::{Error, Result};
pub use init::Init;
pub use layer::{ActivationLayer, Layer, LayerKind};
pub use loss::Loss;
pub use network::NeuralNetwork;
pub use optim::{LearnRule, LearnRuleState};
pub use parameter::{ParamConfig, Parameter};
pub use scaler::StandardScaler;
pub use tensor::Tensor;
pub use train::{
    EpochReport, ErrorRate, FitReport, StochasticGradientDescent, TrainConfig, Validation,
    Validator,
};
