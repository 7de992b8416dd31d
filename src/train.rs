//! The mini-batch training loop.
//!
//! [`StochasticGradientDescent::train`] runs up to `max_epochs` passes over a
//! [`SupervisedInput`]. Every epoch draws a fresh shuffle, performs one
//! forward/backward/update per mini-batch and then, if a [`Validation`] is
//! supplied, scores the network on held-out data in inference mode.
//!
//! Training aborts with the first error (including [`Error::NonFinite`]); the
//! caller may stop it cleanly at an epoch boundary by returning
//! [`ControlFlow::Break`] from the hook passed to
//! [`StochasticGradientDescent::train_with_hook`].

use std::ops::ControlFlow;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::{Error, LearnRule, NeuralNetwork, Result, SupervisedInput, Tensor};

/// Scores a network on held-out data. Lower is better.
pub trait Validator {
    fn validate(&mut self, network: &mut NeuralNetwork, input: &SupervisedInput) -> Result<f64>;
}

/// Classification error rate, in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorRate;

impl Validator for ErrorRate {
    fn validate(&mut self, network: &mut NeuralNetwork, input: &SupervisedInput) -> Result<f64> {
        network.error(input)
    }
}

impl<F> Validator for F
where
    F: FnMut(&mut NeuralNetwork, &SupervisedInput) -> Result<f64>,
{
    fn validate(&mut self, network: &mut NeuralNetwork, input: &SupervisedInput) -> Result<f64> {
        self(network, input)
    }
}

/// Held-out data plus the score computed on it after every epoch.
pub struct Validation<'a> {
    pub input: &'a SupervisedInput,
    pub validator: &'a mut dyn Validator,
}

impl<'a> Validation<'a> {
    pub fn new(input: &'a SupervisedInput, validator: &'a mut dyn Validator) -> Self {
        Self { input, validator }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based.
    pub epoch: usize,
    /// Mean mini-batch loss over the epoch (training mode, dropout active).
    pub train_loss: f64,
    pub validation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
    /// True when the hook stopped training before `max_epochs`.
    pub stopped_early: bool,
}

impl FitReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.train_loss)
    }

    pub fn final_validation(&self) -> Option<f64> {
        self.epochs.last().and_then(|e| e.validation)
    }
}

/// Serializable training configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainConfig {
    pub max_epochs: usize,
    pub batch_size: usize,
    pub learn_rule: LearnRule,
    /// Seeds parameter initialization, dropout masks and shuffling.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_epochs: 50,
            batch_size: 128,
            learn_rule: LearnRule::default(),
            seed: 0,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_epochs == 0 {
            return Err(Error::InvalidConfig("max_epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        self.learn_rule.validate()
    }

    /// The epoch loop for `max_epochs` and `learn_rule`.
    ///
    /// `batch_size` and `seed` reach training through [`TrainConfig::input`]
    /// and [`TrainConfig::rng`].
    pub fn optimizer(&self) -> Result<StochasticGradientDescent> {
        self.validate()?;
        StochasticGradientDescent::new(self.max_epochs, self.learn_rule)
    }

    /// Training input batched by `batch_size`.
    pub fn input(&self, features: Tensor, labels: Vec<usize>) -> Result<SupervisedInput> {
        self.validate()?;
        SupervisedInput::new(features, labels, self.batch_size)
    }

    /// Generator seeded from `seed`, for setup, dataset splits and shuffling.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticGradientDescent {
    max_epochs: usize,
    learn_rule: LearnRule,
}

impl StochasticGradientDescent {
    pub fn new(max_epochs: usize, learn_rule: LearnRule) -> Result<Self> {
        if max_epochs == 0 {
            return Err(Error::InvalidConfig("max_epochs must be > 0".to_owned()));
        }
        learn_rule.validate()?;
        Ok(Self {
            max_epochs,
            learn_rule,
        })
    }

    #[inline]
    pub fn max_epochs(&self) -> usize {
        self.max_epochs
    }

    #[inline]
    pub fn learn_rule(&self) -> LearnRule {
        self.learn_rule
    }

    /// Train for `max_epochs` epochs.
    pub fn train<R: Rng + ?Sized>(
        &self,
        network: &mut NeuralNetwork,
        input: &SupervisedInput,
        rng: &mut R,
        validation: Option<Validation<'_>>,
    ) -> Result<FitReport> {
        self.train_with_hook(network, input, rng, validation, |_| ControlFlow::Continue(()))
    }

    /// Train, calling `on_epoch` after every epoch. Returning
    /// `ControlFlow::Break(())` stops after the current epoch.
    pub fn train_with_hook<R, F>(
        &self,
        network: &mut NeuralNetwork,
        input: &SupervisedInput,
        rng: &mut R,
        mut validation: Option<Validation<'_>>,
        mut on_epoch: F,
    ) -> Result<FitReport>
    where
        R: Rng + ?Sized,
        F: FnMut(&EpochReport) -> ControlFlow<()>,
    {
        check_input(network, input, "train")?;
        if let Some(v) = &validation {
            check_input(network, v.input, "validation")?;
        }

        let mut state = self.learn_rule.state(network)?;
        let mut epochs = Vec::with_capacity(self.max_epochs);

        for epoch in 1..=self.max_epochs {
            let mut total = 0.0_f64;
            let mut n_batches = 0_usize;
            for batch in input.epoch_batches(rng) {
                total += network.train_step(&batch)?;
                state.step(network)?;
                n_batches += 1;
            }
            let train_loss = total / n_batches as f64;

            let score = match validation.as_mut() {
                Some(v) => Some(v.validator.validate(network, v.input)?),
                None => None,
            };

            info!(epoch, train_loss, validation = ?score, "epoch finished");
            let report = EpochReport {
                epoch,
                train_loss,
                validation: score,
            };
            epochs.push(report);

            if on_epoch(&report).is_break() {
                if epoch < self.max_epochs {
                    warn!(epoch, max_epochs = self.max_epochs, "training stopped early");
                    return Ok(FitReport {
                        epochs,
                        stopped_early: true,
                    });
                }
                break;
            }
        }

        Ok(FitReport {
            epochs,
            stopped_early: false,
        })
    }
}

fn check_input(network: &NeuralNetwork, input: &SupervisedInput, what: &str) -> Result<()> {
    let width = network
        .input_width()
        .ok_or_else(|| Error::InvalidState("network must be set up before training".to_owned()))?;
    if input.n_features() != width {
        return Err(Error::InvalidData(format!(
            "{what} input has {} features, network expects {width}",
            input.n_features()
        )));
    }
    let n_classes = network.loss_fn().n_classes();
    if input.max_label() >= n_classes {
        return Err(Error::InvalidData(format!(
            "{what} label {} out of range for {n_classes} classes",
            input.max_label()
        )));
    }
    Ok(())
}
