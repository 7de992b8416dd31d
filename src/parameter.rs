//! Learnable parameters.
//!
//! A layer is declared with [`ParamConfig`]s (initializer + weight decay) and
//! turns them into [`Parameter`]s when the network is set up. From then on the
//! value persists for the whole run while the gradient buffer is overwritten by
//! every backward pass.

use rand::Rng;

use crate::{Error, Init, Result, Tensor};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamConfig {
    pub init: Init,
    /// L2 coefficient added to the gradient as `weight_decay * value`.
    pub weight_decay: f64,
}

impl ParamConfig {
    #[inline]
    pub fn new(init: Init) -> Self {
        Self {
            init,
            weight_decay: 0.0,
        }
    }

    #[inline]
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "weight_decay must be finite and >= 0, got {}",
                self.weight_decay
            )));
        }
        self.init.validate()
    }
}

impl Default for ParamConfig {
    fn default() -> Self {
        Self::new(Init::Xavier)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: &'static str,
    value: Tensor,
    grad: Tensor,
    weight_decay: f64,
}

impl Parameter {
    /// Allocate and initialize. The initializer runs exactly once, here.
    pub(crate) fn allocate<R: Rng + ?Sized>(
        name: &'static str,
        shape: &[usize],
        config: &ParamConfig,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;
        let values = config.init.fill(shape, rng)?;
        Ok(Self {
            name,
            value: Tensor::from_vec(shape, values)?,
            grad: Tensor::zeros(shape),
            weight_decay: config.weight_decay,
        })
    }

    /// Rebuild a parameter from stored values.
    pub(crate) fn from_tensor(
        name: &'static str,
        value: Tensor,
        weight_decay: f64,
    ) -> Result<Self> {
        if !(weight_decay.is_finite() && weight_decay >= 0.0) {
            return Err(Error::InvalidData(format!(
                "{name}: weight_decay must be finite and >= 0, got {weight_decay}"
            )));
        }
        if !value.is_finite() {
            return Err(Error::InvalidData(format!(
                "{name}: values must be finite"
            )));
        }
        let grad = Tensor::zeros(value.shape());
        Ok(Self {
            name,
            value,
            grad,
            weight_decay,
        })
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    #[inline]
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    #[inline]
    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    /// Gradient left by the most recent backward pass.
    #[inline]
    pub fn grad(&self) -> &Tensor {
        &self.grad
    }

    #[inline]
    pub(crate) fn grad_mut(&mut self) -> &mut Tensor {
        &mut self.grad
    }

    #[inline]
    pub fn weight_decay(&self) -> f64 {
        self.weight_decay
    }

    /// Split borrow used by the optimizer: `(value, grad)`.
    #[inline]
    pub(crate) fn value_and_grad_mut(&mut self) -> (&mut [f64], &[f64]) {
        (self.value.as_mut_slice(), self.grad.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn negative_weight_decay_is_rejected() {
        let cfg = ParamConfig::new(Init::Zeros).with_weight_decay(-1e-3);
        assert!(cfg.validate().unwrap_err().is_config());
    }

    #[test]
    fn allocation_initializes_value_and_zeroes_grad() {
        let mut rng = StdRng::seed_from_u64(0);
        let cfg = ParamConfig::new(Init::Constant { value: 0.25 }).with_weight_decay(1e-5);
        let p = Parameter::allocate("weights", &[3, 2], &cfg, &mut rng).unwrap();
        assert_eq!(p.shape(), &[3, 2]);
        assert!(p.value().as_slice().iter().all(|&v| v == 0.25));
        assert!(p.grad().as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(p.weight_decay(), 1e-5);
    }
}
