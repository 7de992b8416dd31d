//! Inverted dropout.
//!
//! In training mode every element is kept with probability `1 - rate` and
//! scaled by `1 / (1 - rate)`, so the expected activation is unchanged; dropped
//! elements become zero. The exact mask drawn in `forward` is cached and reused
//! by `backward`. Inference mode is an identity and caches nothing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Error, Result, Tensor};

/// Mask state shared by [`Dropout`] and [`crate::DropoutFullyConnected`].
#[derive(Debug, Clone)]
pub(crate) struct DropoutMask {
    rate: f64,
    scale: f64,
    rng: Option<StdRng>,
    /// Per-element factor (`0` or `scale`) from the last training forward.
    mask: Vec<f64>,
    ready_for_backward: bool,
}

impl DropoutMask {
    pub(crate) fn new(rate: f64) -> Result<Self> {
        if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be in [0, 1), got {rate}"
            )));
        }
        Ok(Self {
            rate,
            scale: 1.0 / (1.0 - rate),
            rng: None,
            mask: Vec::new(),
            ready_for_backward: false,
        })
    }

    #[inline]
    pub(crate) fn rate(&self) -> f64 {
        self.rate
    }

    /// Give this mask its own generator. Called once, at network setup.
    pub(crate) fn seed(&mut self, seed: u64) {
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    /// Writes `input ⊙ mask` (training) or `input` (inference) into `out`.
    pub(crate) fn forward(&mut self, input: &[f64], out: &mut [f64], training: bool) -> Result<()> {
        debug_assert_eq!(input.len(), out.len());

        if !training || self.rate == 0.0 {
            out.copy_from_slice(input);
            self.mask.clear();
            self.ready_for_backward = training;
            return Ok(());
        }

        let rng = self
            .rng
            .as_mut()
            .ok_or_else(|| Error::InvalidState("dropout used before setup".to_owned()))?;

        self.mask.clear();
        self.mask.reserve(input.len());
        for (o, &x) in out.iter_mut().zip(input) {
            let m = if rng.r#gen::<f64>() < self.rate {
                0.0
            } else {
                self.scale
            };
            self.mask.push(m);
            *o = x * m;
        }
        self.ready_for_backward = true;
        Ok(())
    }

    /// Applies the cached mask (and rescale) to an incoming gradient.
    pub(crate) fn backward(&self, d_output: &[f64], d_input: &mut [f64]) -> Result<()> {
        debug_assert_eq!(d_output.len(), d_input.len());

        if !self.ready_for_backward {
            return Err(Error::InvalidState(
                "dropout backward requires a preceding training-mode forward".to_owned(),
            ));
        }
        if self.mask.is_empty() {
            // rate == 0: the forward pass was an identity.
            d_input.copy_from_slice(d_output);
            return Ok(());
        }
        if self.mask.len() != d_output.len() {
            return Err(Error::InvalidData(format!(
                "gradient has {} elements, cached dropout mask has {}",
                d_output.len(),
                self.mask.len()
            )));
        }
        for ((dx, &dy), &m) in d_input.iter_mut().zip(d_output).zip(&self.mask) {
            *dx = dy * m;
        }
        Ok(())
    }

    /// The mask used by the last training forward (empty when it was an identity).
    #[inline]
    pub(crate) fn mask(&self) -> &[f64] {
        &self.mask
    }
}

/// Parameter-free dropout layer.
#[derive(Debug, Clone)]
pub struct Dropout {
    mask: DropoutMask,
    width: Option<usize>,
}

impl Dropout {
    pub fn new(rate: f64) -> Result<Self> {
        Ok(Self {
            mask: DropoutMask::new(rate)?,
            width: None,
        })
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.mask.rate()
    }

    /// Mask from the last training forward; empty when none was drawn.
    #[inline]
    pub fn last_mask(&self) -> &[f64] {
        self.mask.mask()
    }

    pub(crate) fn setup<R: Rng + ?Sized>(
        &mut self,
        input_width: usize,
        rng: &mut R,
    ) -> Result<usize> {
        self.mask.seed(rng.r#gen());
        self.width = Some(input_width);
        Ok(input_width)
    }

    #[inline]
    pub(crate) fn output_width(&self) -> Option<usize> {
        self.width
    }

    pub(crate) fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        let mut out = Tensor::zeros(input.shape());
        self.mask
            .forward(input.as_slice(), out.as_mut_slice(), training)?;
        Ok(out)
    }

    pub(crate) fn backward(&mut self, d_output: &Tensor) -> Result<Tensor> {
        let mut d_input = Tensor::zeros(d_output.shape());
        self.mask
            .backward(d_output.as_slice(), d_input.as_mut_slice())?;
        Ok(d_input)
    }
}
