//! Fully-connected layers.
//!
//! Weights have shape `(n_in, n_out)` (row-major) and biases `(n_out,)`, so a
//! batch `x` of shape `(batch, n_in)` maps to `x · W + b`.
//!
//! Backward uses overwrite semantics:
//! - `weights.grad = xᵀ · d_out`
//! - `bias.grad = column_sum(d_out)`
//! - returns `d_out · Wᵀ`
//!
//! No batch normalization happens here. The loss gradient is already divided
//! by the batch size and flows through unchanged.

use rand::Rng;

use crate::dropout::DropoutMask;
use crate::{Error, Init, ParamConfig, Parameter, Result, Tensor, matmul};

const WEIGHTS: usize = 0;
const BIAS: usize = 1;

#[derive(Debug, Clone)]
pub struct FullyConnected {
    n_out: usize,
    declared_n_in: Option<usize>,
    weights_config: ParamConfig,
    bias_config: ParamConfig,
    n_in: Option<usize>,
    /// `[weights, bias]` once set up.
    params: Vec<Parameter>,
    /// Input of the last training forward.
    input: Option<Tensor>,
}

impl FullyConnected {
    pub fn new(n_out: usize) -> Result<Self> {
        if n_out == 0 {
            return Err(Error::InvalidConfig(
                "fully connected n_out must be > 0".to_owned(),
            ));
        }
        Ok(Self {
            n_out,
            declared_n_in: None,
            weights_config: ParamConfig::new(Init::Xavier),
            bias_config: ParamConfig::new(Init::Zeros),
            n_in: None,
            params: Vec::new(),
            input: None,
        })
    }

    pub fn with_weights(mut self, config: ParamConfig) -> Self {
        self.weights_config = config;
        self
    }

    pub fn with_bias(mut self, config: ParamConfig) -> Self {
        self.bias_config = config;
        self
    }

    /// Declare the expected input width; checked against the previous layer at setup.
    pub fn with_input_width(mut self, n_in: usize) -> Self {
        self.declared_n_in = Some(n_in);
        self
    }

    /// Rebuild an already set-up layer from stored parameters.
    pub(crate) fn from_parameters(weights: Parameter, bias: Parameter) -> Result<Self> {
        let (n_in, n_out) = match weights.shape() {
            [n_in, n_out] if *n_in > 0 && *n_out > 0 => (*n_in, *n_out),
            shape => {
                return Err(Error::InvalidData(format!(
                    "weights must have shape (n_in, n_out), got {shape:?}"
                )));
            }
        };
        if bias.shape() != [n_out] {
            return Err(Error::InvalidData(format!(
                "bias shape {:?} does not match n_out {n_out}",
                bias.shape()
            )));
        }
        let mut layer = Self::new(n_out)?;
        layer.weights_config.weight_decay = weights.weight_decay();
        layer.bias_config.weight_decay = bias.weight_decay();
        layer.n_in = Some(n_in);
        layer.params = vec![weights, bias];
        Ok(layer)
    }

    #[inline]
    pub fn n_out(&self) -> usize {
        self.n_out
    }

    /// Resolved input width (`None` before setup).
    #[inline]
    pub fn n_in(&self) -> Option<usize> {
        self.n_in
    }

    #[inline]
    pub fn weights(&self) -> Option<&Parameter> {
        self.params.get(WEIGHTS)
    }

    #[inline]
    pub fn bias(&self) -> Option<&Parameter> {
        self.params.get(BIAS)
    }

    #[inline]
    pub(crate) fn params(&self) -> &[Parameter] {
        &self.params
    }

    #[inline]
    pub(crate) fn params_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    pub(crate) fn setup<R: Rng + ?Sized>(
        &mut self,
        input_width: usize,
        rng: &mut R,
    ) -> Result<usize> {
        if let Some(declared) = self.declared_n_in {
            if declared != input_width {
                return Err(Error::InvalidConfig(format!(
                    "layer declares input width {declared}, previous layer produces {input_width}"
                )));
            }
        }
        if input_width == 0 {
            return Err(Error::InvalidConfig("input width must be > 0".to_owned()));
        }

        let weights =
            Parameter::allocate("weights", &[input_width, self.n_out], &self.weights_config, rng)?;
        let bias = Parameter::allocate("bias", &[self.n_out], &self.bias_config, rng)?;

        self.n_in = Some(input_width);
        self.params = vec![weights, bias];
        Ok(self.n_out)
    }

    #[inline]
    pub(crate) fn output_width(&self) -> Option<usize> {
        self.n_in.map(|_| self.n_out)
    }

    fn resolved_n_in(&self) -> Result<usize> {
        self.n_in.ok_or_else(|| {
            Error::InvalidState("fully connected layer used before setup".to_owned())
        })
    }

    pub(crate) fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        self.forward_owned(input.clone(), training)
    }

    /// Forward taking ownership of the input, so the training cache needs no copy.
    pub(crate) fn forward_owned(&mut self, input: Tensor, training: bool) -> Result<Tensor> {
        let n_in = self.resolved_n_in()?;
        if input.shape().len() != 2 || input.row_width() != n_in {
            return Err(Error::InvalidData(format!(
                "fully connected layer expects (batch, {n_in}) input, got {:?}",
                input.shape()
            )));
        }

        let batch = input.rows();
        let mut out = Tensor::zeros(&[batch, self.n_out]);
        matmul::x_dot_w(
            batch,
            n_in,
            self.n_out,
            input.as_slice(),
            self.params[WEIGHTS].value().as_slice(),
            out.as_mut_slice(),
        );

        let b = self.params[BIAS].value().as_slice();
        for row in out.as_mut_slice().chunks_exact_mut(self.n_out) {
            for (o, &bv) in row.iter_mut().zip(b) {
                *o += bv;
            }
        }

        self.input = if training { Some(input) } else { None };
        Ok(out)
    }

    pub(crate) fn backward(&mut self, d_output: &Tensor) -> Result<Tensor> {
        let n_in = self.resolved_n_in()?;
        let n_out = self.n_out;
        let input = self.input.as_ref().ok_or_else(|| {
            Error::InvalidState(
                "fully connected backward requires a preceding training-mode forward".to_owned(),
            )
        })?;

        let batch = input.rows();
        if d_output.shape() != [batch, n_out] {
            return Err(Error::InvalidData(format!(
                "fully connected backward expects gradient of shape [{batch}, {n_out}], got {:?}",
                d_output.shape()
            )));
        }
        let g = d_output.as_slice();

        let (weights, bias) = self.params.split_at_mut(BIAS);
        let weights = &mut weights[WEIGHTS];
        let bias = &mut bias[0];

        matmul::xt_dot_g(
            batch,
            n_in,
            n_out,
            input.as_slice(),
            g,
            weights.grad_mut().as_mut_slice(),
        );

        let db = bias.grad_mut().as_mut_slice();
        db.fill(0.0);
        for row in g.chunks_exact(n_out) {
            for (d, &v) in db.iter_mut().zip(row) {
                *d += v;
            }
        }

        let mut d_input = Tensor::zeros(&[batch, n_in]);
        matmul::g_dot_wt(
            batch,
            n_in,
            n_out,
            g,
            weights.value().as_slice(),
            d_input.as_mut_slice(),
        );
        Ok(d_input)
    }
}

/// Dropout on the input followed by a fully-connected transform.
#[derive(Debug, Clone)]
pub struct DropoutFullyConnected {
    mask: DropoutMask,
    dense: FullyConnected,
}

impl DropoutFullyConnected {
    pub fn new(n_out: usize, rate: f64) -> Result<Self> {
        Ok(Self {
            mask: DropoutMask::new(rate)?,
            dense: FullyConnected::new(n_out)?,
        })
    }

    pub fn with_weights(mut self, config: ParamConfig) -> Self {
        self.dense = self.dense.with_weights(config);
        self
    }

    pub fn with_bias(mut self, config: ParamConfig) -> Self {
        self.dense = self.dense.with_bias(config);
        self
    }

    pub fn with_input_width(mut self, n_in: usize) -> Self {
        self.dense = self.dense.with_input_width(n_in);
        self
    }

    pub(crate) fn from_parameters(
        weights: Parameter,
        bias: Parameter,
        rate: f64,
        seed: u64,
    ) -> Result<Self> {
        let mut mask = DropoutMask::new(rate)?;
        mask.seed(seed);
        Ok(Self {
            mask,
            dense: FullyConnected::from_parameters(weights, bias)?,
        })
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.mask.rate()
    }

    /// The wrapped dense transform.
    #[inline]
    pub fn dense(&self) -> &FullyConnected {
        &self.dense
    }

    /// Input mask from the last training forward; empty when none was drawn.
    #[inline]
    pub fn last_mask(&self) -> &[f64] {
        self.mask.mask()
    }

    #[inline]
    pub(crate) fn params(&self) -> &[Parameter] {
        self.dense.params()
    }

    #[inline]
    pub(crate) fn params_mut(&mut self) -> &mut [Parameter] {
        self.dense.params_mut()
    }

    pub(crate) fn setup<R: Rng + ?Sized>(
        &mut self,
        input_width: usize,
        rng: &mut R,
    ) -> Result<usize> {
        self.mask.seed(rng.r#gen());
        self.dense.setup(input_width, rng)
    }

    #[inline]
    pub(crate) fn output_width(&self) -> Option<usize> {
        self.dense.output_width()
    }

    pub(crate) fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        let mut masked = Tensor::zeros(input.shape());
        self.mask
            .forward(input.as_slice(), masked.as_mut_slice(), training)?;
        self.dense.forward_owned(masked, training)
    }

    pub(crate) fn backward(&mut self, d_output: &Tensor) -> Result<Tensor> {
        let d_masked = self.dense.backward(d_output)?;
        let mut d_input = Tensor::zeros(d_masked.shape());
        self.mask
            .backward(d_masked.as_slice(), d_input.as_mut_slice())?;
        Ok(d_input)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn fixed_layer() -> FullyConnected {
        // W = [[1, 0, 2], [-1, 1, 0]], b = [0.5, -0.5, 0]
        let w = Parameter::from_tensor(
            "weights",
            Tensor::from_vec(&[2, 3], vec![1.0, 0.0, 2.0, -1.0, 1.0, 0.0]).unwrap(),
            0.0,
        )
        .unwrap();
        let b = Parameter::from_tensor(
            "bias",
            Tensor::from_vec(&[3], vec![0.5, -0.5, 0.0]).unwrap(),
            0.0,
        )
        .unwrap();
        FullyConnected::from_parameters(w, b).unwrap()
    }

    #[test]
    fn forward_is_affine() {
        let mut layer = fixed_layer();
        let x = Tensor::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let y = layer.forward(&x, false).unwrap();
        assert_eq!(y.shape(), &[2, 3]);
        assert_eq!(y.as_slice(), &[-0.5, 1.5, 2.0, -0.5, 3.5, 6.0]);
    }

    #[test]
    fn backward_matches_closed_form() {
        let mut layer = fixed_layer();
        let x = Tensor::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        layer.forward(&x, true).unwrap();

        let g = Tensor::from_rows(&[vec![1.0, 0.0, 1.0], vec![0.0, 1.0, 0.0]]).unwrap();
        let dx = layer.backward(&g).unwrap();

        assert_eq!(dx.as_slice(), &[3.0, -1.0, 0.0, 1.0]);
        assert_eq!(
            layer.weights().unwrap().grad().as_slice(),
            &[1.0, 3.0, 1.0, 2.0, 4.0, 2.0]
        );
        assert_eq!(layer.bias().unwrap().grad().as_slice(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn gradients_are_overwritten_not_accumulated() {
        let mut layer = fixed_layer();
        let x = Tensor::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let g = Tensor::from_rows(&[vec![1.0, 1.0, 1.0]]).unwrap();

        layer.forward(&x, true).unwrap();
        layer.backward(&g).unwrap();
        let first = layer.weights().unwrap().grad().clone();

        layer.forward(&x, true).unwrap();
        layer.backward(&g).unwrap();
        assert_eq!(layer.weights().unwrap().grad(), &first);
    }

    #[test]
    fn declared_input_width_is_checked_at_setup() {
        let mut layer = FullyConnected::new(4).unwrap().with_input_width(3);
        let err = layer.setup(5, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn wrong_input_width_is_a_data_error() {
        let mut layer = fixed_layer();
        let x = Tensor::zeros(&[1, 3]);
        assert!(layer.forward(&x, false).unwrap_err().is_data());
    }

    #[test]
    fn dropout_dense_inference_matches_rate_zero() {
        let mut dropped = DropoutFullyConnected::new(3, 0.5).unwrap();
        let mut plain = DropoutFullyConnected::new(3, 0.0).unwrap();
        dropped.setup(4, &mut StdRng::seed_from_u64(9)).unwrap();
        plain.setup(4, &mut StdRng::seed_from_u64(9)).unwrap();

        let x = Tensor::from_vec(&[2, 4], vec![0.1, -0.2, 0.3, 0.4, 1.0, 2.0, -3.0, 0.5]).unwrap();
        let a = dropped.forward(&x, false).unwrap();
        let b = plain.forward(&x, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dropout_dense_masks_the_input_gradient() {
        let mut layer = DropoutFullyConnected::new(2, 0.5).unwrap();
        layer.setup(6, &mut StdRng::seed_from_u64(4)).unwrap();

        let x = Tensor::from_vec(&[3, 6], vec![1.0; 18]).unwrap();
        layer.forward(&x, true).unwrap();
        let mask = layer.last_mask().to_vec();
        let dx = layer
            .backward(&Tensor::from_vec(&[3, 2], vec![1.0; 6]).unwrap())
            .unwrap();

        for (d, m) in dx.as_slice().iter().zip(&mask) {
            if *m == 0.0 {
                assert_eq!(*d, 0.0);
            }
        }
    }
}
