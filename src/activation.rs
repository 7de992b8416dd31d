//! Activation functions.
//!
//! An activation layer applies a nonlinearity element-wise and caches its
//! *post-activation* output. Backprop expresses every derivative in terms of
//! that cached output, so no pre-activation buffer is kept.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
/// Element-wise activation function.
pub enum Activation {
    #[cfg_attr(feature = "serde", serde(rename = "relu"))]
    ReLU,
    #[cfg_attr(feature = "serde", serde(rename = "leaky_relu"))]
    LeakyReLU { alpha: f64 },
    Tanh,
    Sigmoid,
    Identity,
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::ReLU | Activation::Tanh | Activation::Sigmoid | Activation::Identity => {}
        }

        Ok(())
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::ReLU => "relu",
            Activation::LeakyReLU { .. } => "leaky_relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Identity => "identity",
        }
    }

    #[inline]
    pub(crate) fn forward(self, x: f64) -> f64 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }

    /// Derivative with respect to the input, evaluated at the cached output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f64) -> f64 {
        match self {
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::Tanh => 1.0 - y * y,
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Identity => 1.0,
        }
    }

    /// `out[i] = f(input[i])`.
    pub(crate) fn apply(self, input: &[f64], out: &mut [f64]) {
        debug_assert_eq!(input.len(), out.len());
        for (o, &x) in out.iter_mut().zip(input) {
            *o = self.forward(x);
        }
    }

    /// `d_input[i] = d_output[i] * f'(output[i])`.
    pub(crate) fn backprop(self, output: &[f64], d_output: &[f64], d_input: &mut [f64]) {
        debug_assert_eq!(output.len(), d_output.len());
        debug_assert_eq!(output.len(), d_input.len());
        for ((dx, &y), &dy) in d_input.iter_mut().zip(output).zip(d_output) {
            *dx = dy * self.grad_from_output(y);
        }
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaky_relu_alpha_must_be_finite_and_non_negative() {
        assert!(
            Activation::LeakyReLU { alpha: f64::NAN }
                .validate()
                .is_err()
        );
        assert!(Activation::LeakyReLU { alpha: -0.1 }.validate().is_err());
        assert!(Activation::LeakyReLU { alpha: 0.1 }.validate().is_ok());
    }

    #[test]
    fn relu_gradient_is_gated_by_output() {
        assert_eq!(Activation::ReLU.forward(-2.0), 0.0);
        assert_eq!(Activation::ReLU.forward(3.0), 3.0);
        assert_eq!(Activation::ReLU.grad_from_output(0.0), 0.0);
        assert_eq!(Activation::ReLU.grad_from_output(3.0), 1.0);

        let out = [0.0, 2.0, 0.0, 0.5];
        let d_out = [1.0, -1.0, 4.0, 2.0];
        let mut d_in = [f64::NAN; 4];
        Activation::ReLU.backprop(&out, &d_out, &mut d_in);
        assert_eq!(d_in, [0.0, -1.0, 0.0, 2.0]);
    }

    #[test]
    fn sigmoid_is_stable_for_large_inputs() {
        assert!((Activation::Sigmoid.forward(0.0) - 0.5).abs() < 1e-12);
        assert!(Activation::Sigmoid.forward(800.0).is_finite());
        assert!(Activation::Sigmoid.forward(-800.0) >= 0.0);
        let y = Activation::Sigmoid.forward(0.0);
        assert!((Activation::Sigmoid.grad_from_output(y) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn tanh_gradient_from_output() {
        let y = Activation::Tanh.forward(0.3);
        let g = Activation::Tanh.grad_from_output(y);
        assert!((g - (1.0 - y * y)).abs() < 1e-12);
    }
}
