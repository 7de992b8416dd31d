//! Parameter update rules.
//!
//! Design notes:
//! - Rule *state* (velocities) lives outside the network, one buffer per
//!   [`Parameter`](crate::Parameter), zeroed when the state is created.
//! - The training loop owns the state for the whole run, across epochs.
//! - Weight decay is per parameter and enters the update as `g + wd * w`.

use crate::{Error, NeuralNetwork, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum LearnRule {
    /// `w -= lr * (g + wd * w)`.
    Sgd { learn_rate: f64 },
    /// `v = momentum * v - lr * (g + wd * w); w += v`.
    Momentum { learn_rate: f64, momentum: f64 },
}

impl LearnRule {
    pub fn validate(self) -> Result<()> {
        let learn_rate = self.learn_rate();
        if !(learn_rate.is_finite() && learn_rate >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learn_rate must be finite and >= 0, got {learn_rate}"
            )));
        }
        if let LearnRule::Momentum { momentum, .. } = self {
            if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                return Err(Error::InvalidConfig(format!(
                    "momentum must be finite and in [0,1), got {momentum}"
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn learn_rate(self) -> f64 {
        match self {
            LearnRule::Sgd { learn_rate } | LearnRule::Momentum { learn_rate, .. } => learn_rate,
        }
    }

    /// Allocate zeroed per-parameter state for `network` (which must be set up).
    pub fn state(self, network: &NeuralNetwork) -> Result<LearnRuleState> {
        self.validate()?;
        if !network.is_ready() {
            return Err(Error::InvalidState(
                "learn rule state requires a set-up network".to_owned(),
            ));
        }

        let velocity = match self {
            LearnRule::Sgd { .. } => Vec::new(),
            LearnRule::Momentum { .. } => {
                network.parameters().map(|p| vec![0.0; p.len()]).collect()
            }
        };
        Ok(LearnRuleState {
            rule: self,
            velocity,
        })
    }
}

impl Default for LearnRule {
    fn default() -> Self {
        LearnRule::Momentum {
            learn_rate: 0.1,
            momentum: 0.9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LearnRuleState {
    rule: LearnRule,
    velocity: Vec<Vec<f64>>,
}

impl LearnRuleState {
    #[inline]
    pub fn rule(&self) -> LearnRule {
        self.rule
    }

    /// Velocity buffers in parameter order (empty for plain SGD).
    #[inline]
    pub fn velocity(&self) -> &[Vec<f64>] {
        &self.velocity
    }

    /// Apply one update to every parameter using its current gradient.
    pub fn step(&mut self, network: &mut NeuralNetwork) -> Result<()> {
        match self.rule {
            LearnRule::Sgd { learn_rate } => {
                for p in network.parameters_mut() {
                    let wd = p.weight_decay();
                    let (w, g) = p.value_and_grad_mut();
                    for (w, &g) in w.iter_mut().zip(g) {
                        let delta = learn_rate * (g + wd * *w);
                        // Skipping zero deltas keeps the sign of -0.0 weights.
                        if delta != 0.0 {
                            *w -= delta;
                        }
                    }
                }
            }
            LearnRule::Momentum {
                learn_rate,
                momentum,
            } => {
                let mut velocity = self.velocity.iter_mut();
                for p in network.parameters_mut() {
                    let v = velocity
                        .next()
                        .filter(|v| v.len() == p.len())
                        .ok_or_else(|| {
                            Error::InvalidState(format!(
                                "learn rule state does not match parameter {}",
                                p.name()
                            ))
                        })?;

                    let wd = p.weight_decay();
                    let (w, g) = p.value_and_grad_mut();
                    for ((w, v), &g) in w.iter_mut().zip(v.iter_mut()).zip(g) {
                        *v = momentum * *v - learn_rate * (g + wd * *w);
                        if *v != 0.0 {
                            *w += *v;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::{FullyConnected, Init, Layer, Loss, ParamConfig, Tensor};

    fn one_by_two(weight_decay: f64) -> NeuralNetwork {
        let dense = FullyConnected::new(2)
            .unwrap()
            .with_weights(
                ParamConfig::new(Init::Constant { value: 1.0 }).with_weight_decay(weight_decay),
            )
            .with_bias(ParamConfig::new(Init::Constant { value: 2.0 }));
        let mut net =
            NeuralNetwork::new(vec![Layer::from(dense)], Loss::softmax_cross_entropy(2)).unwrap();
        net.setup_with_seed(1, 0).unwrap();
        net
    }

    fn set_grads(net: &mut NeuralNetwork, w: f64, b: f64) {
        let mut params = net.parameters_mut();
        params.next().unwrap().grad_mut().fill(w);
        params.next().unwrap().grad_mut().fill(b);
    }

    fn values(net: &NeuralNetwork) -> Vec<f64> {
        net.parameters()
            .flat_map(|p| p.value().as_slice().to_vec())
            .collect()
    }

    #[test]
    fn validation_rejects_bad_hyperparams() {
        assert!(LearnRule::Sgd { learn_rate: -0.1 }.validate().is_err());
        assert!(LearnRule::Sgd { learn_rate: f64::NAN }.validate().is_err());
        assert!(LearnRule::Sgd { learn_rate: 0.0 }.validate().is_ok());
        assert!(
            LearnRule::Momentum {
                learn_rate: 0.1,
                momentum: 1.0
            }
            .validate()
            .is_err()
        );
        assert!(
            LearnRule::Momentum {
                learn_rate: 0.1,
                momentum: -0.5
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn state_requires_setup() {
        let net = NeuralNetwork::new(
            vec![Layer::fully_connected(2).unwrap()],
            Loss::softmax_cross_entropy(2),
        )
        .unwrap();
        assert!(LearnRule::default().state(&net).is_err());
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut net = one_by_two(0.0);
        let mut state = LearnRule::Momentum {
            learn_rate: 0.5,
            momentum: 0.5,
        }
        .state(&net)
        .unwrap();

        set_grads(&mut net, 1.0, -2.0);
        state.step(&mut net).unwrap();
        // v = -0.5 * g
        assert_eq!(values(&net), vec![0.5, 0.5, 3.0, 3.0]);

        state.step(&mut net).unwrap();
        // v = 0.5 * v - 0.5 * g
        assert_eq!(values(&net), vec![-0.25, -0.25, 4.5, 4.5]);
        assert_eq!(state.velocity()[0], vec![-0.75, -0.75]);
    }

    #[test]
    fn weight_decay_pulls_towards_zero() {
        let mut net = one_by_two(0.1);
        let mut state = LearnRule::Sgd { learn_rate: 1.0 }.state(&net).unwrap();
        set_grads(&mut net, 0.0, 0.0);
        state.step(&mut net).unwrap();
        let v = values(&net);
        assert_relative_eq!(v[0], 0.9, epsilon = 1e-15);
        // Bias has no decay.
        assert_eq!(v[2], 2.0);
    }

    #[test]
    fn zero_learn_rate_leaves_parameters_untouched() {
        let mut net = one_by_two(0.3);
        let before = values(&net);
        let mut state = LearnRule::Momentum {
            learn_rate: 0.0,
            momentum: 0.9,
        }
        .state(&net)
        .unwrap();
        for _ in 0..5 {
            set_grads(&mut net, 3.0, -7.0);
            state.step(&mut net).unwrap();
        }
        let after = values(&net);
        assert_eq!(
            before.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            after.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn zero_learn_rate_keeps_negative_zero_weights() {
        let bits = |net: &NeuralNetwork| {
            values(net)
                .iter()
                .map(|v| v.to_bits())
                .collect::<Vec<_>>()
        };
        let rows = vec![vec![1.0, -2.0], vec![-0.5, 3.0], vec![2.0, 0.25]];
        let input = crate::SupervisedInput::from_rows(&rows, vec![0, 1, 1], 2).unwrap();

        for rule in [
            LearnRule::Sgd { learn_rate: 0.0 },
            LearnRule::Momentum {
                learn_rate: 0.0,
                momentum: 0.9,
            },
        ] {
            let negative_zero = ParamConfig::new(Init::Constant { value: -0.0 });
            let dense = FullyConnected::new(2)
                .unwrap()
                .with_weights(negative_zero.with_weight_decay(0.1))
                .with_bias(negative_zero);
            let mut net =
                NeuralNetwork::new(vec![Layer::from(dense)], Loss::softmax_cross_entropy(2))
                    .unwrap();
            net.setup_with_seed(2, 0).unwrap();
            let before = bits(&net);
            assert!(before.iter().all(|&b| b == (-0.0_f64).to_bits()));

            crate::StochasticGradientDescent::new(3, rule)
                .unwrap()
                .train(&mut net, &input, &mut StdRng::seed_from_u64(0), None)
                .unwrap();
            assert_eq!(bits(&net), before, "{rule:?}");
        }
    }

    #[test]
    fn momentum_zero_is_plain_gradient_descent() {
        let mut net = one_by_two(0.0);
        net.forward(&Tensor::from_rows(&[vec![0.7]]).unwrap(), true)
            .unwrap();
        net.backward(&Tensor::from_rows(&[vec![0.3, -0.3]]).unwrap())
            .unwrap();

        let expected: Vec<f64> = net
            .parameters()
            .flat_map(|p| {
                p.value()
                    .as_slice()
                    .iter()
                    .zip(p.grad().as_slice())
                    .map(|(w, g)| w - 0.1 * g)
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut state = LearnRule::Momentum {
            learn_rate: 0.1,
            momentum: 0.0,
        }
        .state(&net)
        .unwrap();
        state.step(&mut net).unwrap();
        assert_eq!(values(&net), expected);
    }
}
