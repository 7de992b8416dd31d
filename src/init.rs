//! Weight initializers.
//!
//! An [`Init`] is evaluated exactly once, when a layer allocates its
//! parameters during network setup. Fan-in/fan-out are taken from a 2-D
//! weight shape `(n_in, n_out)`; 1-D shapes (biases) use their length for both.

use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use rand_distr::Normal;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Init {
    Zeros,
    Constant { value: f64 },
    /// Zero-mean Gaussian.
    Normal { sigma: f64 },
    Uniform { low: f64, high: f64 },
    /// Glorot uniform: `U(-l, l)` with `l = sqrt(6 / (fan_in + fan_out))`.
    Xavier,
    /// Kaiming normal: `N(0, sqrt(2 / fan_in))`.
    He,
}

impl Init {
    pub fn validate(self) -> Result<()> {
        match self {
            Init::Constant { value } if !value.is_finite() => Err(Error::InvalidConfig(format!(
                "constant init must be finite, got {value}"
            ))),
            Init::Normal { sigma } if !(sigma.is_finite() && sigma >= 0.0) => {
                Err(Error::InvalidConfig(format!(
                    "normal init sigma must be finite and >= 0, got {sigma}"
                )))
            }
            Init::Uniform { low, high } if !(low.is_finite() && high.is_finite() && low < high) => {
                Err(Error::InvalidConfig(format!(
                    "uniform init requires finite low < high, got [{low}, {high})"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Draw a freshly initialized buffer for a tensor of `shape`.
    pub fn fill<R: Rng + ?Sized>(self, shape: &[usize], rng: &mut R) -> Result<Vec<f64>> {
        self.validate()?;

        let len: usize = shape.iter().product();
        let (fan_in, fan_out) = match shape {
            [n_in, n_out] => (*n_in, *n_out),
            _ => (len, len),
        };
        if fan_in == 0 || fan_out == 0 {
            return Err(Error::InvalidConfig(format!(
                "cannot initialize a parameter with shape {shape:?}"
            )));
        }

        let values = match self {
            Init::Zeros => vec![0.0; len],
            Init::Constant { value } => vec![value; len],
            Init::Normal { sigma } => sample_normal(sigma, len, rng)?,
            Init::Uniform { low, high } => {
                let dist = Uniform::new(low, high);
                (0..len).map(|_| dist.sample(rng)).collect()
            }
            Init::Xavier => {
                let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
                let dist = Uniform::new(-limit, limit);
                (0..len).map(|_| dist.sample(rng)).collect()
            }
            Init::He => sample_normal((2.0 / fan_in as f64).sqrt(), len, rng)?,
        };
        Ok(values)
    }
}

fn sample_normal<R: Rng + ?Sized>(sigma: f64, len: usize, rng: &mut R) -> Result<Vec<f64>> {
    if sigma == 0.0 {
        return Ok(vec![0.0; len]);
    }
    let dist = Normal::new(0.0, sigma)
        .map_err(|e| Error::InvalidConfig(format!("normal init sigma {sigma}: {e}")))?;
    Ok((0..len).map(|_| dist.sample(rng)).collect())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn rejects_bad_hyperparameters() {
        assert!(Init::Normal { sigma: -1.0 }.validate().is_err());
        assert!(Init::Normal { sigma: f64::NAN }.validate().is_err());
        assert!(Init::Uniform { low: 1.0, high: 1.0 }.validate().is_err());
        assert!(Init::Constant { value: f64::INFINITY }.validate().is_err());
        assert!(Init::Xavier.validate().is_ok());
    }

    #[test]
    fn xavier_stays_within_limit() {
        let mut rng = StdRng::seed_from_u64(3);
        let values = Init::Xavier.fill(&[20, 10], &mut rng).unwrap();
        let limit = (6.0_f64 / 30.0).sqrt();
        assert_eq!(values.len(), 200);
        assert!(values.iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn normal_matches_requested_scale() {
        let mut rng = StdRng::seed_from_u64(11);
        let values = Init::Normal { sigma: 0.5 }.fill(&[100, 100], &mut rng).unwrap();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.02, "mean={mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.02, "std={}", var.sqrt());
    }

    #[test]
    fn same_seed_same_values() {
        let a = Init::He.fill(&[4, 3], &mut StdRng::seed_from_u64(1)).unwrap();
        let b = Init::He.fill(&[4, 3], &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
    }
}
