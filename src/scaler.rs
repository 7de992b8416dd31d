//! Per-feature standardization.
//!
//! `fit` records each column's mean and standard deviation on the training
//! features; `transform` applies `(x - mean) / std` using those statistics.
//! Constant columns keep a scale of 1.

use crate::{Error, Result, Tensor};

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        !self.mean.is_empty()
    }

    #[inline]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    #[inline]
    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn fit(&mut self, features: &Tensor) -> Result<()> {
        if features.shape().len() != 2 || features.rows() == 0 || features.row_width() == 0 {
            return Err(Error::InvalidData(format!(
                "scaler expects a non-empty (len, n_features) matrix, got {:?}",
                features.shape()
            )));
        }
        let n = features.rows() as f64;
        let width = features.row_width();

        let mut mean = vec![0.0; width];
        for row in features.as_slice().chunks_exact(width) {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; width];
        for row in features.as_slice().chunks_exact(width) {
            for ((s, &v), &m) in var.iter_mut().zip(row).zip(&mean) {
                let d = v - m;
                *s += d * d;
            }
        }
        self.std = var
            .into_iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > 0.0 { sd } else { 1.0 }
            })
            .collect();
        self.mean = mean;
        Ok(())
    }

    pub fn transform(&self, features: &Tensor) -> Result<Tensor> {
        if !self.is_fitted() {
            return Err(Error::InvalidState("scaler used before fit".to_owned()));
        }
        let width = self.mean.len();
        if features.shape().len() != 2 || features.row_width() != width {
            return Err(Error::InvalidData(format!(
                "scaler fitted on {width} features, got shape {:?}",
                features.shape()
            )));
        }

        let mut out = features.clone();
        for row in out.as_mut_slice().chunks_exact_mut(width) {
            for ((v, &m), &s) in row.iter_mut().zip(&self.mean).zip(&self.std) {
                *v = (*v - m) / s;
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, features: &Tensor) -> Result<Tensor> {
        self.fit(features)?;
        self.transform(features)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn standardizes_columns() {
        let x = Tensor::from_rows(&[vec![1.0, 5.0], vec![3.0, 5.0], vec![5.0, 5.0]]).unwrap();
        let mut scaler = StandardScaler::new();
        let z = scaler.fit_transform(&x).unwrap();

        assert_eq!(scaler.mean(), &[3.0, 5.0]);
        // Constant column keeps unit scale.
        assert_eq!(scaler.std()[1], 1.0);
        let col0: Vec<f64> = (0..3).map(|r| z.row(r)[0]).collect();
        assert_relative_eq!(col0.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(col0[2], (2.0_f64 / (8.0_f64 / 3.0).sqrt()), epsilon = 1e-12);
        assert!((0..3).all(|r| z.row(r)[1] == 0.0));
    }

    #[test]
    fn transform_requires_fit_and_matching_width() {
        let scaler = StandardScaler::new();
        assert!(matches!(
            scaler.transform(&Tensor::zeros(&[1, 2])).unwrap_err(),
            Error::InvalidState(_)
        ));

        let mut scaler = StandardScaler::new();
        scaler.fit(&Tensor::from_rows(&[vec![1.0, 2.0]]).unwrap()).unwrap();
        assert!(scaler.transform(&Tensor::zeros(&[1, 3])).unwrap_err().is_data());
    }
}
