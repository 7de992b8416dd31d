//! Loss functions.
//!
//! Used like:
//!
//! - run `network.forward(...)` to get raw class scores
//! - `loss.backward(scores, labels, d_scores)` writes `dL/d(scores)` and returns the loss
//! - run `network.backward(d_scores)`
//!
//! The loss is the mean over the batch, so the `1 / batch_size` factor enters
//! the gradient here and nowhere else.

use crate::{Error, Result, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
/// Supported loss functions.
pub enum Loss {
    /// Softmax followed by the multinomial negative log-likelihood.
    ///
    /// Expects raw scores (no output activation) and integer class labels.
    SoftmaxCrossEntropy { n_classes: usize },
}

impl Loss {
    #[inline]
    pub fn softmax_cross_entropy(n_classes: usize) -> Self {
        Loss::SoftmaxCrossEntropy { n_classes }
    }

    /// Validate a loss configuration.
    pub fn validate(self) -> Result<()> {
        match self {
            Loss::SoftmaxCrossEntropy { n_classes } => {
                if n_classes < 2 {
                    return Err(Error::InvalidConfig(format!(
                        "softmax cross-entropy needs at least 2 classes, got {n_classes}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Width of the scores this loss consumes.
    #[inline]
    pub fn n_classes(self) -> usize {
        match self {
            Loss::SoftmaxCrossEntropy { n_classes } => n_classes,
        }
    }

    /// Mean loss over the batch.
    pub fn forward(self, scores: &Tensor, labels: &[usize]) -> Result<f64> {
        self.check(scores, labels)?;
        let k = self.n_classes();

        let mut total = 0.0_f64;
        for (r, &label) in labels.iter().enumerate() {
            let row = &scores.as_slice()[r * k..(r + 1) * k];
            let (log_sum_exp, _) = log_sum_exp_and_max(row);
            total += log_sum_exp - row[label];
        }
        Ok(total / labels.len() as f64)
    }

    /// Mean loss + gradient w.r.t. `scores`.
    ///
    /// Writes `d_scores = (softmax(scores) - one_hot(labels)) / batch` and returns the loss.
    pub fn backward(self, scores: &Tensor, labels: &[usize], d_scores: &mut Tensor) -> Result<f64> {
        self.check(scores, labels)?;
        if d_scores.shape() != scores.shape() {
            return Err(Error::InvalidData(format!(
                "gradient buffer shape {:?} does not match scores shape {:?}",
                d_scores.shape(),
                scores.shape()
            )));
        }

        let k = self.n_classes();
        let inv_batch = 1.0 / labels.len() as f64;
        let mut total = 0.0_f64;

        let d_all = d_scores.as_mut_slice();
        for (r, &label) in labels.iter().enumerate() {
            let row = &scores.as_slice()[r * k..(r + 1) * k];
            let d = &mut d_all[r * k..(r + 1) * k];

            let (log_sum_exp, max_score) = log_sum_exp_and_max(row);
            total += log_sum_exp - row[label];

            // Softmax into d, then turn it into a gradient in place.
            let mut sum_exp = 0.0_f64;
            for (p, &s) in d.iter_mut().zip(row) {
                *p = (s - max_score).exp();
                sum_exp += *p;
            }
            let inv_sum = 1.0 / sum_exp;
            for (i, p) in d.iter_mut().enumerate() {
                let target = if i == label { 1.0 } else { 0.0 };
                *p = (*p * inv_sum - target) * inv_batch;
            }
        }

        Ok(total * inv_batch)
    }

    /// Row-wise class probabilities.
    pub fn probabilities(self, scores: &Tensor) -> Result<Tensor> {
        self.check_width(scores)?;
        let k = self.n_classes();
        let mut probs = Tensor::zeros(scores.shape());
        for (row, p) in scores
            .as_slice()
            .chunks_exact(k)
            .zip(probs.as_mut_slice().chunks_exact_mut(k))
        {
            let (_, max_score) = log_sum_exp_and_max(row);
            let mut sum_exp = 0.0_f64;
            for (pv, &s) in p.iter_mut().zip(row) {
                *pv = (s - max_score).exp();
                sum_exp += *pv;
            }
            for pv in p.iter_mut() {
                *pv /= sum_exp;
            }
        }
        Ok(probs)
    }

    /// Predicted class per row (arg-max of the scores).
    pub fn predict(self, scores: &Tensor) -> Result<Vec<usize>> {
        self.check_width(scores)?;
        Ok(scores.argmax_rows())
    }

    fn check_width(self, scores: &Tensor) -> Result<()> {
        self.validate()?;
        if scores.shape().len() != 2 || scores.row_width() != self.n_classes() {
            return Err(Error::InvalidData(format!(
                "scores shape {:?} does not match (batch, {})",
                scores.shape(),
                self.n_classes()
            )));
        }
        Ok(())
    }

    fn check(self, scores: &Tensor, labels: &[usize]) -> Result<()> {
        self.check_width(scores)?;
        if labels.is_empty() {
            return Err(Error::InvalidData("labels must not be empty".to_owned()));
        }
        if labels.len() != scores.rows() {
            return Err(Error::InvalidData(format!(
                "{} labels for {} score rows",
                labels.len(),
                scores.rows()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= self.n_classes()) {
            return Err(Error::InvalidData(format!(
                "label {bad} out of range for {} classes",
                self.n_classes()
            )));
        }
        Ok(())
    }
}

#[inline]
fn log_sum_exp_and_max(xs: &[f64]) -> (f64, f64) {
    let mut max_x = xs[0];
    for &x in xs.iter().skip(1) {
        if x > max_x {
            max_x = x;
        }
    }
    let mut sum_exp = 0.0_f64;
    for &x in xs {
        sum_exp += (x - max_x).exp();
    }
    (max_x + sum_exp.ln(), max_x)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn degenerate_class_counts_are_rejected_before_use() {
        for k in [0, 1] {
            let loss = Loss::softmax_cross_entropy(k);
            let scores = Tensor::zeros(&[2, k]);
            assert!(loss.probabilities(&scores).unwrap_err().is_config());
            assert!(loss.predict(&scores).unwrap_err().is_config());
            assert!(loss.forward(&scores, &[0, 0]).unwrap_err().is_config());
        }
    }

    #[test]
    fn uniform_scores_give_log_k() {
        for k in 2..12 {
            let loss = Loss::softmax_cross_entropy(k);
            let scores = Tensor::from_vec(&[3, k], vec![0.75; 3 * k]).unwrap();
            let labels = [0, k - 1, k / 2];
            let l = loss.forward(&scores, &labels).unwrap();
            assert_relative_eq!(l, (k as f64).ln(), epsilon = 1e-12);
        }
    }

    #[test]
    fn huge_scores_stay_finite() {
        let loss = Loss::softmax_cross_entropy(3);
        let scores = Tensor::from_rows(&[vec![1000.0, -1000.0, 999.0]]).unwrap();
        let mut d = Tensor::zeros(scores.shape());
        let l = loss.backward(&scores, &[2], &mut d).unwrap();
        assert!(l.is_finite());
        assert_relative_eq!(l, 1.0 + (-1.0_f64).exp().ln_1p(), epsilon = 1e-9);
        assert!(d.is_finite());
    }

    #[test]
    fn gradient_is_batch_averaged_softmax_minus_one_hot() {
        let loss = Loss::softmax_cross_entropy(2);
        let scores = Tensor::from_rows(&[vec![0.0, 0.0], vec![0.0, 0.0]]).unwrap();
        let mut d = Tensor::zeros(scores.shape());
        loss.backward(&scores, &[0, 1], &mut d).unwrap();
        // softmax = 0.5 everywhere; batch = 2.
        assert_eq!(d.as_slice(), &[-0.25, 0.25, 0.25, -0.25]);
    }

    #[test]
    fn forward_and_backward_agree_on_the_loss() {
        let loss = Loss::softmax_cross_entropy(3);
        let scores = Tensor::from_rows(&[vec![5.0, 0.0, -1.0], vec![-1.0, 0.0, 5.0]]).unwrap();
        let mut d = Tensor::zeros(scores.shape());
        let a = loss.forward(&scores, &[0, 0]).unwrap();
        let b = loss.backward(&scores, &[0, 0], &mut d).unwrap();
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let loss = Loss::softmax_cross_entropy(4);
        let scores = Tensor::from_rows(&[vec![1.0, 2.0, 3.0, 4.0]]).unwrap();
        let p = loss.probabilities(&scores).unwrap();
        assert_relative_eq!(p.as_slice().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_eq!(loss.predict(&scores).unwrap(), vec![3]);
    }

    #[test]
    fn rejects_bad_labels_and_configs() {
        assert!(Loss::softmax_cross_entropy(1).validate().unwrap_err().is_config());

        let loss = Loss::softmax_cross_entropy(2);
        let scores = Tensor::zeros(&[2, 2]);
        assert!(loss.forward(&scores, &[0, 2]).unwrap_err().is_data());
        assert!(loss.forward(&scores, &[0]).unwrap_err().is_data());
        assert!(loss.forward(&Tensor::zeros(&[2, 3]), &[0, 1]).unwrap_err().is_data());
    }
}
