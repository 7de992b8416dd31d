//! Input sources.
//!
//! [`SupervisedInput`] owns a `(len, n_features)` feature matrix, one class label
//! per example and a batch size. Training draws a fresh permutation every epoch
//! via [`SupervisedInput::epoch_batches`]; evaluation walks the examples in
//! their original order via [`SupervisedInput::batches`]. In both cases the
//! final, possibly smaller batch is included.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::{Error, Result, Tensor};

/// One mini-batch: features `(batch, n_features)` and their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Tensor,
    pub y: Vec<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SupervisedInput {
    features: Tensor,
    labels: Vec<usize>,
    batch_size: usize,
}

impl SupervisedInput {
    /// `features` must be a non-empty `(len, n_features)` matrix with `len == labels.len()`.
    pub fn new(features: Tensor, labels: Vec<usize>, batch_size: usize) -> Result<Self> {
        if features.shape().len() != 2 {
            return Err(Error::InvalidData(format!(
                "features must be a (len, n_features) matrix, got shape {:?}",
                features.shape()
            )));
        }
        if features.rows() == 0 || features.row_width() == 0 {
            return Err(Error::InvalidData("features must not be empty".to_owned()));
        }
        if features.rows() != labels.len() {
            return Err(Error::InvalidData(format!(
                "features/labels length mismatch: {} vs {}",
                features.rows(),
                labels.len()
            )));
        }
        if batch_size == 0 {
            return Err(Error::InvalidData("batch_size must be > 0".to_owned()));
        }
        Ok(Self {
            features,
            labels,
            batch_size,
        })
    }

    /// Evaluation input: a single batch spanning every example.
    pub fn full_batch(features: Tensor, labels: Vec<usize>) -> Result<Self> {
        let len = labels.len().max(1);
        Self::new(features, labels, len)
    }

    /// Convenience constructor from per-example rows.
    pub fn from_rows(rows: &[Vec<f64>], labels: Vec<usize>, batch_size: usize) -> Result<Self> {
        Self::new(Tensor::from_rows(rows)?, labels, batch_size)
    }

    /// Gather a subset of examples (e.g. one side of a train/test split).
    pub fn from_indices(
        features: &Tensor,
        labels: &[usize],
        indices: &[usize],
        batch_size: usize,
    ) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= labels.len() || i >= features.rows()) {
            return Err(Error::InvalidData(format!(
                "index {bad} out of range for {} examples",
                labels.len()
            )));
        }
        let y = indices.iter().map(|&i| labels[i]).collect();
        Self::new(features.select_rows(indices), y, batch_size)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidData("batch_size must be > 0".to_owned()));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.row_width()
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per pass, counting the trailing partial batch.
    #[inline]
    pub fn n_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    #[inline]
    pub fn features(&self) -> &Tensor {
        &self.features
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Largest label present.
    pub fn max_label(&self) -> usize {
        self.labels.iter().copied().max().unwrap_or(0)
    }

    /// Deterministic pass in original order.
    pub fn batches(&self) -> Batches<'_> {
        Batches {
            input: self,
            order: (0..self.len()).collect(),
            position: 0,
        }
    }

    /// Pass over a fresh random permutation of the examples.
    pub fn epoch_batches<R: Rng + ?Sized>(&self, rng: &mut R) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        Batches {
            input: self,
            order,
            position: 0,
        }
    }
}

/// Iterator over the mini-batches of one pass.
#[derive(Debug)]
pub struct Batches<'a> {
    input: &'a SupervisedInput,
    order: Vec<usize>,
    position: usize,
}

impl Batches<'_> {
    /// Example order of this pass.
    #[inline]
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.input.batch_size).min(self.order.len());
        let idx = &self.order[self.position..end];
        self.position = end;

        Some(Batch {
            x: self.input.features.select_rows(idx),
            y: idx.iter().map(|&i| self.input.labels[i]).collect(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position).div_ceil(self.input.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}

/// Supplier of a labelled dataset and its train/test partition.
pub trait DatasetProvider {
    /// `(len, n_features)` feature matrix.
    fn features(&self) -> &Tensor;
    fn labels(&self) -> &[usize];
    fn n_classes(&self) -> usize;
    /// `(train_indices, test_indices)`.
    fn split(&self) -> (Vec<usize>, Vec<usize>);

    /// Training input over the train partition.
    fn train_input(&self, batch_size: usize) -> Result<SupervisedInput> {
        let (train, _) = self.split();
        SupervisedInput::from_indices(self.features(), self.labels(), &train, batch_size)
    }

    /// Evaluation input over the test partition, as one batch.
    fn test_input(&self) -> Result<SupervisedInput> {
        let (_, test) = self.split();
        let batch_size = test.len().max(1);
        SupervisedInput::from_indices(self.features(), self.labels(), &test, batch_size)
    }
}

/// Dataset held in memory with a fixed, seeded partition.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    features: Tensor,
    labels: Vec<usize>,
    n_classes: usize,
    train: Vec<usize>,
    test: Vec<usize>,
}

impl InMemoryDataset {
    /// Shuffle the indices once and keep `test_fraction` of them for testing.
    pub fn new<R: Rng + ?Sized>(
        features: Tensor,
        labels: Vec<usize>,
        test_fraction: f64,
        rng: &mut R,
    ) -> Result<Self> {
        if features.shape().len() != 2 || features.rows() != labels.len() || labels.is_empty() {
            return Err(Error::InvalidData(format!(
                "features shape {:?} does not match {} labels",
                features.shape(),
                labels.len()
            )));
        }
        if !(test_fraction.is_finite() && (0.0..1.0).contains(&test_fraction)) {
            return Err(Error::InvalidConfig(format!(
                "test_fraction must be in [0, 1), got {test_fraction}"
            )));
        }

        let n_classes = labels.iter().copied().max().unwrap_or(0) + 1;
        let mut order: Vec<usize> = (0..labels.len()).collect();
        order.shuffle(rng);
        let n_test = (labels.len() as f64 * test_fraction).round() as usize;
        let test = order[..n_test].to_vec();
        let train = order[n_test..].to_vec();

        Ok(Self {
            features,
            labels,
            n_classes,
            train,
            test,
        })
    }
}

impl DatasetProvider for InMemoryDataset {
    fn features(&self) -> &Tensor {
        &self.features
    }

    fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn split(&self) -> (Vec<usize>, Vec<usize>) {
        (self.train.clone(), self.test.clone())
    }
}
