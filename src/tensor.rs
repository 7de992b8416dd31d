//! Dense row-major tensors.
//!
//! Every buffer that flows between layers is a [`Tensor`]: a contiguous `Vec<f64>`
//! plus a shape. Batched activations use shape `(batch, width)`; the leading
//! dimension is always the example index.

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    /// Zero-filled tensor of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; len],
        }
    }

    /// Wrap a flat row-major buffer.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::InvalidData(format!(
                "buffer length {} does not match shape {:?} ({} elements)",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Build a `(rows, width)` matrix from per-example rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if width == 0 {
            return Err(Error::InvalidData("rows must be non-empty".to_owned()));
        }

        let mut data = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {width}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(&[rows.len(), width], data)
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the leading (example) dimension.
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of scalars per leading-dimension entry.
    #[inline]
    pub fn row_width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Panics if `idx >= rows()`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f64] {
        let w = self.row_width();
        &self.data[idx * w..(idx + 1) * w]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Gather rows by index into a new tensor (shape `(indices.len(), ...)`).
    ///
    /// Panics if an index is out of range.
    pub fn select_rows(&self, indices: &[usize]) -> Tensor {
        let w = self.row_width();
        let mut data = Vec::with_capacity(indices.len() * w);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        Tensor { shape, data }
    }

    /// Index of the largest value in each row. Ties resolve to the lowest index.
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows())
            .map(|r| {
                let row = self.row(r);
                let mut best = 0;
                for (i, &v) in row.iter().enumerate().skip(1) {
                    if v > row[best] {
                        best = i;
                    }
                }
                best
            })
            .collect()
    }
}
