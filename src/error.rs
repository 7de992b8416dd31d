use thiserror::Error;

/// Errors raised while configuring, feeding, or training a network.
///
/// None of these are retried internally. Configuration and data errors are
/// caught before training starts; `NonFinite` aborts the current run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Bad hyperparameter or a shape mismatch resolved at setup.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Malformed features/labels supplied by an input source.
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// NaN or infinity in the loss or a gradient.
    #[error("non-finite value in {location}")]
    NonFinite { location: String },
    /// Operation called in the wrong lifecycle state (e.g. before setup).
    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, Error::InvalidData(_))
    }

    #[inline]
    pub fn is_numerical(&self) -> bool {
        matches!(self, Error::NonFinite { .. })
    }
}
