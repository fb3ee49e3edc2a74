//! Error types for Destilar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Training diverged. Never retried inside the loop.
    #[error("Loss is {value}, stopping training (epoch {epoch}, step {step})")]
    NonFiniteLoss { value: f32, epoch: usize, step: usize },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Captured activation not found: {0}")]
    MissingActivation(String),

    #[error("Dataset index {index} out of range for dataset of length {len}")]
    DatasetIndex { index: usize, len: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Backward operation failed: {0}")]
    Backward(String),

    #[error("Collective operation failed: {0}")]
    Collective(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error is the divergence guard firing
    pub fn is_divergence(&self) -> bool {
        matches!(self, Error::NonFiniteLoss { .. })
    }

    /// Process exit status a supervisor should use for this error
    pub fn exit_code(&self) -> u8 {
        if self.is_divergence() {
            1
        } else {
            2
        }
    }

    pub(crate) fn shape(expected: &[usize], got: &[usize]) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
