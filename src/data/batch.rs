//! Batches and their targets

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayD};

/// Labels for one batch
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Class indices, `[batch]`
    Hard(Array1<usize>),
    /// Per-class probabilities, `[batch, classes]`
    Soft(Array2<f32>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Hard(labels) => labels.len(),
            Targets::Soft(probs) => probs.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_hard(&self) -> Option<&Array1<usize>> {
        match self {
            Targets::Hard(labels) => Some(labels),
            Targets::Soft(_) => None,
        }
    }

    /// Smoothed one-hot encoding of hard labels; soft targets are returned as-is
    pub fn to_soft(&self, num_classes: usize, smoothing: f32) -> Result<Array2<f32>> {
        match self {
            Targets::Soft(probs) => {
                if probs.ncols() != num_classes {
                    return Err(Error::shape(&[probs.nrows(), num_classes], probs.shape()));
                }
                Ok(probs.clone())
            }
            Targets::Hard(labels) => {
                let off = smoothing / num_classes as f32;
                let on = 1.0 - smoothing + off;
                let mut out = Array2::from_elem((labels.len(), num_classes), off);
                for (i, &label) in labels.iter().enumerate() {
                    if label >= num_classes {
                        return Err(Error::InvalidParameter(format!(
                            "label {label} out of range for {num_classes} classes"
                        )));
                    }
                    out[[i, label]] = on;
                }
                Ok(out)
            }
        }
    }
}

/// Input tensor and targets sharing a leading batch dimension
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: ArrayD<f32>,
    pub targets: Targets,
}

impl Batch {
    /// Pair inputs with targets, rejecting mismatched batch sizes
    pub fn new(inputs: ArrayD<f32>, targets: Targets) -> Result<Self> {
        let n = inputs.shape().first().copied().unwrap_or(0);
        if n != targets.len() {
            let mut expected = inputs.shape().to_vec();
            if let Some(first) = expected.first_mut() {
                *first = targets.len();
            }
            return Err(Error::shape(&expected, inputs.shape()));
        }
        Ok(Self { inputs, targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, IxDyn};

    #[test]
    fn test_batch_rejects_mismatched_n() {
        let inputs = ArrayD::zeros(IxDyn(&[3, 2]));
        let err = Batch::new(inputs, Targets::Hard(array![0, 1])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_batch_len() {
        let inputs = ArrayD::zeros(IxDyn(&[2, 4]));
        let batch = Batch::new(inputs, Targets::Soft(Array2::zeros((2, 3)))).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_to_soft_smoothing() {
        let targets = Targets::Hard(array![1, 0]);
        let soft = targets.to_soft(4, 0.1).unwrap();
        assert_abs_diff_eq!(soft[[0, 1]], 0.925, epsilon = 1e-6);
        assert_abs_diff_eq!(soft[[0, 0]], 0.025, epsilon = 1e-6);
        for row in soft.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_to_soft_out_of_range_label() {
        let targets = Targets::Hard(array![5]);
        assert!(targets.to_soft(3, 0.0).is_err());
    }
}
