//! Classification criteria used underneath distillation

use crate::data::Targets;
use crate::error::{Error, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Compute softmax along last axis for 2D array
///
/// softmax(x)_i = exp(x_i) / Σ exp(x_j)
pub fn softmax_2d(x: &Array2<f32>) -> Array2<f32> {
    let mut result = x.clone();

    for mut row in result.axis_iter_mut(Axis(0)) {
        // Subtract max for numerical stability
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max_val).exp());

        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    result
}

/// Log-softmax along the last axis
pub fn log_softmax_2d(x: &Array2<f32>) -> Array2<f32> {
    let mut result = x.clone();

    for mut row in result.axis_iter_mut(Axis(0)) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f32>().ln() + max_val;
        row.mapv_inplace(|v| v - log_sum);
    }

    result
}

/// Mean loss over the batch and its gradient with respect to the logits
#[derive(Debug, Clone)]
pub struct CriterionOutput {
    pub value: f32,
    pub grad: Array2<f32>,
}

/// Base classification criterion applied to the class head
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseCriterion {
    /// Cross-entropy against hard labels or probability targets
    #[default]
    CrossEntropy,
    /// Cross-entropy against smoothed one-hot labels
    LabelSmoothingCrossEntropy { smoothing: f32 },
    /// Cross-entropy against mixed soft targets
    SoftTargetCrossEntropy,
}

impl BaseCriterion {
    /// Pick the criterion for a training setup: soft targets when batches are
    /// mixed, label smoothing when requested, plain cross-entropy otherwise.
    pub fn for_training(mixing: bool, smoothing: f32) -> Self {
        if mixing {
            BaseCriterion::SoftTargetCrossEntropy
        } else if smoothing > 0.0 {
            BaseCriterion::LabelSmoothingCrossEntropy { smoothing }
        } else {
            BaseCriterion::CrossEntropy
        }
    }

    pub fn loss(&self, logits: &Array2<f32>, targets: &Targets) -> Result<CriterionOutput> {
        if logits.nrows() != targets.len() {
            return Err(Error::shape(&[targets.len(), logits.ncols()], logits.shape()));
        }
        if logits.nrows() == 0 {
            return Err(Error::InvalidParameter("criterion called on an empty batch".into()));
        }

        let num_classes = logits.ncols();
        let target_probs = match (self, targets) {
            (BaseCriterion::CrossEntropy, _) => targets.to_soft(num_classes, 0.0)?,
            (BaseCriterion::LabelSmoothingCrossEntropy { smoothing }, Targets::Hard(_)) => {
                targets.to_soft(num_classes, *smoothing)?
            }
            (BaseCriterion::LabelSmoothingCrossEntropy { .. }, Targets::Soft(_)) => {
                return Err(Error::InvalidParameter(
                    "label smoothing expects hard labels; use soft-target cross-entropy with mixup"
                        .into(),
                ))
            }
            (BaseCriterion::SoftTargetCrossEntropy, _) => targets.to_soft(num_classes, 0.0)?,
        };

        Ok(soft_cross_entropy(logits, &target_probs))
    }
}

/// `mean_i Σ_c -t_ic log p_ic` with gradient `(p * Σt - t) / N`
pub(crate) fn soft_cross_entropy(logits: &Array2<f32>, targets: &Array2<f32>) -> CriterionOutput {
    let n = logits.nrows() as f32;
    let log_probs = log_softmax_2d(logits);
    let value = -(targets * &log_probs).sum() / n;

    let probs = log_probs.mapv(f32::exp);
    let mass = targets.sum_axis(Axis(1)).insert_axis(Axis(1));
    let grad = (probs * &mass - targets) / n;

    CriterionOutput { value, grad }
}
