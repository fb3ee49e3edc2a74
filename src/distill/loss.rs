//! Distillation loss functions

use super::criterion::{log_softmax_2d, soft_cross_entropy, BaseCriterion};
use super::Teacher;
use crate::data::Targets;
use crate::error::{Error, Result};
use crate::nn::{ModelOutput, OutputGrad};
use ndarray::{Array1, Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar loss together with its gradient with respect to the model outputs
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f32,
    pub grad: OutputGrad,
}

/// Loss of the form `(inputs, outputs, targets) -> scalar`
pub trait Criterion {
    fn forward(
        &mut self,
        inputs: &ArrayD<f32>,
        outputs: &ModelOutput,
        targets: &Targets,
    ) -> Result<LossOutput>;
}

impl Criterion for BaseCriterion {
    fn forward(
        &mut self,
        _inputs: &ArrayD<f32>,
        outputs: &ModelOutput,
        targets: &Targets,
    ) -> Result<LossOutput> {
        let out = self.loss(&outputs.logits, targets)?;
        Ok(LossOutput {
            value: out.value,
            grad: OutputGrad {
                logits: out.grad,
                dist_logits: None,
            },
        })
    }
}

/// How the distillation head is supervised by the teacher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistillationKind {
    /// Base loss only
    #[default]
    None,
    /// Temperature-scaled KL divergence against the teacher distribution
    Soft,
    /// Cross-entropy against the teacher's argmax
    Hard,
}

impl fmt::Display for DistillationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistillationKind::None => "none",
            DistillationKind::Soft => "soft",
            DistillationKind::Hard => "hard",
        };
        write!(f, "{name}")
    }
}

/// Knowledge Distillation Loss
///
/// Supervises the class head with the base criterion and the distillation
/// head with the teacher's predictions.
///
/// # Formula
///
/// ```text
/// soft: L_dist = τ² / numel · Σ KL(log_softmax(t/τ) || log_softmax(s/τ))
/// hard: L_dist = CE(s, argmax t)
/// L = (1-α) · L_base + α · L_dist
/// ```
///
/// where `s` are the distillation-head logits and `t` the teacher logits.
pub struct DistillationLoss {
    base: BaseCriterion,
    teacher: Option<Box<dyn Teacher>>,
    kind: DistillationKind,
    alpha: f32,
    tau: f32,
}

impl DistillationLoss {
    /// Loss that only applies the base criterion
    pub fn base_only(base: BaseCriterion) -> Self {
        Self {
            base,
            teacher: None,
            kind: DistillationKind::None,
            alpha: 0.0,
            tau: 1.0,
        }
    }

    /// Create a distillation loss
    ///
    /// `alpha` must be in [0, 1] and `tau` positive. Soft and hard
    /// distillation need a teacher.
    pub fn new(
        base: BaseCriterion,
        teacher: Option<Box<dyn Teacher>>,
        kind: DistillationKind,
        alpha: f32,
        tau: f32,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidParameter(format!(
                "alpha must be in [0, 1], got {alpha}"
            )));
        }
        if tau <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "tau must be positive, got {tau}"
            )));
        }
        if kind != DistillationKind::None && teacher.is_none() {
            return Err(Error::InvalidParameter(format!(
                "{kind} distillation needs a teacher model"
            )));
        }
        Ok(Self {
            base,
            teacher,
            kind,
            alpha,
            tau,
        })
    }

    pub fn kind(&self) -> DistillationKind {
        self.kind
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn tau(&self) -> f32 {
        self.tau
    }

    pub fn base(&self) -> BaseCriterion {
        self.base
    }

    /// Distillation-head logits paired with the teacher's logits for the same inputs
    fn student_and_teacher<'a>(
        &mut self,
        inputs: &ArrayD<f32>,
        outputs: &'a ModelOutput,
    ) -> Result<(&'a Array2<f32>, Array2<f32>)> {
        let student = outputs.dist_logits.as_ref().ok_or_else(|| {
            Error::InvalidParameter(
                "when knowledge distillation is enabled, the model is expected to return \
                 class and distillation logits"
                    .into(),
            )
        })?;
        let teacher = self
            .teacher
            .as_mut()
            .ok_or_else(|| Error::InvalidParameter("distillation needs a teacher model".into()))?
            .predict(inputs)?;
        if teacher.shape() != student.shape() {
            return Err(Error::shape(student.shape(), teacher.shape()));
        }
        Ok((student, teacher))
    }

    /// Soft distillation term and its gradient with respect to `student`
    fn soft_term(&self, student: &Array2<f32>, teacher: &Array2<f32>) -> (f32, Array2<f32>) {
        let t = self.tau;
        let numel = student.len() as f32;
        let log_s = log_softmax_2d(&(student / t));
        let log_t = log_softmax_2d(&(teacher / t));
        let p_t = log_t.mapv(f32::exp);

        let kl = (&p_t * &(&log_t - &log_s)).sum();
        let value = kl * t * t / numel;
        let grad = (log_s.mapv(f32::exp) - &p_t) * (t / numel);
        (value, grad)
    }

    fn hard_term(&self, student: &Array2<f32>, teacher: &Array2<f32>) -> Result<(f32, Array2<f32>)> {
        let labels: Array1<usize> = teacher.map_axis(Axis(1), |row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 {
                        (i, v)
                    } else {
                        best
                    }
                })
                .0
        });
        let targets = Targets::Hard(labels).to_soft(student.ncols(), 0.0)?;
        let out = soft_cross_entropy(student, &targets);
        Ok((out.value, out.grad))
    }
}

impl Criterion for DistillationLoss {
    fn forward(
        &mut self,
        inputs: &ArrayD<f32>,
        outputs: &ModelOutput,
        targets: &Targets,
    ) -> Result<LossOutput> {
        let base = self.base.loss(&outputs.logits, targets)?;
        let (dist_value, dist_grad) = match self.kind {
            DistillationKind::None => {
                return Ok(LossOutput {
                    value: base.value,
                    grad: OutputGrad {
                        logits: base.grad,
                        dist_logits: None,
                    },
                })
            }
            DistillationKind::Soft => {
                let (student, teacher) = self.student_and_teacher(inputs, outputs)?;
                self.soft_term(student, &teacher)
            }
            DistillationKind::Hard => {
                let (student, teacher) = self.student_and_teacher(inputs, outputs)?;
                self.hard_term(student, &teacher)?
            }
        };

        let alpha = self.alpha;
        Ok(LossOutput {
            value: base.value * (1.0 - alpha) + dist_value * alpha,
            grad: OutputGrad {
                logits: base.grad * (1.0 - alpha),
                dist_logits: Some(dist_grad * alpha),
            },
        })
    }
}
