//! Knowledge Distillation
//!
//! DeiT-style distillation: the student's class head is trained against the
//! labels with a [`BaseCriterion`] while its distillation head follows a
//! frozen [`Teacher`].
//!
//! ## Features
//!
//! - **Soft distillation**: temperature-scaled KL divergence, scaled by τ²
//! - **Hard distillation**: cross-entropy against the teacher's argmax
//! - **Base criteria**: cross-entropy, label smoothing, soft-target cross-entropy
//!
//! ## Example
//!
//! ```
//! use destilar::data::Targets;
//! use destilar::distill::{BaseCriterion, Criterion, DistillationKind, DistillationLoss, FrozenTeacher};
//! use destilar::nn::{ForwardContext, LinearClassifier, Model};
//! use destilar::precision::Precision;
//! use ndarray::{array, ArrayD};
//!
//! let teacher = FrozenTeacher::new(LinearClassifier::new(4, 3, 7));
//! let mut loss_fn = DistillationLoss::new(
//!     BaseCriterion::CrossEntropy,
//!     Some(Box::new(teacher)),
//!     DistillationKind::Soft,
//!     0.5,
//!     3.0,
//! )
//! .unwrap();
//!
//! let mut student = LinearClassifier::new(4, 3, 0).with_distillation_head(1);
//! let inputs = ArrayD::ones(vec![2, 4]);
//! let outputs = student.forward(&inputs, &mut ForwardContext::new(Precision::Fp32)).unwrap();
//! let loss = loss_fn.forward(&inputs, &outputs, &Targets::Hard(array![0, 2])).unwrap();
//! assert!(loss.value > 0.0);
//! ```

mod criterion;
mod loss;
mod teacher;

#[cfg(test)]
mod tests;

pub use criterion::{log_softmax_2d, softmax_2d, BaseCriterion, CriterionOutput};
pub use loss::{Criterion, DistillationKind, DistillationLoss, LossOutput};
pub use teacher::{FrozenTeacher, Teacher};
