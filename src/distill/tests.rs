//! Property-based tests for distillation

use super::*;
use crate::data::Targets;
use crate::error::Error;
use crate::nn::ModelOutput;
use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, ArrayD, IxDyn};
use proptest::prelude::*;

/// Teacher returning fixed logits regardless of input
struct FixedTeacher(Array2<f32>);

impl Teacher for FixedTeacher {
    fn predict(&mut self, _inputs: &ArrayD<f32>) -> crate::Result<Array2<f32>> {
        Ok(self.0.clone())
    }
}

// Helper to generate random logits
fn logits_strategy(batch_size: usize, num_classes: usize) -> impl Strategy<Value = Array2<f32>> {
    prop::collection::vec(
        prop::collection::vec(-10.0f32..10.0, num_classes),
        batch_size,
    )
    .prop_map(move |data| {
        let flat: Vec<f32> = data.into_iter().flatten().collect();
        Array2::from_shape_vec((batch_size, num_classes), flat).unwrap()
    })
}

fn inputs() -> ArrayD<f32> {
    ArrayD::zeros(IxDyn(&[2, 4]))
}

fn loss_with(kind: DistillationKind, alpha: f32, tau: f32, teacher: Array2<f32>) -> DistillationLoss {
    DistillationLoss::new(
        BaseCriterion::CrossEntropy,
        Some(Box::new(FixedTeacher(teacher))),
        kind,
        alpha,
        tau,
    )
    .unwrap()
}

#[test]
fn test_none_ignores_dist_head() {
    let mut loss_fn = DistillationLoss::base_only(BaseCriterion::CrossEntropy);
    let outputs = ModelOutput::with_dist(Array2::zeros((2, 3)), array![[9.0, 0.0, 0.0], [0.0, 9.0, 0.0]]);
    let out = loss_fn
        .forward(&inputs(), &outputs, &Targets::Hard(array![0, 1]))
        .unwrap();
    assert_abs_diff_eq!(out.value, 3.0_f32.ln(), epsilon = 1e-6);
    assert!(out.grad.dist_logits.is_none());
}

#[test]
fn test_soft_matches_identical_teacher() {
    let student = array![[1.0, 2.0, 0.5], [0.0, -1.0, 3.0]];
    let mut loss_fn = loss_with(DistillationKind::Soft, 1.0, 3.0, student.clone());
    let outputs = ModelOutput::with_dist(student.clone(), student);
    let out = loss_fn
        .forward(&inputs(), &outputs, &Targets::Hard(array![1, 2]))
        .unwrap();

    // α = 1 and the teacher agrees with the student: KL term vanishes
    assert_abs_diff_eq!(out.value, 0.0, epsilon = 1e-6);
    for g in out.grad.dist_logits.unwrap().iter() {
        assert_abs_diff_eq!(*g, 0.0, epsilon = 1e-6);
    }
    for g in out.grad.logits.iter() {
        assert_abs_diff_eq!(*g, 0.0, epsilon = 1e-6);
    }
}

#[test]
fn test_hard_uses_teacher_argmax() {
    let teacher = array![[0.0, 5.0, 0.0], [3.0, 0.0, 0.0]];
    let mut loss_fn = loss_with(DistillationKind::Hard, 1.0, 1.0, teacher);
    let dist = Array2::zeros((2, 3));
    let outputs = ModelOutput::with_dist(Array2::zeros((2, 3)), dist);
    let out = loss_fn
        .forward(&inputs(), &outputs, &Targets::Hard(array![2, 2]))
        .unwrap();

    assert_abs_diff_eq!(out.value, 3.0_f32.ln(), epsilon = 1e-6);
    let grad = out.grad.dist_logits.unwrap();
    assert!(grad[[0, 1]] < 0.0);
    assert!(grad[[1, 0]] < 0.0);
    assert!(grad[[0, 2]] > 0.0);
}

#[test]
fn test_distillation_requires_dist_head() {
    let mut loss_fn = loss_with(DistillationKind::Soft, 0.5, 1.0, Array2::zeros((2, 3)));
    let outputs = ModelOutput::new(Array2::zeros((2, 3)));
    let result = loss_fn.forward(&inputs(), &outputs, &Targets::Hard(array![0, 1]));
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[test]
fn test_new_validates_arguments() {
    let teacher = || Some(Box::new(FixedTeacher(Array2::zeros((1, 1)))) as Box<dyn Teacher>);
    assert!(DistillationLoss::new(BaseCriterion::CrossEntropy, teacher(), DistillationKind::Soft, 1.5, 1.0).is_err());
    assert!(DistillationLoss::new(BaseCriterion::CrossEntropy, teacher(), DistillationKind::Soft, 0.5, 0.0).is_err());
    assert!(DistillationLoss::new(BaseCriterion::CrossEntropy, None, DistillationKind::Hard, 0.5, 1.0).is_err());
    assert!(DistillationLoss::new(BaseCriterion::CrossEntropy, None, DistillationKind::None, 0.5, 1.0).is_ok());
}

#[test]
fn test_soft_gradient_matches_finite_difference() {
    let teacher = array![[0.3, -1.2, 2.0]];
    let student = array![[1.0_f32, 0.4, -0.7]];
    let mut loss_fn = loss_with(DistillationKind::Soft, 1.0, 2.0, teacher);
    let x = ArrayD::zeros(IxDyn(&[1, 4]));
    let labels = Targets::Hard(array![0]);
    let zeros = Array2::zeros((1, 3));

    let grad = loss_fn
        .forward(&x, &ModelOutput::with_dist(zeros.clone(), student.clone()), &labels)
        .unwrap()
        .grad
        .dist_logits
        .unwrap();

    let eps = 1e-2;
    for c in 0..3 {
        let mut plus = student.clone();
        plus[[0, c]] += eps;
        let mut minus = student.clone();
        minus[[0, c]] -= eps;
        let f_plus = loss_fn
            .forward(&x, &ModelOutput::with_dist(zeros.clone(), plus), &labels)
            .unwrap()
            .value;
        let f_minus = loss_fn
            .forward(&x, &ModelOutput::with_dist(zeros.clone(), minus), &labels)
            .unwrap()
            .value;
        assert_abs_diff_eq!(grad[[0, c]], (f_plus - f_minus) / (2.0 * eps), epsilon = 2e-3);
    }
}

proptest! {
    /// Distillation loss should always be non-negative
    #[test]
    fn prop_distillation_loss_non_negative(
        tau in 0.5f32..10.0,
        alpha in 0.0f32..=1.0,
        student in logits_strategy(2, 3),
        teacher in logits_strategy(2, 3),
    ) {
        let mut loss_fn = loss_with(DistillationKind::Soft, alpha, tau, teacher);
        let outputs = ModelOutput::with_dist(student.clone(), student);
        let out = loss_fn.forward(&inputs(), &outputs, &Targets::Hard(array![0, 1])).unwrap();

        prop_assert!(out.value >= -1e-5);
        prop_assert!(out.value.is_finite());
    }

    /// When alpha=0, the loss equals the base loss (independent of teacher)
    #[test]
    fn prop_alpha_zero_ignores_teacher(
        student in logits_strategy(2, 3),
        teacher in logits_strategy(2, 3),
    ) {
        let targets = Targets::Hard(array![0, 2]);
        let outputs = ModelOutput::with_dist(student.clone(), student.clone());
        let base = BaseCriterion::CrossEntropy.loss(&student, &targets).unwrap().value;

        let mut loss_fn = loss_with(DistillationKind::Hard, 0.0, 1.0, teacher);
        let out = loss_fn.forward(&inputs(), &outputs, &targets).unwrap();
        prop_assert!((out.value - base).abs() < 1e-5);
    }

    /// Total is the α-weighted blend of the base and distillation terms
    #[test]
    fn prop_alpha_interpolates(
        alpha in 0.0f32..=1.0,
        student in logits_strategy(2, 4),
        teacher in logits_strategy(2, 4),
    ) {
        let targets = Targets::Hard(array![1, 3]);
        let outputs = ModelOutput::with_dist(student.clone(), student.clone());

        let at = |a: f32| {
            let mut f = loss_with(DistillationKind::Soft, a, 2.0, teacher.clone());
            f.forward(&inputs(), &outputs, &targets).unwrap().value
        };
        let expected = at(0.0) * (1.0 - alpha) + at(1.0) * alpha;
        prop_assert!((at(alpha) - expected).abs() < 1e-4);
    }
}
