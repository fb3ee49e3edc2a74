//! Gradient scaler for mixed-precision training.

use super::Precision;
use crate::nn::{BackwardOptions, Model, OutputGrad};
use crate::optim::{clip_grad_norm, grad_norm, Optimizer};
use crate::Result;

/// Default number of successful steps before the loss scale is increased
const DEFAULT_SCALE_GROWTH_INTERVAL: usize = 2000;

/// Outcome of one scaled optimization step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Gradient L2 norm before clipping (non-finite on overflow)
    pub grad_norm: f32,
    /// Whether the optimizer step was skipped because of overflow
    pub skipped: bool,
    /// Loss scale used for this step
    pub scale: f32,
}

/// Scaled backward pass followed by an optimizer step
pub trait LossScaler {
    /// Current loss scale
    fn scale(&self) -> f32;

    /// Backpropagate `grad` (d loss / d outputs) with loss scaling, clip the
    /// gradient norm when `clip_grad` is set, then step the optimizer.
    fn backward_and_step(
        &mut self,
        grad: &OutputGrad,
        model: &mut dyn Model,
        optimizer: &mut dyn Optimizer,
        clip_grad: Option<f32>,
        create_graph: bool,
    ) -> Result<StepReport>;
}

/// Dynamic gradient scaler
///
/// Multiplies the loss gradient by `scale` before backward, unscales the
/// parameter gradients afterwards, and skips the optimizer step when any
/// gradient overflowed. The scale halves on overflow and doubles after
/// `growth_interval` clean steps.
#[derive(Debug, Clone)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: usize,
    steps_since_growth: usize,
    enabled: bool,
    overflow_count: usize,
    successful_steps: usize,
}

impl GradScaler {
    /// Create a new gradient scaler
    pub fn new(initial_scale: f32) -> Self {
        Self {
            scale: initial_scale,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: DEFAULT_SCALE_GROWTH_INTERVAL,
            steps_since_growth: 0,
            enabled: true,
            overflow_count: 0,
            successful_steps: 0,
        }
    }

    /// Scaler that passes gradients through unchanged
    pub fn disabled() -> Self {
        Self {
            scale: 1.0,
            enabled: false,
            ..Self::new(1.0)
        }
    }

    /// Scaling is only needed for fp16, whose exponent range underflows
    pub fn for_precision(precision: Precision) -> Self {
        match precision {
            Precision::Fp16 => Self::default(),
            Precision::Fp32 | Precision::Bf16 => Self::disabled(),
        }
    }

    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.growth_interval = interval.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    pub fn successful_steps(&self) -> usize {
        self.successful_steps
    }

    /// Update the scale after a step
    pub fn update(&mut self, found_inf: bool) {
        if !self.enabled {
            return;
        }

        if found_inf {
            self.overflow_count += 1;
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.steps_since_growth = 0;
            tracing::warn!(scale = self.scale, "gradient overflow, reducing loss scale");
        } else {
            self.successful_steps += 1;
            self.steps_since_growth += 1;
            if self.steps_since_growth >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_growth = 0;
                tracing::debug!(scale = self.scale, "growing loss scale");
            }
        }
    }

    /// Divide every parameter gradient by the scale; returns true on overflow
    fn unscale(&self, model: &mut dyn Model) -> bool {
        let inv_scale = 1.0 / self.scale;
        let mut found_inf = false;
        for p in model.parameters_mut() {
            if let Some(g) = p.grad_mut() {
                g.mapv_inplace(|v| v * inv_scale);
                found_inf |= g.iter().any(|v| !v.is_finite());
            }
        }
        found_inf
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(65536.0)
    }
}

impl LossScaler for GradScaler {
    fn scale(&self) -> f32 {
        self.scale
    }

    fn backward_and_step(
        &mut self,
        grad: &OutputGrad,
        model: &mut dyn Model,
        optimizer: &mut dyn Optimizer,
        clip_grad: Option<f32>,
        create_graph: bool,
    ) -> Result<StepReport> {
        let scale = self.scale;
        let options = BackwardOptions { create_graph };

        if !self.enabled {
            model.backward(grad, options)?;
            let norm = match clip_grad {
                Some(max_norm) => clip_grad_norm(model.parameters_mut(), max_norm),
                None => grad_norm(model.parameters()),
            };
            optimizer.step(model.parameters_mut());
            return Ok(StepReport {
                grad_norm: norm,
                skipped: false,
                scale,
            });
        }

        model.backward(&grad.scaled(scale), options)?;
        if self.unscale(model) {
            optimizer.zero_grad(model.parameters_mut());
            self.update(true);
            return Ok(StepReport {
                grad_norm: f32::INFINITY,
                skipped: true,
                scale,
            });
        }

        let norm = match clip_grad {
            Some(max_norm) => clip_grad_norm(model.parameters_mut(), max_norm),
            None => grad_norm(model.parameters()),
        };
        optimizer.step(model.parameters_mut());
        self.update(false);

        Ok(StepReport {
            grad_norm: norm,
            skipped: false,
            scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{ForwardContext, LinearClassifier};
    use crate::optim::SGD;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, ArrayD};

    fn forward(model: &mut LinearClassifier) {
        let inputs: ArrayD<f32> = array![[1.0_f32, 2.0], [0.0, -1.0]].into_dyn();
        let mut ctx = ForwardContext::new(Precision::Fp32);
        model.forward(&inputs, &mut ctx).unwrap();
    }

    fn unit_grad() -> OutputGrad {
        OutputGrad {
            logits: array![[0.5, -0.5], [0.25, -0.25]],
            dist_logits: None,
        }
    }

    #[test]
    fn test_scaled_step_matches_unscaled() {
        let mut scaled_model = LinearClassifier::new(2, 2, 3);
        let mut plain_model = LinearClassifier::new(2, 2, 3);
        forward(&mut scaled_model);
        forward(&mut plain_model);

        let mut scaler = GradScaler::new(1024.0);
        let mut plain = GradScaler::disabled();
        let mut opt_a = SGD::new(0.1, 0.0);
        let mut opt_b = SGD::new(0.1, 0.0);

        let a = scaler
            .backward_and_step(&unit_grad(), &mut scaled_model, &mut opt_a, None, false)
            .unwrap();
        let b = plain
            .backward_and_step(&unit_grad(), &mut plain_model, &mut opt_b, None, false)
            .unwrap();

        assert!(!a.skipped);
        assert_eq!(a.scale, 1024.0);
        assert_eq!(b.scale, 1.0);
        assert_abs_diff_eq!(a.grad_norm, b.grad_norm, epsilon = 1e-5);
        for (pa, pb) in scaled_model.parameters().iter().zip(plain_model.parameters()) {
            for (x, y) in pa.data().iter().zip(pb.data().iter()) {
                assert_abs_diff_eq!(x, y, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_overflow_skips_step_and_backs_off() {
        let mut model = LinearClassifier::new(2, 2, 0);
        forward(&mut model);
        let before = model.parameters()[0].data().clone();

        let huge = OutputGrad {
            logits: array![[4.0, -4.0], [1.0, -1.0]],
            dist_logits: None,
        };
        let mut scaler = GradScaler::new(f32::MAX);
        let mut opt = SGD::new(0.1, 0.0);
        let report = scaler
            .backward_and_step(&huge, &mut model, &mut opt, Some(1.0), false)
            .unwrap();

        assert!(report.skipped);
        assert_eq!(scaler.overflow_count(), 1);
        assert!(scaler.scale() < f32::MAX);
        assert_eq!(model.parameters()[0].data(), &before);
        assert!(model.parameters()[0].grad().is_none());
    }

    #[test]
    fn test_scale_grows_after_interval() {
        let mut scaler = GradScaler::new(2.0).with_growth_interval(2);
        scaler.update(false);
        assert_eq!(scaler.scale(), 2.0);
        scaler.update(false);
        assert_eq!(scaler.scale(), 4.0);
        scaler.update(true);
        assert_eq!(scaler.scale(), 2.0);
        assert_eq!(scaler.successful_steps(), 2);
    }

    #[test]
    fn test_scale_floor() {
        let mut scaler = GradScaler::new(1.0);
        scaler.update(true);
        assert_eq!(scaler.scale(), 1.0);
    }

    #[test]
    fn test_for_precision() {
        assert!(GradScaler::for_precision(Precision::Fp16).is_enabled());
        assert!(!GradScaler::for_precision(Precision::Bf16).is_enabled());
        assert_eq!(GradScaler::for_precision(Precision::Fp32).scale(), 1.0);
    }
}
