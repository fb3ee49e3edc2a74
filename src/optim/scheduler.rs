//! Learning rate schedulers

use super::Optimizer;
use std::f32::consts::PI;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Learning rate for the given epoch
    fn lr_at(&self, epoch: usize) -> f32;

    /// Apply the learning rate for `epoch` to every group of an optimizer
    fn apply(&self, optimizer: &mut dyn Optimizer, epoch: usize) {
        optimizer.set_lr(self.lr_at(epoch));
    }
}

/// Per-epoch cosine schedule with linear warmup
///
/// During the first `warmup_epochs` the rate rises linearly from `warmup_lr`
/// to `base_lr`; afterwards it follows
/// `min_lr + 0.5 * (base_lr - min_lr) * (1 + cos(π * t / T))`
/// over the remaining epochs.
#[derive(Debug, Clone)]
pub struct WarmupCosine {
    base_lr: f32,
    min_lr: f32,
    warmup_lr: f32,
    warmup_epochs: usize,
    total_epochs: usize,
}

impl WarmupCosine {
    pub fn new(base_lr: f32, min_lr: f32, total_epochs: usize) -> Self {
        Self {
            base_lr,
            min_lr,
            warmup_lr: base_lr,
            warmup_epochs: 0,
            total_epochs,
        }
    }

    pub fn with_warmup(mut self, warmup_lr: f32, warmup_epochs: usize) -> Self {
        self.warmup_lr = warmup_lr;
        self.warmup_epochs = warmup_epochs;
        self
    }
}

impl LRScheduler for WarmupCosine {
    fn lr_at(&self, epoch: usize) -> f32 {
        if epoch < self.warmup_epochs {
            let step = (self.base_lr - self.warmup_lr) / self.warmup_epochs as f32;
            return self.warmup_lr + epoch as f32 * step;
        }

        let t = epoch - self.warmup_epochs;
        let t_max = self.total_epochs.saturating_sub(self.warmup_epochs);
        if t >= t_max {
            return self.min_lr;
        }

        let progress = t as f32 / t_max as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.min_lr + (self.base_lr - self.min_lr) * cosine_decay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cosine_endpoints() {
        let s = WarmupCosine::new(1.0, 0.1, 100);
        assert_abs_diff_eq!(s.lr_at(0), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(s.lr_at(50), 0.55, epsilon = 1e-4);
        assert_abs_diff_eq!(s.lr_at(100), 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(s.lr_at(500), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_warmup_is_linear() {
        let s = WarmupCosine::new(1.0, 0.0, 20).with_warmup(0.0, 4);
        assert_abs_diff_eq!(s.lr_at(0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(s.lr_at(2), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(s.lr_at(4), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_decreases_after_warmup() {
        let s = WarmupCosine::new(1.0, 0.0, 30).with_warmup(0.01, 5);
        let mut prev = s.lr_at(5);
        for epoch in 6..40 {
            let lr = s.lr_at(epoch);
            assert!(lr <= prev, "epoch {epoch}: {lr} > {prev}");
            prev = lr;
        }
    }

    #[test]
    fn test_apply_to_optimizer() {
        use crate::optim::SGD;

        let mut optimizer = SGD::new(1.0, 0.0);
        let s = WarmupCosine::new(1.0, 0.0, 10);
        s.apply(&mut optimizer, 5);
        assert_abs_diff_eq!(optimizer.lr(), 0.5, epsilon = 1e-6);
    }
}
