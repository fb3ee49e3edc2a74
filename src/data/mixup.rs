//! Mixup and CutMix batch augmentation

use super::{Batch, Targets};
use crate::error::{Error, Result};
use ndarray::{s, Array2, ArrayD, Axis, Ix4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Beta;
use serde::{Deserialize, Serialize};

/// Transform blending inputs and labels across the samples of a batch
pub trait BatchMixer {
    fn mix(&mut self, batch: Batch) -> Result<Batch>;
}

/// Mixup/CutMix settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixupConfig {
    /// Beta distribution parameter for mixup (0 disables)
    pub mixup_alpha: f32,
    /// Beta distribution parameter for cutmix (0 disables)
    pub cutmix_alpha: f32,
    /// Probability of mixing a given batch
    pub prob: f32,
    /// Probability of cutmix over mixup when both are enabled
    pub switch_prob: f32,
    pub label_smoothing: f32,
    pub num_classes: usize,
}

impl Default for MixupConfig {
    fn default() -> Self {
        Self {
            mixup_alpha: 0.8,
            cutmix_alpha: 1.0,
            prob: 1.0,
            switch_prob: 0.5,
            label_smoothing: 0.1,
            num_classes: 1000,
        }
    }
}

impl MixupConfig {
    /// Whether any mixing can happen with these settings
    pub fn is_active(&self) -> bool {
        self.prob > 0.0 && (self.mixup_alpha > 0.0 || self.cutmix_alpha > 0.0)
    }
}

/// Batch-wise mixup/cutmix
///
/// One mixing factor λ is drawn per batch and every sample is blended with
/// its mirror in the flipped batch. Labels become smoothed soft targets
/// `λ·y + (1-λ)·y_flipped`.
#[derive(Debug, Clone)]
pub struct Mixup {
    config: MixupConfig,
    rng: StdRng,
}

impl Mixup {
    pub fn new(config: MixupConfig, seed: u64) -> Result<Self> {
        if !config.is_active() {
            return Err(Error::InvalidParameter(
                "mixup needs prob > 0 and mixup_alpha or cutmix_alpha > 0".into(),
            ));
        }
        if config.num_classes == 0 {
            return Err(Error::InvalidParameter("mixup needs num_classes > 0".into()));
        }
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &MixupConfig {
        &self.config
    }

    fn sample_beta(&mut self, alpha: f32) -> Result<f32> {
        let beta = Beta::new(alpha, alpha)
            .map_err(|e| Error::InvalidParameter(format!("beta({alpha}, {alpha}): {e}")))?;
        Ok(self.rng.sample(beta))
    }

    /// Draw λ and whether to cut instead of blend
    fn params_per_batch(&mut self) -> Result<(f32, bool)> {
        if self.rng.random::<f32>() >= self.config.prob {
            return Ok((1.0, false));
        }
        let (mixup_alpha, cutmix_alpha) = (self.config.mixup_alpha, self.config.cutmix_alpha);
        if mixup_alpha > 0.0 && cutmix_alpha > 0.0 {
            let use_cutmix = self.rng.random::<f32>() < self.config.switch_prob;
            let alpha = if use_cutmix { cutmix_alpha } else { mixup_alpha };
            Ok((self.sample_beta(alpha)?, use_cutmix))
        } else if mixup_alpha > 0.0 {
            Ok((self.sample_beta(mixup_alpha)?, false))
        } else {
            Ok((self.sample_beta(cutmix_alpha)?, true))
        }
    }

    /// Random box covering `1 - λ` of the image, clipped to its bounds
    fn rand_bbox(&mut self, height: usize, width: usize, lam: f32) -> (usize, usize, usize, usize) {
        let ratio = (1.0 - lam).sqrt();
        let cut_h = (height as f32 * ratio) as usize;
        let cut_w = (width as f32 * ratio) as usize;
        let cy = self.rng.random_range(0..height);
        let cx = self.rng.random_range(0..width);
        let yl = cy.saturating_sub(cut_h / 2);
        let yh = (cy + cut_h / 2).min(height);
        let xl = cx.saturating_sub(cut_w / 2);
        let xh = (cx + cut_w / 2).min(width);
        (yl, yh, xl, xh)
    }

    fn blend(inputs: &mut ArrayD<f32>, lam: f32) {
        let flipped = inputs.slice_axis(Axis(0), ndarray::Slice::new(0, None, -1)).to_owned();
        inputs.zip_mut_with(&flipped, |x, &f| *x = *x * lam + f * (1.0 - lam));
    }

    /// Paste the box from the flipped batch; returns λ corrected for the clipped area
    fn cut(&mut self, inputs: &mut ArrayD<f32>, lam: f32) -> Result<f32> {
        let shape = inputs.shape().to_vec();
        let mut images = inputs.view_mut().into_dimensionality::<Ix4>().map_err(|_| {
            Error::InvalidParameter(format!(
                "cutmix expects [batch, channels, height, width] inputs, got {shape:?}"
            ))
        })?;
        let (height, width) = (shape[2], shape[3]);
        if height == 0 || width == 0 {
            return Err(Error::shape(&[shape[0], shape[1], 1, 1], &shape));
        }
        let (yl, yh, xl, xh) = self.rand_bbox(height, width, lam);

        let patch = images
            .slice(s![..;-1, .., yl..yh, xl..xh])
            .to_owned();
        images.slice_mut(s![.., .., yl..yh, xl..xh]).assign(&patch);

        let area = ((yh - yl) * (xh - xl)) as f32;
        Ok(1.0 - area / (height * width) as f32)
    }

    fn mix_targets(&self, targets: &Targets, lam: f32) -> Result<Array2<f32>> {
        let y1 = targets.to_soft(self.config.num_classes, self.config.label_smoothing)?;
        let y2 = y1.slice(s![..;-1, ..]);
        Ok(&y1 * lam + &(&y2 * (1.0 - lam)))
    }
}

impl BatchMixer for Mixup {
    fn mix(&mut self, batch: Batch) -> Result<Batch> {
        if batch.len() % 2 != 0 {
            return Err(Error::InvalidParameter(format!(
                "batch size should be even when using mixup, got {}",
                batch.len()
            )));
        }
        let Batch {
            mut inputs,
            targets,
        } = batch;

        let (mut lam, use_cutmix) = self.params_per_batch()?;
        if lam < 1.0 {
            if use_cutmix {
                lam = self.cut(&mut inputs, lam)?;
            } else {
                Self::blend(&mut inputs, lam);
            }
        }

        let soft = self.mix_targets(&targets, lam)?;
        Batch::new(inputs, Targets::Soft(soft))
    }
}
