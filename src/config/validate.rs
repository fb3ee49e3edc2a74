//! Configuration validation

use super::schema::EngineConfig;
use crate::distill::DistillationKind;

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid EMA decay: {0} (must be in [0, 1])")]
    InvalidEmaDecay(f32),

    #[error("Invalid world size: {0} (must be > 0)")]
    InvalidWorldSize(usize),

    #[error("Invalid dataset: {0}")]
    InvalidData(String),

    #[error("Mixup needs an even batch size, got {0}")]
    OddMixupBatch(usize),

    #[error("Mixup num_classes {mixup} does not match data num_classes {data}")]
    MixupClassMismatch { mixup: usize, data: usize },

    #[error("Invalid distillation alpha: {0} (must be in [0, 1])")]
    InvalidDistillationAlpha(f32),

    #[error("Invalid distillation tau: {0} (must be > 0.0)")]
    InvalidDistillationTau(f32),

    #[error("Invalid overlay alpha: {0} (must be in [0, 1])")]
    InvalidOverlayAlpha(f32),

    #[error("Invalid visualization grid: {0} (must be > 0)")]
    InvalidGrid(usize),
}

/// Validate a run configuration
///
/// Checks numeric ranges and the cross-section constraints the drivers rely
/// on: even batches under mixup, matching class counts, attention grids that
/// fit the evaluation batch.
pub fn validate_config(config: &EngineConfig) -> Result<(), ValidationError> {
    let train = &config.train;
    let data = &config.data;

    if train.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(train.epochs));
    }
    if train.lr <= 0.0 {
        return Err(ValidationError::InvalidLearningRate(train.lr));
    }
    if let Some(clip) = train.clip_grad {
        if clip <= 0.0 {
            return Err(ValidationError::InvalidGradClip(clip));
        }
    }
    if !(0.0..=1.0).contains(&train.model_ema_decay) {
        return Err(ValidationError::InvalidEmaDecay(train.model_ema_decay));
    }
    if config.world_size == 0 {
        return Err(ValidationError::InvalidWorldSize(config.world_size));
    }

    for batch_size in [data.batch_size, data.eval_batch_size] {
        if batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize(batch_size));
        }
    }
    if data.num_classes == 0 || data.image_size == 0 || data.channels == 0 {
        return Err(ValidationError::InvalidData(
            "num_classes, image_size and channels must be positive".into(),
        ));
    }
    if data.samples < data.batch_size * config.world_size {
        return Err(ValidationError::InvalidData(format!(
            "{} samples cannot fill one batch of {} on each of {} workers",
            data.samples, data.batch_size, config.world_size
        )));
    }

    if config.mixup.is_active() {
        if data.batch_size % 2 != 0 {
            return Err(ValidationError::OddMixupBatch(data.batch_size));
        }
        if config.mixup.num_classes != data.num_classes {
            return Err(ValidationError::MixupClassMismatch {
                mixup: config.mixup.num_classes,
                data: data.num_classes,
            });
        }
    }

    let dist = &config.distillation;
    if dist.kind != DistillationKind::None {
        if !(0.0..=1.0).contains(&dist.alpha) {
            return Err(ValidationError::InvalidDistillationAlpha(dist.alpha));
        }
        if dist.tau <= 0.0 {
            return Err(ValidationError::InvalidDistillationTau(dist.tau));
        }
    }

    let visual = &config.visual;
    if visual.enabled {
        if !(0.0..=1.0).contains(&visual.alpha) {
            return Err(ValidationError::InvalidOverlayAlpha(visual.alpha));
        }
        if visual.grid == 0 {
            return Err(ValidationError::InvalidGrid(visual.grid));
        }
    }

    Ok(())
}
