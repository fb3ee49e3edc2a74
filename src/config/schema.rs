//! YAML schema for a training run

use crate::data::{MixupConfig, SyntheticConfig};
use crate::distill::DistillationKind;
use crate::precision::Precision;
use crate::visual::VisualConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub train: TrainSection,
    pub mixup: MixupConfig,
    pub distillation: DistillationSection,
    pub visual: VisualConfig,
    pub data: DataSection,
    /// Number of in-process workers
    pub world_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            train: TrainSection::default(),
            mixup: MixupConfig {
                num_classes: DataSection::default().num_classes,
                ..MixupConfig::default()
            },
            distillation: DistillationSection::default(),
            visual: VisualConfig::default(),
            data: DataSection::default(),
            world_size: 1,
        }
    }
}

/// Optimizer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    #[default]
    AdamW,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "sgd"),
            OptimizerKind::AdamW => write!(f, "adamw"),
        }
    }
}

/// Optimization hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSection {
    pub epochs: usize,
    pub lr: f32,
    pub min_lr: f32,
    pub warmup_lr: f32,
    pub warmup_epochs: usize,
    pub weight_decay: f32,
    /// SGD only
    pub momentum: f32,
    pub optimizer: OptimizerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_grad: Option<f32>,
    /// Label smoothing when mixup is off
    pub smoothing: f32,
    pub print_freq: usize,
    pub precision: Precision,
    pub model_ema: bool,
    pub model_ema_decay: f32,
    pub set_training_mode: bool,
    /// Directory for `scalars.jsonl`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for TrainSection {
    fn default() -> Self {
        Self {
            epochs: 3,
            lr: 5e-4,
            min_lr: 1e-5,
            warmup_lr: 1e-6,
            warmup_epochs: 0,
            weight_decay: 0.05,
            momentum: 0.9,
            optimizer: OptimizerKind::default(),
            clip_grad: None,
            smoothing: 0.1,
            print_freq: 10,
            precision: Precision::default(),
            model_ema: true,
            model_ema_decay: 0.99996,
            set_training_mode: true,
            log_dir: None,
        }
    }
}

/// Knowledge distillation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillationSection {
    pub kind: DistillationKind,
    pub alpha: f32,
    pub tau: f32,
    /// Epochs spent fitting the teacher before the student run
    pub teacher_epochs: usize,
}

impl Default for DistillationSection {
    fn default() -> Self {
        Self {
            kind: DistillationKind::None,
            alpha: 0.5,
            tau: 1.0,
            teacher_epochs: 1,
        }
    }
}

/// Synthetic dataset and batching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub num_classes: usize,
    pub samples: usize,
    pub eval_samples: usize,
    pub image_size: usize,
    pub channels: usize,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub seed: u64,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            num_classes: 10,
            samples: 512,
            eval_samples: 256,
            image_size: 16,
            channels: 3,
            batch_size: 64,
            eval_batch_size: 128,
            seed: 42,
        }
    }
}

impl DataSection {
    pub fn train_dataset(&self) -> SyntheticConfig {
        SyntheticConfig {
            num_classes: self.num_classes,
            samples: self.samples,
            channels: self.channels,
            image_size: self.image_size,
            seed: self.seed,
            ..SyntheticConfig::default()
        }
    }

    /// Same class blobs as training, different noise
    pub fn eval_dataset(&self) -> SyntheticConfig {
        SyntheticConfig {
            samples: self.eval_samples,
            seed: self.seed.wrapping_add(1),
            ..self.train_dataset()
        }
    }

    /// Flattened input width
    pub fn input_features(&self) -> usize {
        self.channels * self.image_size * self.image_size
    }
}
