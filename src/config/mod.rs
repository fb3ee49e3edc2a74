//! Declarative YAML configuration
//!
//! # Example
//!
//! ```yaml
//! train:
//!   epochs: 3
//!   lr: 0.0005
//!   optimizer: adamw
//!   precision: fp16
//!   model_ema: true
//!
//! mixup:
//!   mixup_alpha: 0.8
//!   cutmix_alpha: 1.0
//!   num_classes: 10
//!
//! distillation:
//!   kind: soft
//!   alpha: 0.5
//!   tau: 1.0
//!
//! visual:
//!   enabled: true
//!   output_dir: out/visual
//!
//! world_size: 2
//! ```

mod cli;
mod schema;
mod train;
mod validate;


pub use cli::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, PrecisionArg, RunArgs,
    ValidateArgs,
};
pub use schema::{DataSection, DistillationSection, EngineConfig, OptimizerKind, TrainSection};
pub use train::{load_config, run, run_from_yaml, EpochStats, RunSummary};
pub use validate::{validate_config, ValidationError};
