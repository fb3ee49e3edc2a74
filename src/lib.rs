//! # Destilar: distillation-aware training and evaluation drivers
//!
//! Destilar drives one epoch of training or one pass of evaluation for an
//! image classifier trained with knowledge distillation, mixed-precision
//! gradient scaling, an EMA shadow model and cross-worker metric reduction.
//! Evaluation can render attention maps captured during the forward pass
//! over the original images.
//!
//! ## Architecture
//!
//! - **engine**: `train_one_epoch` and `evaluate`
//! - **nn**: model trait, per-call forward context, reference classifier
//! - **capture**: activations recorded during a single forward pass
//! - **precision**: autocast rounding and the dynamic gradient scaler
//! - **optim**: SGD, AdamW, gradient clipping, warmup-cosine schedule
//! - **ema**: exponential moving average of parameters
//! - **distill**: base criteria and the distillation loss
//! - **data**: batches, datasets, sharded loader, mixup/cutmix
//! - **device** / **dist**: device fence and collective reductions
//! - **metrics**: smoothed meters, progress lines, accuracy, scalar sinks
//! - **visual**: attention reduction and PNG grid figures
//! - **config**: declarative YAML configuration and the CLI

pub mod capture;
pub mod config;
pub mod data;
pub mod device;
pub mod dist;
pub mod distill;
pub mod ema;
pub mod engine;
pub mod metrics;
pub mod nn;
pub mod optim;
pub mod precision;
pub mod visual;

pub mod error;

// Re-export commonly used types
pub use engine::{evaluate, train_one_epoch, EvalOptions, TrainOptions};
pub use error::{Error, Result};
