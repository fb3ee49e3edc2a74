//! Optimizers for training neural networks

mod adamw;
mod clip;
mod optimizer;
mod scheduler;
mod sgd;

pub use adamw::AdamW;
pub use clip::{clip_grad_norm, grad_norm};
pub use optimizer::{param_groups_weight_decay, Optimizer, ParamGroup, SecondOrder};
pub use scheduler::{LRScheduler, WarmupCosine};
pub use sgd::SGD;
