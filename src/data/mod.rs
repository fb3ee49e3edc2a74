//! Batches, datasets, loaders and batch mixing

mod batch;
mod dataset;
mod loader;
mod mixup;

pub use batch::{Batch, Targets};
pub use dataset::{ImageDataset, InMemoryDataset, SyntheticConfig};
pub use loader::{Batches, DataLoader, Normalize, IMAGENET_DEFAULT_MEAN, IMAGENET_DEFAULT_STD};
pub use mixup::{BatchMixer, Mixup, MixupConfig};
