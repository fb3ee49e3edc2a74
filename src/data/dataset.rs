//! Indexable image datasets

use crate::error::{Error, Result};
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Integer-indexable source of `(image, label)` pairs
///
/// Images are CHW with values in `[0, 1]`, before any normalization.
pub trait ImageDataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<(Array3<f32>, usize)>;
}

/// Settings for [`InMemoryDataset::synthetic`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub num_classes: usize,
    pub samples: usize,
    pub channels: usize,
    pub image_size: usize,
    pub noise: f32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_classes: 10,
            samples: 512,
            channels: 3,
            image_size: 16,
            noise: 0.05,
            seed: 42,
        }
    }
}

/// Dataset held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    images: Vec<Array3<f32>>,
    labels: Vec<usize>,
}

impl InMemoryDataset {
    /// Build a dataset; every image must share one shape
    pub fn new(images: Vec<Array3<f32>>, labels: Vec<usize>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(Error::shape(&[images.len()], &[labels.len()]));
        }
        if let Some(first) = images.first() {
            if let Some(bad) = images.iter().find(|img| img.shape() != first.shape()) {
                return Err(Error::shape(first.shape(), bad.shape()));
            }
        }
        Ok(Self { images, labels })
    }

    /// Seeded class-conditional blobs
    ///
    /// Each class owns a bright gaussian blob at a class-specific position and
    /// colour; samples add pixel noise and clamp to `[0, 1]`. Labels cycle
    /// through the classes so every shard sees all of them.
    pub fn synthetic(config: &SyntheticConfig) -> Result<Self> {
        if config.num_classes == 0 || config.image_size == 0 || config.channels == 0 {
            return Err(Error::InvalidParameter(format!(
                "synthetic dataset needs positive classes, channels and size: {config:?}"
            )));
        }
        let noise = Normal::new(0.0_f32, config.noise.max(0.0))
            .map_err(|e| Error::InvalidParameter(format!("noise: {e}")))?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let size = config.image_size as f32;
        let sigma = (size / 6.0).max(1.0);
        let prototypes: Vec<Array3<f32>> = (0..config.num_classes)
            .map(|class| {
                let angle = class as f32 / config.num_classes as f32 * std::f32::consts::TAU;
                let cy = size / 2.0 + angle.sin() * size / 4.0;
                let cx = size / 2.0 + angle.cos() * size / 4.0;
                Array3::from_shape_fn(
                    (config.channels, config.image_size, config.image_size),
                    |(c, y, x)| {
                        let d2 = (y as f32 - cy).powi(2) + (x as f32 - cx).powi(2);
                        let tint = 0.5 + 0.5 * ((class + c) % 2) as f32;
                        tint * (-d2 / (2.0 * sigma * sigma)).exp()
                    },
                )
            })
            .collect();

        let mut images = Vec::with_capacity(config.samples);
        let mut labels = Vec::with_capacity(config.samples);
        for i in 0..config.samples {
            let label = i % config.num_classes;
            let image = prototypes[label].mapv(|v| (v + rng.sample(noise)).clamp(0.0, 1.0));
            images.push(image);
            labels.push(label);
        }
        Self::new(images, labels)
    }

    /// Shape of every image, if the dataset is non-empty
    pub fn image_shape(&self) -> Option<&[usize]> {
        self.images.first().map(|img| img.shape())
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl ImageDataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn get(&self, index: usize) -> Result<(Array3<f32>, usize)> {
        match (self.images.get(index), self.labels.get(index)) {
            (Some(image), Some(&label)) => Ok((image.clone(), label)),
            _ => Err(Error::DatasetIndex {
                index,
                len: self.images.len(),
            }),
        }
    }
}
