//! Batched, sharded iteration over an [`ImageDataset`]

use super::{Batch, ImageDataset, Targets};
use crate::error::{Error, Result};
use ndarray::{Array1, Array3, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// ImageNet channel means
pub const IMAGENET_DEFAULT_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_DEFAULT_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel `(x - mean) / std`
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(Error::shape(&[mean.len()], &[std.len()]));
        }
        if std.iter().any(|&s| s <= 0.0) {
            return Err(Error::InvalidParameter("normalization std must be positive".into()));
        }
        Ok(Self { mean, std })
    }

    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_DEFAULT_MEAN.to_vec(),
            std: IMAGENET_DEFAULT_STD.to_vec(),
        }
    }

    fn apply(&self, image: &mut Array3<f32>) -> Result<()> {
        if image.shape()[0] != self.mean.len() {
            return Err(Error::shape(&[self.mean.len()], &image.shape()[..1]));
        }
        for (mut channel, (&m, &s)) in image
            .axis_iter_mut(Axis(0))
            .zip(self.mean.iter().zip(&self.std))
        {
            channel.mapv_inplace(|v| (v - m) / s);
        }
        Ok(())
    }
}

/// Fixed-length batch source over one worker's shard of a dataset
///
/// Like a distributed sampler, the index list is padded by wrapping around
/// so every rank gets the same number of samples (and therefore batches).
pub struct DataLoader<'a, D: ImageDataset + ?Sized> {
    dataset: &'a D,
    batch_size: usize,
    rank: usize,
    world_size: usize,
    drop_last: bool,
    shuffle: Option<u64>,
    epoch: u64,
    normalize: Option<Normalize>,
}

impl<'a, D: ImageDataset + ?Sized> DataLoader<'a, D> {
    pub fn new(dataset: &'a D, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidParameter("batch_size must be positive".into()));
        }
        Ok(Self {
            dataset,
            batch_size,
            rank: 0,
            world_size: 1,
            drop_last: false,
            shuffle: None,
            epoch: 0,
            normalize: None,
        })
    }

    /// Restrict iteration to the shard owned by `rank`
    pub fn with_shard(mut self, rank: usize, world_size: usize) -> Result<Self> {
        if world_size == 0 || rank >= world_size {
            return Err(Error::InvalidParameter(format!(
                "invalid shard rank {rank} of world size {world_size}"
            )));
        }
        self.rank = rank;
        self.world_size = world_size;
        Ok(self)
    }

    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Shuffle with a seed that is combined with the epoch set by [`set_epoch`](Self::set_epoch)
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = Some(seed);
        self
    }

    pub fn with_normalize(mut self, normalize: Normalize) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether batch `k` holds dataset indices `k * batch_size ..` in order
    pub fn is_sequential(&self) -> bool {
        self.world_size == 1 && self.shuffle.is_none()
    }

    /// Samples in this rank's shard
    pub fn num_samples(&self) -> usize {
        self.dataset.len().div_ceil(self.world_size)
    }

    /// Number of batches one pass yields
    pub fn len(&self) -> usize {
        let n = self.num_samples();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_indices(&self) -> Vec<usize> {
        let len = self.dataset.len();
        if len == 0 {
            return Vec::new();
        }
        let mut order: Vec<usize> = (0..len).collect();
        if let Some(seed) = self.shuffle {
            order.shuffle(&mut StdRng::seed_from_u64(seed.wrapping_add(self.epoch)));
        }
        let total = self.num_samples() * self.world_size;
        (0..total)
            .map(|i| order[i % len])
            .skip(self.rank)
            .step_by(self.world_size)
            .collect()
    }

    /// Iterate over this epoch's batches
    pub fn iter(&self) -> Batches<'_, 'a, D> {
        let indices = self.shard_indices();
        Batches {
            loader: self,
            indices,
            next: 0,
            remaining: self.len(),
        }
    }

    fn load(&self, indices: &[usize]) -> Result<Batch> {
        let mut images = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        for &index in indices {
            let (mut image, label) = self.dataset.get(index)?;
            if let Some(normalize) = &self.normalize {
                normalize.apply(&mut image)?;
            }
            images.push(image);
            labels.push(label);
        }

        let views: Vec<ArrayView3<'_, f32>> = images.iter().map(|img| img.view()).collect();
        let inputs = ndarray::stack(Axis(0), &views).map_err(|_| {
            let first = images.first().map(|img| img.shape().to_vec()).unwrap_or_default();
            Error::shape(&first, &[])
        })?;
        Batch::new(inputs.into_dyn(), Targets::Hard(Array1::from(labels)))
    }
}

/// Iterator returned by [`DataLoader::iter`]
pub struct Batches<'l, 'a, D: ImageDataset + ?Sized> {
    loader: &'l DataLoader<'a, D>,
    indices: Vec<usize>,
    next: usize,
    remaining: usize,
}

impl<D: ImageDataset + ?Sized> Iterator for Batches<'_, '_, D> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let end = (self.next + self.loader.batch_size).min(self.indices.len());
        let chunk = &self.indices[self.next..end];
        self.next = end;
        self.remaining -= 1;
        Some(self.loader.load(chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<D: ImageDataset + ?Sized> ExactSizeIterator for Batches<'_, '_, D> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InMemoryDataset, SyntheticConfig};
    use approx::assert_abs_diff_eq;
    use std::collections::BTreeSet;

    fn dataset(samples: usize) -> InMemoryDataset {
        InMemoryDataset::synthetic(&SyntheticConfig {
            num_classes: 4,
            samples,
            channels: 3,
            image_size: 4,
            noise: 0.0,
            seed: 0,
        })
        .unwrap()
    }

    fn labels(batch: &Batch) -> Vec<usize> {
        batch.targets.as_hard().unwrap().to_vec()
    }

    #[test]
    fn test_batches_and_len() {
        let ds = dataset(10);
        let loader = DataLoader::new(&ds, 4).unwrap();
        assert_eq!(loader.len(), 3);
        let sizes: Vec<usize> = loader.iter().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let first = loader.iter().next().unwrap().unwrap();
        assert_eq!(first.inputs.shape(), &[4, 3, 4, 4]);
    }

    #[test]
    fn test_drop_last() {
        let ds = dataset(10);
        let loader = DataLoader::new(&ds, 4).unwrap().with_drop_last(true);
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.iter().count(), 2);
    }

    #[test]
    fn test_shards_are_interleaved_and_padded() {
        let ds = dataset(5);
        let a = DataLoader::new(&ds, 8).unwrap().with_shard(0, 2).unwrap();
        let b = DataLoader::new(&ds, 8).unwrap().with_shard(1, 2).unwrap();
        assert_eq!(a.len(), b.len());

        let la = labels(&a.iter().next().unwrap().unwrap());
        let lb = labels(&b.iter().next().unwrap().unwrap());
        // indices 0,2,4 and 1,3,0 (wrapped); labels cycle mod 4
        assert_eq!(la, vec![0, 2, 0]);
        assert_eq!(lb, vec![1, 3, 0]);
    }

    #[test]
    fn test_shuffle_covers_every_index() {
        let ds = dataset(12);
        let mut loader = DataLoader::new(&ds, 12).unwrap().with_shuffle(9);
        loader.set_epoch(3);
        let seen: BTreeSet<usize> = loader.shard_indices().into_iter().collect();
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn test_normalize() {
        let ds = dataset(2);
        let norm = Normalize::new(vec![0.5; 3], vec![0.5; 3]).unwrap();
        let loader = DataLoader::new(&ds, 2).unwrap().with_normalize(norm);
        let batch = loader.iter().next().unwrap().unwrap();
        let (raw, _) = ds.get(0).unwrap();
        assert_abs_diff_eq!(
            batch.inputs[[0, 1, 2, 2]],
            (raw[[1, 2, 2]] - 0.5) / 0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_exact_size() {
        let ds = dataset(9);
        let loader = DataLoader::new(&ds, 2).unwrap();
        let mut iter = loader.iter();
        assert_eq!(iter.len(), 5);
        iter.next();
        assert_eq!(iter.len(), 4);
    }

    #[test]
    fn test_invalid_shard() {
        let ds = dataset(4);
        assert!(DataLoader::new(&ds, 2).unwrap().with_shard(2, 2).is_err());
        assert!(DataLoader::new(&ds, 0).is_err());
    }
}
