//! DataLoader for batching and iterating over training data
//!
//! Provides batching for GAN training with support for:
//! - Random shuffling or a fixed sequential sampler
//! - Drop last incomplete batch
//! - Background decoding of upcoming batches into a bounded queue

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tch::{Device, Tensor};

use super::dataset::{Example, ImageFolder};
use crate::error::{Error, Result};

/// A batch of aligned samples
#[derive(Debug)]
pub struct Batch {
    /// `[B, 5, H, W]` sketch, texture patch and segment stack
    pub input: Tensor,
    /// `[B, 3, H, W]` target image
    pub target: Tensor,
    /// `[B, 3, H, W]` target texture
    pub texture: Tensor,
    /// `[B, 1, H, W]` segment mask
    pub segment: Tensor,
}

impl Batch {
    /// Stack examples along a new batch dimension
    pub fn stack(examples: &[Example]) -> Self {
        let input: Vec<&Tensor> = examples.iter().map(|e| &e.input).collect();
        let target: Vec<&Tensor> = examples.iter().map(|e| &e.target).collect();
        let texture: Vec<&Tensor> = examples.iter().map(|e| &e.texture).collect();
        let segment: Vec<&Tensor> = examples.iter().map(|e| &e.segment).collect();

        Self {
            input: Tensor::stack(&input, 0),
            target: Tensor::stack(&target, 0),
            texture: Tensor::stack(&texture, 0),
            segment: Tensor::stack(&segment, 0),
        }
    }

    /// Number of samples
    pub fn size(&self) -> i64 {
        self.input.size()[0]
    }

    /// Move every tensor to a device
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            input: self.input.to_device(device),
            target: self.target.to_device(device),
            texture: self.texture.to_device(device),
            segment: self.segment.to_device(device),
        }
    }
}

/// DataLoader for iterating over batched samples
pub struct DataLoader {
    /// Dataset shared with the producer threads
    dataset: Arc<ImageFolder>,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Whether to drop the last incomplete batch
    drop_last: bool,
    /// Batches decoded ahead
    prefetch: usize,
    /// Fixed sample order replacing the full index range
    sampler: Option<Vec<usize>>,
    /// Seed for shuffling and augmentation
    seed: Option<u64>,
    /// Epochs started so far
    epoch: u64,
}

impl DataLoader {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `dataset` - Image folder split
    /// * `batch_size` - Number of samples per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `drop_last` - Whether to drop incomplete final batch
    pub fn new(dataset: ImageFolder, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        Self {
            dataset: Arc::new(dataset),
            batch_size: batch_size.max(1),
            shuffle,
            drop_last,
            prefetch: 2,
            sampler: None,
            seed: None,
            epoch: 0,
        }
    }

    /// Set the number of batches decoded ahead
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Iterate over the given indices in order instead of the whole split
    pub fn with_sampler(mut self, indices: Vec<usize>) -> Self {
        self.sampler = Some(indices);
        self.shuffle = false;
        self
    }

    /// Make shuffling and augmentation reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.sampler
            .as_ref()
            .map(|s| s.len())
            .unwrap_or_else(|| self.dataset.len())
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.num_samples();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            (num_samples + self.batch_size - 1) / self.batch_size
        }
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Underlying dataset
    pub fn dataset(&self) -> &ImageFolder {
        &self.dataset
    }

    fn epoch_order(&self, rng: &mut StdRng) -> Vec<usize> {
        let mut order = self
            .sampler
            .clone()
            .unwrap_or_else(|| (0..self.dataset.len()).collect());
        if self.shuffle {
            order.shuffle(rng);
        }
        order
    }

    /// Start an epoch
    ///
    /// A producer thread decodes batches ahead of the consumer. The first
    /// failure ends the epoch and is yielded as the last item.
    pub fn iter(&mut self) -> BatchIter {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.epoch)),
            None => StdRng::from_entropy(),
        };
        self.epoch += 1;

        let order = self.epoch_order(&mut rng);
        let dataset = Arc::clone(&self.dataset);
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;
        let (sender, receiver) = mpsc::sync_channel(self.prefetch);

        let handle = thread::spawn(move || {
            for chunk in order.chunks(batch_size) {
                if drop_last && chunk.len() < batch_size {
                    break;
                }

                let examples: Result<Vec<Example>> =
                    chunk.iter().map(|&idx| dataset.get(idx, &mut rng)).collect();
                let item = examples.map(|ex| Batch::stack(&ex));
                let failed = item.is_err();

                if sender.send(item).is_err() || failed {
                    return;
                }
            }
        });

        BatchIter {
            receiver: Some(receiver),
            handle: Some(handle),
        }
    }
}

/// Iterator over the batches of one epoch
pub struct BatchIter {
    receiver: Option<Receiver<Result<Batch>>>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for BatchIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.receiver.as_ref()?.recv().ok();
        if item.is_none() {
            // Producer finished; a panic there surfaces as a disconnect.
            if let Some(handle) = self.handle.take() {
                if handle.join().is_err() {
                    self.receiver = None;
                    return Some(Err(Error::LoaderDisconnected));
                }
            }
            self.receiver = None;
        }
        item
    }
}

impl Drop for BatchIter {
    fn drop(&mut self) {
        // Unblock the producer before waiting for it.
        self.receiver.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{PatchConfig, IMAGE_DIR, SEGMENT_DIR, SKETCH_DIR, TEXTURE_DIR};
    use crate::data::{ColorSpace, TransformPipeline};
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::path::Path;
    use tempfile::tempdir;

    fn dataset(root: &Path, count: usize) -> ImageFolder {
        for dir in [IMAGE_DIR, SKETCH_DIR, SEGMENT_DIR, TEXTURE_DIR] {
            std::fs::create_dir_all(root.join("train").join(dir)).unwrap();
        }
        for i in 0..count {
            let name = format!("{:02}.png", i);
            let split = root.join("train");
            RgbImage::from_pixel(32, 32, Rgb([i as u8 * 20, 10, 10]))
                .save(split.join(IMAGE_DIR).join(&name))
                .unwrap();
            RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]))
                .save(split.join(SKETCH_DIR).join(&name))
                .unwrap();
            GrayImage::from_pixel(32, 32, Luma([255]))
                .save(split.join(SEGMENT_DIR).join(&name))
                .unwrap();
            RgbImage::from_pixel(32, 32, Rgb([10, 200, 10]))
                .save(split.join(TEXTURE_DIR).join(&name))
                .unwrap();
        }

        let pipeline = TransformPipeline::new(32, 32, 32, ColorSpace::Lab);
        let patch = PatchConfig {
            min_size: 4,
            max_size: 8,
            count: 1,
        };
        ImageFolder::new("train", root, pipeline, patch).unwrap()
    }

    #[test]
    fn test_dataloader_basic() {
        let dir = tempdir().unwrap();
        let mut loader = DataLoader::new(dataset(dir.path(), 5), 2, false, false);

        assert_eq!(loader.num_batches(), 3); // ceil(5/2) = 3
        assert_eq!(loader.num_samples(), 5);

        let sizes: Vec<i64> = loader.iter().map(|b| b.unwrap().size()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_dataloader_drop_last() {
        let dir = tempdir().unwrap();
        let mut loader = DataLoader::new(dataset(dir.path(), 5), 2, true, true).with_seed(3);

        assert_eq!(loader.num_batches(), 2); // floor(5/2) = 2

        for _ in 0..2 {
            let batches: Vec<Batch> = loader.iter().map(|b| b.unwrap()).collect();
            assert_eq!(batches.len(), 2);
            assert_eq!(batches[0].input.size(), vec![2, 5, 32, 32]);
            assert_eq!(batches[0].segment.size(), vec![2, 1, 32, 32]);
        }
    }

    #[test]
    fn test_sampler_restricts_samples() {
        let dir = tempdir().unwrap();
        let mut loader = DataLoader::new(dataset(dir.path(), 6), 3, true, false)
            .with_sampler(vec![4, 1, 2])
            .with_prefetch(1);

        assert_eq!(loader.num_batches(), 1);
        let batches: Vec<Batch> = loader.iter().map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].target.size(), vec![3, 3, 32, 32]);
    }

    #[test]
    fn test_dropping_iterator_early() {
        let dir = tempdir().unwrap();
        let mut loader = DataLoader::new(dataset(dir.path(), 6), 1, false, false).with_prefetch(1);

        let first = loader.iter().next().unwrap().unwrap();
        assert_eq!(first.size(), 1);
    }
}
