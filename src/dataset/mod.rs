//! MNIST loading and batching.
//!
//! Implements Burn's `Batcher` for digit images. Pixels are normalized to
//! [0, 1]; labels are kept as plain integers so the pool sentinel (10) can
//! ride along with real labels.

pub mod split;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::vision::MnistDataset;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{IMAGE_SIZE, INPUT_DIM};

/// A single digit example with a flattened, normalized image.
///
/// `label` is 0-9 for labeled points or [`crate::UNLABELED`] for pool points
/// whose label was withheld from the oracle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DigitItem {
    /// Row-major pixel values in [0, 1], length 784
    pub pixels: Vec<f32>,
    /// Class label, possibly the sentinel
    pub label: usize,
}

impl DigitItem {
    /// Create a new item; pixel count must match the MNIST input dimension
    pub fn new(pixels: Vec<f32>, label: usize) -> Self {
        debug_assert_eq!(pixels.len(), INPUT_DIM);
        Self { pixels, label }
    }
}

/// Load the MNIST training split as normalized items
pub fn load_train_items() -> Vec<DigitItem> {
    items_from_dataset(&MnistDataset::train())
}

/// Load the MNIST test split as normalized items
pub fn load_test_items() -> Vec<DigitItem> {
    items_from_dataset(&MnistDataset::test())
}

fn items_from_dataset(dataset: &MnistDataset) -> Vec<DigitItem> {
    dataset
        .iter()
        .map(|item| {
            let pixels: Vec<f32> = item
                .image
                .iter()
                .flat_map(|row| row.iter().map(|&p| p / 255.0))
                .collect();
            DigitItem::new(pixels, item.label as usize)
        })
        .collect()
}

/// A batch of digit images for training
#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 1, 28, 28]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MnistBatch<B> {
    /// Flatten images to [batch_size, 784] for the dense generative models
    pub fn images_flat(&self) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = self.images.dims();
        self.images.clone().reshape([batch_size, INPUT_DIM])
    }
}

/// Batcher for creating MNIST training batches
#[derive(Clone, Debug)]
pub struct MnistBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> MnistBatcher<B> {
    /// Create a new batcher for the given device
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Chunk a slice of items into ready-made batches
    pub fn batches(&self, items: &[DigitItem], batch_size: usize) -> Vec<MnistBatch<B>> {
        items
            .chunks(batch_size.max(1))
            .map(|chunk| self.batch(chunk.to_vec()))
            .collect()
    }

    /// Build the image tensor only, for scoring passes where labels are irrelevant
    pub fn images_only(&self, items: &[DigitItem]) -> Tensor<B, 4> {
        let batch_size = items.len();
        let pixels: Vec<f32> = items.iter().flat_map(|item| item.pixels.clone()).collect();

        Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [batch_size, 1, IMAGE_SIZE, IMAGE_SIZE]),
            &self.device,
        )
    }
}

impl<B: Backend> Batcher<DigitItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<DigitItem>) -> MnistBatch<B> {
        let batch_size = items.len();

        let pixels: Vec<f32> = items.iter().flat_map(|item| item.pixels.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [batch_size, 1, IMAGE_SIZE, IMAGE_SIZE]),
            &self.device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        MnistBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn fake_items(n: usize) -> Vec<DigitItem> {
        (0..n)
            .map(|i| DigitItem::new(vec![0.5; INPUT_DIM], i % 10))
            .collect()
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batcher = MnistBatcher::<TestBackend>::new(device);

        let batch = batcher.batch(fake_items(4));
        assert_eq!(batch.images.dims(), [4, 1, 28, 28]);
        assert_eq!(batch.targets.dims(), [4]);
    }

    #[test]
    fn test_images_flat() {
        let device = Default::default();
        let batcher = MnistBatcher::<TestBackend>::new(device);

        let batch = batcher.batch(fake_items(3));
        assert_eq!(batch.images_flat().dims(), [3, INPUT_DIM]);
    }

    #[test]
    fn test_batches_chunking() {
        let device = Default::default();
        let batcher = MnistBatcher::<TestBackend>::new(device);

        let batches = batcher.batches(&fake_items(10), 4);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].images.dims()[0], 4);
        assert_eq!(batches[2].images.dims()[0], 2);
    }

    #[test]
    fn test_targets_preserved() {
        let device = Default::default();
        let batcher = MnistBatcher::<TestBackend>::new(device);

        let items = vec![
            DigitItem::new(vec![0.0; INPUT_DIM], 7),
            DigitItem::new(vec![0.0; INPUT_DIM], 3),
        ];
        let batch = batcher.batch(items);
        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![7, 3]);
    }
}
