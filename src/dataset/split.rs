//! Data splits for the active-learning experiment.
//!
//! The training set is carved up in stages:
//!
//! 1. The last 10% of the training set becomes the validation set.
//! 2. The first `initial_train_point` examples are the seed region, the
//!    rest is the acquisition pool.
//! 3. The initial training set is a uniform seed: the first
//!    `seed_per_class` examples of each digit from the seed region
//!    (20 points by default).
//! 4. Half of the pool's labels are replaced by the sentinel, simulating
//!    points the oracle has never seen.
//!
//! All randomness is driven by a seeded ChaCha8 RNG for reproducibility.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::DigitItem;
use crate::utils::error::{ExperimentError, Result};
use crate::{NUM_CLASSES, UNLABELED};

/// Configuration for the active-learning data splits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of the training set held out for validation
    pub validation_fraction: f64,
    /// Boundary between the seed region and the pool
    pub initial_train_point: usize,
    /// Seed examples taken per class for the initial training set
    pub seed_per_class: usize,
    /// Fraction of pool labels replaced by the sentinel
    pub mask_fraction: f64,
    /// RNG seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.1,
            initial_train_point: 10_000,
            seed_per_class: 2,
            mask_fraction: 0.5,
            seed: 42,
        }
    }
}

/// The prepared splits for an acquisition run
#[derive(Debug, Clone)]
pub struct PoolSplit {
    /// Initial labeled training set (uniform over classes)
    pub train: Vec<DigitItem>,
    /// Validation set
    pub valid: Vec<DigitItem>,
    /// Acquisition pool; labels may be the sentinel
    pub pool: Vec<DigitItem>,
}

impl SplitConfig {
    /// Carve the MNIST training set into train/valid/pool per the
    /// experiment protocol.
    pub fn prepare(&self, items: Vec<DigitItem>) -> Result<PoolSplit> {
        if self.validation_fraction <= 0.0 || self.validation_fraction >= 1.0 {
            return Err(ExperimentError::Config(
                "validation fraction must be in (0, 1)".to_string(),
            ));
        }

        let (train_region, valid) = validation_split(items, self.validation_fraction);

        if self.initial_train_point >= train_region.len() {
            return Err(ExperimentError::Config(format!(
                "initial train point {} exceeds training region of {} examples",
                self.initial_train_point,
                train_region.len()
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let (seed_region, mut pool) = pool_split(train_region, self.initial_train_point);
        let train = uniform_seed(&seed_region, self.seed_per_class);
        mask_pool_labels(&mut pool, self.mask_fraction, &mut rng);

        Ok(PoolSplit { train, valid, pool })
    }
}

/// Split off the last `fraction` of the items as validation set
pub fn validation_split(items: Vec<DigitItem>, fraction: f64) -> (Vec<DigitItem>, Vec<DigitItem>) {
    let valid_len = ((items.len() as f64) * fraction).round() as usize;
    let split = items.len().saturating_sub(valid_len);

    let mut train = items;
    let valid = train.split_off(split);
    (train, valid)
}

/// Split the training region into seed region and pool at `initial_train_point`
pub fn pool_split(items: Vec<DigitItem>, initial_train_point: usize) -> (Vec<DigitItem>, Vec<DigitItem>) {
    let mut seed_region = items;
    let pool = seed_region.split_off(initial_train_point.min(seed_region.len()));
    (seed_region, pool)
}

/// Take the first `per_class` examples of each digit as the initial training set
pub fn uniform_seed(items: &[DigitItem], per_class: usize) -> Vec<DigitItem> {
    let mut counts = vec![0usize; NUM_CLASSES];
    let mut seed = Vec::with_capacity(per_class * NUM_CLASSES);

    for class in 0..NUM_CLASSES {
        for item in items {
            if item.label == class && counts[class] < per_class {
                seed.push(item.clone());
                counts[class] += 1;
            }
        }
    }

    seed
}

/// Replace a random `fraction` of the pool's labels with the sentinel.
///
/// Returns the number of masked points.
pub fn mask_pool_labels(pool: &mut [DigitItem], fraction: f64, rng: &mut impl Rng) -> usize {
    let n_masked = ((pool.len() as f64) * fraction).round() as usize;

    let mut indices: Vec<usize> = (0..pool.len()).collect();
    indices.shuffle(rng);

    for &idx in indices.iter().take(n_masked) {
        pool[idx].label = UNLABELED;
    }

    n_masked
}

/// Stratified labeled/unlabeled split for semi-supervised training.
///
/// Shuffles and takes `n_labeled / NUM_CLASSES` examples of each class as
/// the labeled set; everything else becomes the unlabeled set.
pub fn labeled_unlabeled_split(
    items: Vec<DigitItem>,
    n_labeled: usize,
    rng: &mut impl Rng,
) -> Result<(Vec<DigitItem>, Vec<DigitItem>)> {
    if n_labeled == 0 || n_labeled % NUM_CLASSES != 0 {
        return Err(ExperimentError::Config(format!(
            "labeled count {} must be a positive multiple of {}",
            n_labeled, NUM_CLASSES
        )));
    }
    let per_class = n_labeled / NUM_CLASSES;

    let mut shuffled = items;
    shuffled.shuffle(rng);

    let mut counts = vec![0usize; NUM_CLASSES];
    let mut labeled = Vec::with_capacity(n_labeled);
    let mut unlabeled = Vec::with_capacity(shuffled.len().saturating_sub(n_labeled));

    for item in shuffled {
        if item.label < NUM_CLASSES && counts[item.label] < per_class {
            counts[item.label] += 1;
            labeled.push(item);
        } else {
            unlabeled.push(item);
        }
    }

    if labeled.len() < n_labeled {
        return Err(ExperimentError::Dataset(format!(
            "dataset cannot supply {} examples per class",
            per_class
        )));
    }

    Ok((labeled, unlabeled))
}

/// Restrict the dataset to two classes and reshuffle (the binary 2-vs-8
/// task).
pub fn binary_filter(
    items: Vec<DigitItem>,
    class_a: usize,
    class_b: usize,
    rng: &mut impl Rng,
) -> Vec<DigitItem> {
    let mut filtered: Vec<DigitItem> = items
        .into_iter()
        .filter(|item| item.label == class_a || item.label == class_b)
        .collect();

    filtered.shuffle(rng);
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INPUT_DIM;

    fn items_with_labels(labels: &[usize]) -> Vec<DigitItem> {
        labels
            .iter()
            .map(|&l| DigitItem::new(vec![0.0; INPUT_DIM], l))
            .collect()
    }

    #[test]
    fn test_validation_split_sizes() {
        let items = items_with_labels(&[0; 100]);
        let (train, valid) = validation_split(items, 0.1);
        assert_eq!(train.len(), 90);
        assert_eq!(valid.len(), 10);
    }

    #[test]
    fn test_pool_split_boundary() {
        let items = items_with_labels(&[1; 50]);
        let (seed_region, pool) = pool_split(items, 30);
        assert_eq!(seed_region.len(), 30);
        assert_eq!(pool.len(), 20);
    }

    #[test]
    fn test_uniform_seed_takes_first_per_class() {
        let items = items_with_labels(&[0, 0, 0, 1, 1, 2, 5, 5, 5]);
        let seed = uniform_seed(&items, 2);

        let labels: Vec<usize> = seed.iter().map(|i| i.label).collect();
        assert_eq!(labels, vec![0, 0, 1, 1, 2, 5, 5]);
    }

    #[test]
    fn test_mask_pool_labels_count() {
        let mut pool = items_with_labels(&[3; 100]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let masked = mask_pool_labels(&mut pool, 0.5, &mut rng);
        assert_eq!(masked, 50);

        let sentinel_count = pool.iter().filter(|i| i.label == UNLABELED).count();
        assert_eq!(sentinel_count, 50);
    }

    #[test]
    fn test_mask_is_deterministic() {
        let mut pool_a = items_with_labels(&[3; 40]);
        let mut pool_b = items_with_labels(&[3; 40]);

        let mut rng_a = ChaCha8Rng::seed_from_u64(11);
        let mut rng_b = ChaCha8Rng::seed_from_u64(11);

        mask_pool_labels(&mut pool_a, 0.25, &mut rng_a);
        mask_pool_labels(&mut pool_b, 0.25, &mut rng_b);

        let labels_a: Vec<usize> = pool_a.iter().map(|i| i.label).collect();
        let labels_b: Vec<usize> = pool_b.iter().map(|i| i.label).collect();
        assert_eq!(labels_a, labels_b);
    }

    #[test]
    fn test_binary_filter() {
        let items = items_with_labels(&[2, 3, 8, 8, 1, 2]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let filtered = binary_filter(items, 2, 8, &mut rng);
        assert_eq!(filtered.len(), 4);
        assert!(filtered.iter().all(|i| i.label == 2 || i.label == 8));
    }

    #[test]
    fn test_labeled_unlabeled_split_is_stratified() {
        let labels: Vec<usize> = (0..100).map(|i| i % 10).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let (labeled, unlabeled) =
            labeled_unlabeled_split(items_with_labels(&labels), 20, &mut rng).unwrap();
        assert_eq!(labeled.len(), 20);
        assert_eq!(unlabeled.len(), 80);

        for class in 0..NUM_CLASSES {
            assert_eq!(labeled.iter().filter(|i| i.label == class).count(), 2);
        }
    }

    #[test]
    fn test_labeled_unlabeled_split_rejects_bad_count() {
        let labels: Vec<usize> = (0..50).map(|i| i % 10).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(labeled_unlabeled_split(items_with_labels(&labels), 15, &mut rng).is_err());
    }

    #[test]
    fn test_labeled_unlabeled_split_requires_class_coverage() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        // Only digit 0 present, so a stratified request cannot be met
        let result = labeled_unlabeled_split(items_with_labels(&[0; 30]), 20, &mut rng);
        assert!(matches!(result, Err(ExperimentError::Dataset(_))));
    }

    #[test]
    fn test_prepare_rejects_bad_config() {
        let config = SplitConfig {
            initial_train_point: 1_000,
            ..Default::default()
        };
        let items = items_with_labels(&[0; 100]);
        assert!(config.prepare(items).is_err());
    }

    #[test]
    fn test_prepare_end_to_end() {
        let labels: Vec<usize> = (0..200).map(|i| i % 10).collect();
        let config = SplitConfig {
            validation_fraction: 0.1,
            initial_train_point: 100,
            seed_per_class: 2,
            mask_fraction: 0.5,
            seed: 42,
        };

        let split = config.prepare(items_with_labels(&labels)).unwrap();
        assert_eq!(split.valid.len(), 20);
        assert_eq!(split.train.len(), 20);
        assert_eq!(split.pool.len(), 80);
        assert_eq!(split.pool.iter().filter(|i| i.label == UNLABELED).count(), 40);
    }
}
