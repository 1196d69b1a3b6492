//! k-nearest-neighbor oracle.
//!
//! Stands in for a human annotator: acquired pool points whose labels were
//! withheld are labeled by majority vote over the k nearest labeled pool
//! points (Euclidean distance on the flattened images). Ties go to the
//! class with the nearer neighbor.

use tracing::debug;

use crate::dataset::DigitItem;
use crate::utils::error::{ExperimentError, Result};
use crate::{NUM_CLASSES, UNLABELED};

/// k-NN label lookup over the labeled part of the pool
#[derive(Debug, Clone)]
pub struct KnnOracle {
    /// Reference images, flattened
    images: Vec<Vec<f32>>,
    /// Reference labels (all real, never the sentinel)
    labels: Vec<usize>,
    /// Number of neighbors consulted per query
    k: usize,
}

impl KnnOracle {
    /// Build an oracle from the items that still carry a real label.
    ///
    /// Sentinel-labeled items are skipped.
    pub fn from_labeled(items: &[DigitItem], k: usize) -> Result<Self> {
        let mut images = Vec::new();
        let mut labels = Vec::new();

        for item in items {
            if item.label != UNLABELED {
                images.push(item.pixels.clone());
                labels.push(item.label);
            }
        }

        if images.is_empty() {
            return Err(ExperimentError::Oracle(
                "no labeled reference points available".to_string(),
            ));
        }
        if k == 0 {
            return Err(ExperimentError::Oracle("k must be at least 1".to_string()));
        }

        debug!(
            "Oracle built with {} reference points (k = {})",
            images.len(),
            k
        );

        Ok(Self { images, labels, k })
    }

    /// Number of reference points
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the oracle has any reference points
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Label a single query image by k-NN majority vote
    pub fn assign_label(&self, query: &[f32]) -> usize {
        let k = self.k.min(self.images.len());

        // (distance, label) for every reference point, then take the k nearest
        let mut neighbors: Vec<(f32, usize)> = self
            .images
            .iter()
            .zip(self.labels.iter())
            .map(|(image, &label)| (squared_distance(query, image), label))
            .collect();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0));
        neighbors.truncate(k);

        // Majority vote; on a tie the class whose nearest member comes
        // first in distance order wins.
        let mut votes = [0usize; NUM_CLASSES];
        for &(_, label) in &neighbors {
            votes[label] += 1;
        }

        let max_votes = votes.iter().copied().max().unwrap_or(0);
        neighbors
            .iter()
            .find(|(_, label)| votes[*label] == max_votes)
            .map(|&(_, label)| label)
            .unwrap_or(0)
    }

    /// Label every sentinel-marked item in a batch of acquired points.
    ///
    /// Returns the number of items the oracle had to label.
    pub fn label_unknown(&self, items: &mut [DigitItem]) -> usize {
        let mut labeled = 0;
        for item in items.iter_mut() {
            if item.label == UNLABELED {
                item.label = self.assign_label(&item.pixels);
                labeled += 1;
            }
        }
        labeled
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INPUT_DIM;

    fn item(value: f32, label: usize) -> DigitItem {
        DigitItem::new(vec![value; INPUT_DIM], label)
    }

    #[test]
    fn test_oracle_requires_labeled_points() {
        let items = vec![item(0.0, UNLABELED)];
        assert!(KnnOracle::from_labeled(&items, 3).is_err());
    }

    #[test]
    fn test_oracle_skips_sentinel_references() {
        let items = vec![item(0.0, 1), item(1.0, UNLABELED), item(0.9, 7)];
        let oracle = KnnOracle::from_labeled(&items, 1).unwrap();
        assert_eq!(oracle.len(), 2);
    }

    #[test]
    fn test_nearest_neighbor_wins() {
        let items = vec![item(0.0, 4), item(1.0, 9)];
        let oracle = KnnOracle::from_labeled(&items, 1).unwrap();

        assert_eq!(oracle.assign_label(&vec![0.1; INPUT_DIM]), 4);
        assert_eq!(oracle.assign_label(&vec![0.9; INPUT_DIM]), 9);
    }

    #[test]
    fn test_majority_vote() {
        // Two nearby 5s outvote one closer 3
        let items = vec![item(0.10, 3), item(0.15, 5), item(0.20, 5)];
        let oracle = KnnOracle::from_labeled(&items, 3).unwrap();
        assert_eq!(oracle.assign_label(&vec![0.1; INPUT_DIM]), 5);
    }

    #[test]
    fn test_tie_breaks_to_nearer_class() {
        let items = vec![item(0.1, 2), item(0.5, 8)];
        let oracle = KnnOracle::from_labeled(&items, 2).unwrap();
        // One vote each; class 2 is nearer to the query
        assert_eq!(oracle.assign_label(&vec![0.2; INPUT_DIM]), 2);
    }

    #[test]
    fn test_label_unknown_only_touches_sentinels() {
        let references = vec![item(0.0, 1), item(1.0, 6)];
        let oracle = KnnOracle::from_labeled(&references, 1).unwrap();

        let mut acquired = vec![item(0.95, UNLABELED), item(0.05, 3)];
        let labeled = oracle.label_unknown(&mut acquired);

        assert_eq!(labeled, 1);
        assert_eq!(acquired[0].label, 6);
        assert_eq!(acquired[1].label, 3);
    }
}
