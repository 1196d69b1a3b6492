//! Evaluation metrics: accuracy and confusion matrix.

use serde::{Deserialize, Serialize};

/// Metrics for a classifier evaluation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,
    /// Number of correct predictions
    pub correct_predictions: usize,
    /// Overall accuracy (correct / total)
    pub accuracy: f64,
    /// Average loss over all batches, if computed
    pub loss: Option<f64>,
    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Build metrics from prediction and ground-truth label slices
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        assert_eq!(
            predictions.len(),
            ground_truth.len(),
            "Predictions and ground truth must have same length"
        );

        let total_samples = predictions.len();
        let correct_predictions = predictions
            .iter()
            .zip(ground_truth.iter())
            .filter(|(p, g)| p == g)
            .count();

        let accuracy = if total_samples > 0 {
            correct_predictions as f64 / total_samples as f64
        } else {
            0.0
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            loss: None,
            confusion_matrix: ConfusionMatrix::from_predictions(
                predictions,
                ground_truth,
                num_classes,
            ),
        }
    }
}

/// Row-per-true-class confusion matrix
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// matrix[true_class][predicted_class] = count
    pub matrix: Vec<Vec<usize>>,
    /// Number of classes
    pub num_classes: usize,
}

impl ConfusionMatrix {
    /// Build from prediction and ground-truth slices; out-of-range labels are skipped
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut matrix = vec![vec![0usize; num_classes]; num_classes];

        for (&pred, &truth) in predictions.iter().zip(ground_truth.iter()) {
            if pred < num_classes && truth < num_classes {
                matrix[truth][pred] += 1;
            }
        }

        Self {
            matrix,
            num_classes,
        }
    }

    /// Per-class recall (diagonal / row sum)
    pub fn recall(&self, class: usize) -> f64 {
        let row_sum: usize = self.matrix[class].iter().sum();
        if row_sum > 0 {
            self.matrix[class][class] as f64 / row_sum as f64
        } else {
            0.0
        }
    }

    /// Per-class precision (diagonal / column sum)
    pub fn precision(&self, class: usize) -> f64 {
        let col_sum: usize = self.matrix.iter().map(|row| row[class]).sum();
        if col_sum > 0 {
            self.matrix[class][class] as f64 / col_sum as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accuracy() {
        let predictions = vec![0, 1, 2, 2];
        let ground_truth = vec![0, 1, 2, 1];
        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(metrics.total_samples, 4);
        assert_eq!(metrics.correct_predictions, 3);
        assert!((metrics.accuracy - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 1];
        let ground_truth = vec![0, 0, 1];
        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);

        assert_eq!(cm.matrix[0][0], 1);
        assert_eq!(cm.matrix[0][1], 1);
        assert_eq!(cm.matrix[1][1], 1);
        assert!((cm.recall(0) - 0.5).abs() < 1e-9);
        assert!((cm.precision(1) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = Metrics::from_predictions(&[], &[], 10);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
    }
}
