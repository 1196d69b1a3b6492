//! Hand-rolled training loop for the dropout CNN.
//!
//! Forward/backward with automatic differentiation, cross-entropy loss,
//! Adam updates, and evaluation on the inner (non-autodiff) model. Each
//! acquisition iteration constructs a fresh trainer, matching the
//! retrain-from-scratch protocol of the experiment.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, ElementConversion, Int, Tensor},
};
use tracing::{debug, info};

use crate::dataset::MnistBatch;
use crate::model::cnn::DropoutCnn;
use crate::training::TrainingConfig;
use crate::utils::error::{ExperimentError, Result};
use crate::utils::metrics::Metrics;

/// Trainer for the dropout CNN
pub struct ClassifierTrainer<B: AutodiffBackend> {
    /// Model being trained
    pub model: DropoutCnn<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<
        burn::optim::Adam,
        DropoutCnn<B>,
        B,
    >,
    config: TrainingConfig,
    epoch: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> ClassifierTrainer<B> {
    /// Create a new trainer for the given model
    pub fn new(model: DropoutCnn<B>, config: TrainingConfig, device: B::Device) -> Self {
        let optimizer = AdamConfig::new().init();

        Self {
            model,
            optimizer,
            config,
            epoch: 0,
            device,
        }
    }

    /// Train for one epoch and return (average_loss, accuracy)
    pub fn train_epoch(&mut self, batches: &[MnistBatch<B>]) -> (f64, f64) {
        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut total = 0usize;
        let num_batches = batches.len();

        for (batch_idx, batch) in batches.iter().enumerate() {
            let output = self.model.forward(batch.images.clone());

            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            total_loss += loss_value;

            let predictions = output.argmax(1).squeeze::<1>(1);
            let batch_correct: i64 = predictions
                .equal(batch.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            total += batch.targets.dims()[0];

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            if (batch_idx + 1) % 20 == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "  Batch {}/{}: loss = {:.4}",
                    batch_idx + 1,
                    num_batches,
                    loss_value
                );
            }
        }

        let avg_loss = if num_batches > 0 {
            total_loss / num_batches as f64
        } else {
            0.0
        };
        let accuracy = if total > 0 {
            correct as f64 / total as f64
        } else {
            0.0
        };

        info!(
            "Epoch {}: loss = {:.4}, accuracy = {:.2}%",
            self.epoch + 1,
            avg_loss,
            accuracy * 100.0
        );

        self.epoch += 1;
        (avg_loss, accuracy)
    }

    /// Run the configured number of epochs
    pub fn fit(&mut self, batches: &[MnistBatch<B>]) -> (f64, f64) {
        let mut last = (0.0, 0.0);
        for _ in 0..self.config.epochs {
            last = self.train_epoch(batches);
        }
        last
    }

    /// Evaluate on a validation/test set using the inner model.
    ///
    /// Dropout is inactive here; stochastic scoring goes through
    /// [`Self::mc_dropout_probs`] instead.
    pub fn evaluate(&self, batches: &[MnistBatch<B::InnerBackend>], num_classes: usize) -> Metrics {
        let model_valid = self.model.valid();

        let mut total_loss = 0.0;
        let mut all_predictions: Vec<usize> = Vec::new();
        let mut all_targets: Vec<usize> = Vec::new();

        for batch in batches.iter() {
            let output = model_valid.forward(batch.images.clone());

            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());
            let loss_value: f64 = loss.into_scalar().elem();
            total_loss += loss_value;

            let predictions = output.argmax(1).squeeze::<1>(1);
            let pred_vec: Vec<i64> = predictions.into_data().to_vec().unwrap();
            let target_vec: Vec<i64> = batch.targets.clone().into_data().to_vec().unwrap();

            all_predictions.extend(pred_vec.iter().map(|&p| p as usize));
            all_targets.extend(target_vec.iter().map(|&t| t as usize));
        }

        let mut metrics = Metrics::from_predictions(&all_predictions, &all_targets, num_classes);
        metrics.loss = Some(total_loss / batches.len().max(1) as f64);

        info!(
            "Evaluation: loss = {:.4}, accuracy = {:.2}%, samples = {}",
            metrics.loss.unwrap_or(0.0),
            metrics.accuracy * 100.0,
            metrics.total_samples
        );

        metrics
    }

    /// One stochastic forward pass over the given images.
    ///
    /// Runs on the autodiff model so dropout stays live, which is what
    /// makes repeated calls produce the disagreement BALD scores measure.
    /// Returns row-major probabilities of shape [n, num_classes].
    pub fn mc_dropout_probs(&self, images: Tensor<B, 4>) -> Vec<f32> {
        let probs = self.model.forward_softmax(images);
        probs.into_data().to_vec().unwrap()
    }

    /// Save model checkpoint
    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let recorder = CompactRecorder::new();
        self.model
            .clone()
            .save_file(path, &recorder)
            .map_err(|e| ExperimentError::Model(format!("failed to save checkpoint: {:?}", e)))?;

        info!("Checkpoint saved to {:?}", path);
        Ok(())
    }

    /// Load model from checkpoint
    pub fn load_checkpoint(&mut self, path: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();
        self.model = self
            .model
            .clone()
            .load_file(path, &recorder, &self.device)
            .map_err(|e| ExperimentError::Model(format!("failed to load checkpoint: {:?}", e)))?;

        info!("Checkpoint loaded from {:?}", path);
        Ok(())
    }
}

/// Compute accuracy from logits and integer targets
pub fn accuracy<B: burn::tensor::backend::Backend>(
    output: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> f64 {
    let predictions = output.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions
        .equal(targets.clone())
        .int()
        .sum()
        .into_scalar()
        .elem();
    let total = targets.dims()[0];

    if total > 0 {
        correct as f64 / total as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    #[test]
    fn test_accuracy_helper() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![2.0f32, 0.1, 0.1, 0.1, 3.0, 0.1], [2, 3]),
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 2], [2]),
            &device,
        );

        // First row predicts class 0 (correct), second predicts class 1 (wrong)
        assert!((accuracy(logits, targets) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_mc_dropout_probs_shape() {
        type TB = Autodiff<TestBackend>;

        let device: <TB as burn::tensor::backend::Backend>::Device = Default::default();
        let model = crate::model::cnn::DropoutCnnConfig::new().init::<TB>(&device);
        let trainer = ClassifierTrainer::new(model, TrainingConfig::new(), device.clone());

        let images = Tensor::<TB, 4>::zeros([5, 1, 28, 28], &device);
        let probs = trainer.mc_dropout_probs(images);

        assert_eq!(probs.len(), 5 * 10);
        for row in probs.chunks(10) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_checkpoint_round_trip() {
        type TB = Autodiff<TestBackend>;

        let device: <TB as burn::tensor::backend::Backend>::Device = Default::default();
        let trainer = ClassifierTrainer::new(
            crate::model::cnn::DropoutCnnConfig::new().init::<TB>(&device),
            TrainingConfig::new(),
            device.clone(),
        );

        let dir = std::env::temp_dir().join("dropout_cnn_checkpoint_test");
        let path = dir.join("model");
        trainer.save_checkpoint(&path).unwrap();

        // A freshly initialized model has different weights until loaded
        let mut restored = ClassifierTrainer::new(
            crate::model::cnn::DropoutCnnConfig::new().init::<TB>(&device),
            TrainingConfig::new(),
            device.clone(),
        );
        restored.load_checkpoint(&path).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        // Identical weights give identical deterministic outputs
        let images = Tensor::<TestBackend, 4>::ones([2, 1, 28, 28], &device);
        let original: Vec<f32> = trainer
            .model
            .valid()
            .forward(images.clone())
            .into_data()
            .to_vec()
            .unwrap();
        let reloaded: Vec<f32> = restored
            .model
            .valid()
            .forward(images)
            .into_data()
            .to_vec()
            .unwrap();

        for (a, b) in original.iter().zip(reloaded.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
