//! The acquisition loop.
//!
//! Each iteration scores a random subset of the pool with Monte Carlo
//! dropout, acquires the highest-BALD points, labels sentinel-marked ones
//! through the k-NN oracle, moves the acquired points from pool to
//! training set, and retrains a fresh model from scratch. Acquired points
//! leave the pool exactly once; the rest of the scored subset stays put.

use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::active::bald::{top_k_indices, DropoutScores};
use crate::dataset::split::PoolSplit;
use crate::dataset::{DigitItem, MnistBatcher};
use crate::model::cnn::DropoutCnnConfig;
use crate::oracle::KnnOracle;
use crate::training::classifier::ClassifierTrainer;
use crate::training::TrainingConfig;
use crate::utils::error::{ExperimentError, Result as ExperimentResult};
use crate::NUM_CLASSES;

/// Configuration for the acquisition loop
#[derive(Config, Debug)]
pub struct AcquisitionConfig {
    /// Number of acquisition iterations
    #[config(default = "100")]
    pub acquisition_iterations: usize,

    /// Monte Carlo dropout passes per scoring round
    #[config(default = "3")]
    pub dropout_iterations: usize,

    /// Points acquired per iteration
    #[config(default = "10")]
    pub queries: usize,

    /// Size of the random pool subset scored each iteration
    #[config(default = "2000")]
    pub pool_subset: usize,

    /// Neighbors consulted by the k-NN oracle
    #[config(default = "3")]
    pub oracle_neighbors: usize,
}

/// Outcome of a single acquisition iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration index (0 = initial model before any acquisition)
    pub iteration: usize,
    /// Points acquired this iteration
    pub acquired: usize,
    /// Acquired points the oracle had to label
    pub oracle_labeled: usize,
    /// Training set size after acquisition
    pub train_size: usize,
    /// Pool size after acquisition
    pub pool_size: usize,
    /// Test accuracy after retraining
    pub test_accuracy: f64,
    /// Validation accuracy after retraining
    pub valid_accuracy: f64,
}

/// Driver for the BALD active-learning experiment
pub struct AcquisitionLoop<B: AutodiffBackend> {
    config: AcquisitionConfig,
    training: TrainingConfig,
    model_config: DropoutCnnConfig,
    train: Vec<DigitItem>,
    pool: Vec<DigitItem>,
    oracle: KnnOracle,
    device: B::Device,
    rng: ChaCha8Rng,
}

impl<B: AutodiffBackend> AcquisitionLoop<B> {
    /// Set up the loop from prepared splits.
    ///
    /// The oracle is built once, from the pool points whose labels
    /// survived masking, before any acquisition mutates the pool.
    pub fn new(
        split: PoolSplit,
        config: AcquisitionConfig,
        training: TrainingConfig,
        model_config: DropoutCnnConfig,
        device: B::Device,
    ) -> ExperimentResult<(Self, Vec<DigitItem>)> {
        if config.queries == 0 {
            return Err(ExperimentError::Config(
                "queries per iteration must be at least 1".to_string(),
            ));
        }
        if config.dropout_iterations == 0 {
            return Err(ExperimentError::Config(
                "dropout iterations must be at least 1".to_string(),
            ));
        }

        let oracle = KnnOracle::from_labeled(&split.pool, config.oracle_neighbors)?;
        let rng = ChaCha8Rng::seed_from_u64(training.seed);

        let valid = split.valid;
        let looper = Self {
            config,
            training,
            model_config,
            train: split.train,
            pool: split.pool,
            oracle,
            device,
            rng,
        };

        Ok((looper, valid))
    }

    /// Current training set size
    pub fn train_size(&self) -> usize {
        self.train.len()
    }

    /// Current pool size
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Run the full experiment, returning the per-iteration history and
    /// the final trained model.
    pub fn run(
        &mut self,
        test: &[DigitItem],
        valid: &[DigitItem],
    ) -> ExperimentResult<(Vec<IterationRecord>, ClassifierTrainer<B>)> {
        let mut history = Vec::new();

        info!(
            "Initial training set: {} points, pool: {} points",
            self.train.len(),
            self.pool.len()
        );

        let mut trainer = self.train_fresh_model();
        let (test_accuracy, valid_accuracy) = self.evaluate(&trainer, test, valid);
        info!("Accuracy with initial dataset: {:.2}%", test_accuracy * 100.0);
        history.push(IterationRecord {
            iteration: 0,
            acquired: 0,
            oracle_labeled: 0,
            train_size: self.train.len(),
            pool_size: self.pool.len(),
            test_accuracy,
            valid_accuracy,
        });

        let bar = ProgressBar::new(self.config.acquisition_iterations as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner} acquisition [{bar:40}] {pos}/{len} (eta {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for iteration in 1..=self.config.acquisition_iterations {
            if self.pool.len() < self.config.queries {
                info!("Pool exhausted after {} iterations", iteration - 1);
                break;
            }

            let (record, retrained) = self.step(iteration, &trainer, test, valid)?;
            trainer = retrained;
            info!(
                "Acquisition iteration {}: train = {}, pool = {}, test accuracy = {:.2}%",
                iteration,
                record.train_size,
                record.pool_size,
                record.test_accuracy * 100.0
            );
            history.push(record);
            bar.inc(1);
        }

        bar.finish_and_clear();
        Ok((history, trainer))
    }

    /// One acquisition iteration: score, select, label, move, retrain.
    ///
    /// Returns the record plus the retrained model for the next round.
    fn step(
        &mut self,
        iteration: usize,
        trainer: &ClassifierTrainer<B>,
        test: &[DigitItem],
        valid: &[DigitItem],
    ) -> ExperimentResult<(IterationRecord, ClassifierTrainer<B>)> {
        // Random pool subset to bound the scoring cost
        let subset_size = self.config.pool_subset.min(self.pool.len());
        let mut pool_indices: Vec<usize> = (0..self.pool.len()).collect();
        pool_indices.shuffle(&mut self.rng);
        pool_indices.truncate(subset_size);

        let subset: Vec<DigitItem> = pool_indices
            .iter()
            .map(|&idx| self.pool[idx].clone())
            .collect();

        // The current model does the stochastic scoring passes
        let scores = self.score_subset(trainer, &subset);

        // Select the most informative points
        let selected = top_k_indices(&scores, self.config.queries);
        debug!(
            "Iteration {}: top score = {:.4}, cutoff = {:.4}",
            iteration,
            selected.first().map(|&i| scores[i]).unwrap_or(0.0),
            selected.last().map(|&i| scores[i]).unwrap_or(0.0)
        );

        let mut acquired: Vec<DigitItem> = selected
            .iter()
            .map(|&pos| subset[pos].clone())
            .collect();

        // The oracle answers for points whose pool label was withheld
        let oracle_labeled = self.oracle.label_unknown(&mut acquired);

        // Remove acquired points from the pool, exactly once each
        let mut acquired_pool_indices: Vec<usize> =
            selected.iter().map(|&pos| pool_indices[pos]).collect();
        acquired_pool_indices.sort_unstable_by(|a, b| b.cmp(a));
        for idx in acquired_pool_indices {
            self.pool.swap_remove(idx);
        }

        let acquired_count = acquired.len();
        self.train.extend(acquired);

        // Fresh model on the grown training set
        let retrained = self.train_fresh_model();
        let (test_accuracy, valid_accuracy) = self.evaluate(&retrained, test, valid);

        let record = IterationRecord {
            iteration,
            acquired: acquired_count,
            oracle_labeled,
            train_size: self.train.len(),
            pool_size: self.pool.len(),
            test_accuracy,
            valid_accuracy,
        };
        Ok((record, retrained))
    }

    /// Train a fresh model on the current training set
    fn train_fresh_model(&mut self) -> ClassifierTrainer<B> {
        let mut train_items = self.train.clone();
        train_items.shuffle(&mut self.rng);

        let batcher = MnistBatcher::<B>::new(self.device.clone());
        let batches = batcher.batches(&train_items, self.training.batch_size);

        let model = self.model_config.init::<B>(&self.device);
        let mut trainer =
            ClassifierTrainer::new(model, self.training.clone(), self.device.clone());
        trainer.fit(&batches);
        trainer
    }

    /// Monte Carlo dropout BALD scores for a pool subset
    fn score_subset(&self, trainer: &ClassifierTrainer<B>, subset: &[DigitItem]) -> Vec<f32> {
        let batcher = MnistBatcher::<B>::new(self.device.clone());
        let mut scores = DropoutScores::new(subset.len(), NUM_CLASSES);

        for _ in 0..self.config.dropout_iterations {
            let mut pass = Vec::with_capacity(subset.len() * NUM_CLASSES);
            for chunk in subset.chunks(self.training.batch_size) {
                let images = batcher.images_only(chunk);
                pass.extend(trainer.mc_dropout_probs(images));
            }
            scores.add_pass(&pass);
        }

        scores.bald()
    }

    /// Evaluate a trained model on test and validation sets
    fn evaluate(
        &self,
        trainer: &ClassifierTrainer<B>,
        test: &[DigitItem],
        valid: &[DigitItem],
    ) -> (f64, f64) {
        let inner_batcher = MnistBatcher::<B::InnerBackend>::new(self.device.clone());
        let test_batches = inner_batcher.batches(test, self.training.batch_size);
        let valid_batches = inner_batcher.batches(valid, self.training.batch_size);

        let test_metrics = trainer.evaluate(&test_batches, NUM_CLASSES);
        let valid_metrics = trainer.evaluate(&valid_batches, NUM_CLASSES);

        (test_metrics.accuracy, valid_metrics.accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::split::SplitConfig;
    use crate::INPUT_DIM;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn tiny_split() -> PoolSplit {
        // 200 items, labels cycling 0-9
        let items: Vec<DigitItem> = (0..200)
            .map(|i| DigitItem::new(vec![(i % 10) as f32 / 10.0; INPUT_DIM], i % 10))
            .collect();

        SplitConfig {
            validation_fraction: 0.1,
            initial_train_point: 100,
            seed_per_class: 2,
            mask_fraction: 0.5,
            seed: 42,
        }
        .prepare(items)
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = AcquisitionConfig::new();
        assert_eq!(config.dropout_iterations, 3);
        assert_eq!(config.queries, 10);
        assert_eq!(config.pool_subset, 2000);
    }

    #[test]
    fn test_new_rejects_zero_queries() {
        let config = AcquisitionConfig::new().with_queries(0);
        let result = AcquisitionLoop::<TestBackend>::new(
            tiny_split(),
            config,
            TrainingConfig::new(),
            DropoutCnnConfig::new(),
            Default::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_acquisition_moves_points_exactly_once() {
        let config = AcquisitionConfig::new()
            .with_acquisition_iterations(1)
            .with_dropout_iterations(2)
            .with_queries(5)
            .with_pool_subset(20);
        let training = TrainingConfig::new().with_epochs(1).with_batch_size(32);

        let split = tiny_split();
        let (mut looper, valid) = AcquisitionLoop::<TestBackend>::new(
            split,
            config,
            training,
            DropoutCnnConfig::new(),
            Default::default(),
        )
        .unwrap();

        let initial_train = looper.train_size();
        let initial_pool = looper.pool_size();

        let test: Vec<DigitItem> = (0..20)
            .map(|i| DigitItem::new(vec![0.3; INPUT_DIM], i % 10))
            .collect();
        let (history, final_model) = looper.run(&test, &valid).unwrap();
        // The returned trainer is the one evaluated in the last record
        assert_eq!(final_model.model.num_classes(), 10);

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].acquired, 5);
        assert_eq!(looper.train_size(), initial_train + 5);
        assert_eq!(looper.pool_size(), initial_pool - 5);
        assert_eq!(
            history[1].train_size + history[1].pool_size,
            initial_train + initial_pool
        );
        // Every acquired point carries a real label after the oracle pass
        assert!(history[1].oracle_labeled <= history[1].acquired);
    }
}
