//! Training loops for the generative models.
//!
//! Same hand-rolled Adam pattern as the classifier trainer. The M2 loop
//! walks labeled and unlabeled batches together, cycling the (much
//! smaller) labeled set, and weights the classification term by
//! `alpha = alpha_scale * unlabeled/labeled` as in Kingma et al.

use std::path::Path;

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor},
};
use tracing::info;

use crate::dataset::MnistBatch;
use crate::ssl::dgm::{
    AuxiliaryDeepGenerativeModel, DeepGenerativeModel, StackedDeepGenerativeModel,
};
use crate::ssl::objective::{
    adgm_labeled_loss, adgm_unlabeled_loss, m2_labeled_loss, m2_unlabeled_loss, one_hot, vae_loss,
};
use crate::ssl::vae::VariationalAutoencoder;
use crate::training::classifier::accuracy;
use crate::utils::error::{ExperimentError, Result as ExperimentResult};
use crate::utils::metrics::Metrics;
use crate::NUM_CLASSES;

/// Configuration for generative model training
#[derive(Config, Debug)]
pub struct SslTrainingConfig {
    /// Number of training epochs
    #[config(default = "10")]
    pub epochs: usize,

    /// Batch size
    #[config(default = "64")]
    pub batch_size: usize,

    /// Adam learning rate
    #[config(default = "3e-4")]
    pub learning_rate: f64,

    /// Scale on the labeled/unlabeled ratio that forms alpha
    #[config(default = "0.1")]
    pub alpha_scale: f64,

    /// RNG seed for shuffling
    #[config(default = "42")]
    pub seed: u64,
}

impl SslTrainingConfig {
    /// Classification weight for the given data balance
    pub fn alpha(&self, n_labeled: usize, n_unlabeled: usize) -> f64 {
        if n_labeled == 0 {
            return 0.0;
        }
        self.alpha_scale * n_unlabeled as f64 / n_labeled as f64
    }
}

/// Trainer for the plain M1 VAE
pub struct VaeTrainer<B: AutodiffBackend> {
    /// Model being trained
    pub model: VariationalAutoencoder<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<
        burn::optim::Adam,
        VariationalAutoencoder<B>,
        B,
    >,
    config: SslTrainingConfig,
    epoch: usize,
}

impl<B: AutodiffBackend> VaeTrainer<B> {
    /// Create a new trainer
    pub fn new(model: VariationalAutoencoder<B>, config: SslTrainingConfig) -> Self {
        Self {
            model,
            optimizer: AdamConfig::new().init(),
            config,
            epoch: 0,
        }
    }

    /// Train for one epoch, returning the average negative ELBO
    pub fn train_epoch(&mut self, batches: &[MnistBatch<B>]) -> f64 {
        let mut total_loss = 0.0;

        for batch in batches {
            let x = batch.images_flat();
            let output = self.model.forward(x.clone());
            let loss = vae_loss(
                output.reconstruction,
                x,
                output.latent.mu,
                output.latent.log_var,
            );

            total_loss += loss.clone().into_scalar().elem::<f64>();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);
        }

        let avg = total_loss / batches.len().max(1) as f64;
        info!("VAE epoch {}: -ELBO = {:.2}", self.epoch + 1, avg);
        self.epoch += 1;
        avg
    }

    /// Run the configured number of epochs
    pub fn fit(&mut self, batches: &[MnistBatch<B>]) -> f64 {
        let mut last = 0.0;
        for _ in 0..self.config.epochs {
            last = self.train_epoch(batches);
        }
        last
    }

    /// Save model checkpoint
    pub fn save_checkpoint(&self, path: &Path) -> ExperimentResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.model
            .clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| ExperimentError::Model(format!("failed to save VAE: {:?}", e)))?;
        info!("VAE checkpoint saved to {:?}", path);
        Ok(())
    }
}

/// Trainer for the M2 model, optionally stacked on frozen M1 features
pub struct DgmTrainer<B: AutodiffBackend> {
    /// Model being trained
    pub model: DeepGenerativeModel<B>,
    /// Frozen feature VAE for the stacked (M1+M2) variant
    features: Option<VariationalAutoencoder<B::InnerBackend>>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<
        burn::optim::Adam,
        DeepGenerativeModel<B>,
        B,
    >,
    config: SslTrainingConfig,
    alpha: f64,
    epoch: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> DgmTrainer<B> {
    /// Create a trainer; `alpha` comes from the labeled/unlabeled counts
    pub fn new(
        model: DeepGenerativeModel<B>,
        features: Option<VariationalAutoencoder<B::InnerBackend>>,
        config: SslTrainingConfig,
        alpha: f64,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            features,
            optimizer: AdamConfig::new().init(),
            config,
            alpha,
            epoch: 0,
            device,
        }
    }

    /// Create a trainer for the stacked M1+M2 model
    pub fn from_stacked(
        stacked: StackedDeepGenerativeModel<B>,
        config: SslTrainingConfig,
        alpha: f64,
        device: B::Device,
    ) -> Self {
        let (features, model) = stacked.into_parts();
        Self::new(model, Some(features), config, alpha, device)
    }

    /// Encoder/classifier input: raw pixels, or frozen M1 latent codes
    fn prepare_input(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match &self.features {
            Some(vae) => Tensor::from_inner(vae.encoder.forward(x.inner()).z),
            None => x,
        }
    }

    /// One epoch over paired labeled/unlabeled batches.
    ///
    /// The unlabeled set drives the iteration count; labeled batches are
    /// cycled. Returns (avg labeled loss, avg unlabeled loss, labeled
    /// accuracy).
    pub fn train_epoch(
        &mut self,
        labeled: &[MnistBatch<B>],
        unlabeled: &[MnistBatch<B>],
    ) -> (f64, f64, f64) {
        assert!(!labeled.is_empty(), "labeled batches must not be empty");

        let steps = unlabeled.len().max(labeled.len());
        let mut labeled_total = 0.0;
        let mut unlabeled_total = 0.0;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for step in 0..steps {
            let l_batch = &labeled[step % labeled.len()];
            let x_l = l_batch.images_flat();
            let targets = l_batch.targets.clone();
            let labels: Vec<usize> = targets
                .clone()
                .into_data()
                .to_vec::<i64>()
                .unwrap()
                .into_iter()
                .map(|v| v as usize)
                .collect();
            let y = one_hot::<B>(&labels, NUM_CLASSES, &self.device);

            let labeled_loss = m2_labeled_loss(
                &self.model,
                self.prepare_input(x_l.clone()),
                x_l.clone(),
                y,
                targets.clone(),
                self.alpha,
            );

            let loss = if unlabeled.is_empty() {
                labeled_loss.clone()
            } else {
                let u_batch = &unlabeled[step % unlabeled.len()];
                let x_u = u_batch.images_flat();
                let unlabeled_loss =
                    m2_unlabeled_loss(&self.model, self.prepare_input(x_u.clone()), x_u);
                unlabeled_total += unlabeled_loss.clone().into_scalar().elem::<f64>();
                labeled_loss.clone() + unlabeled_loss
            };

            labeled_total += labeled_loss.into_scalar().elem::<f64>();

            let logits = self.model.forward_classify(self.prepare_input(x_l));
            let batch_accuracy = accuracy(logits, targets);
            correct += (batch_accuracy * l_batch.targets.dims()[0] as f64).round() as usize;
            seen += l_batch.targets.dims()[0];

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);
        }

        let avg_labeled = labeled_total / steps as f64;
        let avg_unlabeled = if unlabeled.is_empty() {
            0.0
        } else {
            unlabeled_total / steps as f64
        };
        let acc = if seen > 0 {
            correct as f64 / seen as f64
        } else {
            0.0
        };

        info!(
            "DGM epoch {}: labeled = {:.2}, unlabeled = {:.2}, labeled accuracy = {:.2}%",
            self.epoch + 1,
            avg_labeled,
            avg_unlabeled,
            acc * 100.0
        );
        self.epoch += 1;

        (avg_labeled, avg_unlabeled, acc)
    }

    /// Run the configured number of epochs
    pub fn fit(
        &mut self,
        labeled: &[MnistBatch<B>],
        unlabeled: &[MnistBatch<B>],
    ) -> (f64, f64, f64) {
        let mut last = (0.0, 0.0, 0.0);
        for _ in 0..self.config.epochs {
            last = self.train_epoch(labeled, unlabeled);
        }
        last
    }

    /// Evaluate the classifier head on a test set
    pub fn evaluate(&self, batches: &[MnistBatch<B::InnerBackend>]) -> Metrics {
        let model_valid = self.model.valid();

        let mut all_predictions: Vec<usize> = Vec::new();
        let mut all_targets: Vec<usize> = Vec::new();

        for batch in batches {
            let x = batch.images_flat();
            let code = match &self.features {
                Some(vae) => vae.encoder.forward(x).z,
                None => x,
            };
            let logits = model_valid.forward_classify(code);

            let predictions = logits.argmax(1).squeeze::<1>(1);
            let pred_vec: Vec<i64> = predictions.into_data().to_vec().unwrap();
            let target_vec: Vec<i64> = batch.targets.clone().into_data().to_vec().unwrap();

            all_predictions.extend(pred_vec.iter().map(|&p| p as usize));
            all_targets.extend(target_vec.iter().map(|&t| t as usize));
        }

        let metrics = Metrics::from_predictions(&all_predictions, &all_targets, NUM_CLASSES);
        info!(
            "DGM evaluation: accuracy = {:.2}% over {} samples",
            metrics.accuracy * 100.0,
            metrics.total_samples
        );
        metrics
    }

    /// Save model checkpoint
    pub fn save_checkpoint(&self, path: &Path) -> ExperimentResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.model
            .clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| ExperimentError::Model(format!("failed to save DGM: {:?}", e)))?;
        info!("DGM checkpoint saved to {:?}", path);
        Ok(())
    }
}

/// Trainer for the auxiliary deep generative model
pub struct AdgmTrainer<B: AutodiffBackend> {
    /// Model being trained
    pub model: AuxiliaryDeepGenerativeModel<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<
        burn::optim::Adam,
        AuxiliaryDeepGenerativeModel<B>,
        B,
    >,
    config: SslTrainingConfig,
    alpha: f64,
    epoch: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> AdgmTrainer<B> {
    /// Create a trainer; `alpha` comes from the labeled/unlabeled counts
    pub fn new(
        model: AuxiliaryDeepGenerativeModel<B>,
        config: SslTrainingConfig,
        alpha: f64,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            optimizer: AdamConfig::new().init(),
            config,
            alpha,
            epoch: 0,
            device,
        }
    }

    /// One epoch over paired labeled/unlabeled batches
    pub fn train_epoch(
        &mut self,
        labeled: &[MnistBatch<B>],
        unlabeled: &[MnistBatch<B>],
    ) -> (f64, f64) {
        assert!(!labeled.is_empty(), "labeled batches must not be empty");

        let steps = unlabeled.len().max(labeled.len());
        let mut labeled_total = 0.0;
        let mut unlabeled_total = 0.0;

        for step in 0..steps {
            let l_batch = &labeled[step % labeled.len()];
            let x_l = l_batch.images_flat();
            let labels: Vec<usize> = l_batch
                .targets
                .clone()
                .into_data()
                .to_vec::<i64>()
                .unwrap()
                .into_iter()
                .map(|v| v as usize)
                .collect();
            let y = one_hot::<B>(&labels, NUM_CLASSES, &self.device);

            let labeled_loss = adgm_labeled_loss(
                &self.model,
                x_l,
                y,
                l_batch.targets.clone(),
                self.alpha,
            );
            labeled_total += labeled_loss.clone().into_scalar().elem::<f64>();

            let loss = if unlabeled.is_empty() {
                labeled_loss
            } else {
                let u_batch = &unlabeled[step % unlabeled.len()];
                let unlabeled_loss = adgm_unlabeled_loss(&self.model, u_batch.images_flat());
                unlabeled_total += unlabeled_loss.clone().into_scalar().elem::<f64>();
                labeled_loss + unlabeled_loss
            };

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);
        }

        let avg_labeled = labeled_total / steps as f64;
        let avg_unlabeled = if unlabeled.is_empty() {
            0.0
        } else {
            unlabeled_total / steps as f64
        };

        info!(
            "ADGM epoch {}: labeled = {:.2}, unlabeled = {:.2}",
            self.epoch + 1,
            avg_labeled,
            avg_unlabeled
        );
        self.epoch += 1;

        (avg_labeled, avg_unlabeled)
    }

    /// Run the configured number of epochs
    pub fn fit(&mut self, labeled: &[MnistBatch<B>], unlabeled: &[MnistBatch<B>]) -> (f64, f64) {
        let mut last = (0.0, 0.0);
        for _ in 0..self.config.epochs {
            last = self.train_epoch(labeled, unlabeled);
        }
        last
    }

    /// Evaluate the classifier head on a test set
    pub fn evaluate(&self, batches: &[MnistBatch<B::InnerBackend>]) -> Metrics {
        let model_valid = self.model.valid();

        let mut all_predictions: Vec<usize> = Vec::new();
        let mut all_targets: Vec<usize> = Vec::new();

        for batch in batches {
            let logits = model_valid.forward_classify(batch.images_flat());
            let predictions = logits.argmax(1).squeeze::<1>(1);

            let pred_vec: Vec<i64> = predictions.into_data().to_vec().unwrap();
            let target_vec: Vec<i64> = batch.targets.clone().into_data().to_vec().unwrap();
            all_predictions.extend(pred_vec.iter().map(|&p| p as usize));
            all_targets.extend(target_vec.iter().map(|&t| t as usize));
        }

        let metrics = Metrics::from_predictions(&all_predictions, &all_targets, NUM_CLASSES);
        info!(
            "ADGM evaluation: accuracy = {:.2}% over {} samples",
            metrics.accuracy * 100.0,
            metrics.total_samples
        );
        metrics
    }

    /// Save model checkpoint
    pub fn save_checkpoint(&self, path: &Path) -> ExperimentResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.model
            .clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| ExperimentError::Model(format!("failed to save ADGM: {:?}", e)))?;
        info!("ADGM checkpoint saved to {:?}", path);
        Ok(())
    }
}
