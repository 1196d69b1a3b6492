//! # MNIST Bayesian Active Learning + Semi-Supervised Deep Generative Models
//!
//! Research experiments on MNIST built with the Burn framework:
//!
//! - **BALD active learning**: a dropout CNN is trained on a tiny seed set,
//!   then repeatedly queries the most informative pool points (scored by
//!   Bayesian Active Learning by Disagreement over Monte Carlo dropout
//!   passes), labels them through a k-NN oracle and retrains from scratch.
//! - **Deep generative models**: semi-supervised variants from Kingma et al.
//!   2014 (M2, stacked M1+M2) plus the auxiliary deep generative model,
//!   trained with the labeled + unlabeled variational objective.
//!
//! ## Modules
//!
//! - `dataset`: MNIST loading, batching, and the pool/seed/validation splits
//! - `oracle`: k-nearest-neighbor stand-in for a human annotator
//! - `model`: the Monte Carlo dropout CNN
//! - `training`: hand-rolled classifier training loop (Adam + cross-entropy)
//! - `active`: BALD scoring and the acquisition loop
//! - `ssl`: variational autoencoder and deep generative models
//! - `utils`: logging, metrics, and error types

pub mod active;
pub mod backend;
pub mod dataset;
pub mod model;
pub mod oracle;
pub mod ssl;
pub mod training;
pub mod utils;

pub use active::acquisition::{AcquisitionConfig, AcquisitionLoop};
pub use active::bald::{bald_scores, top_k_indices, DropoutScores};
pub use dataset::split::{PoolSplit, SplitConfig};
pub use dataset::{DigitItem, MnistBatch, MnistBatcher};
pub use model::cnn::{DropoutCnn, DropoutCnnConfig};
pub use oracle::KnnOracle;
pub use ssl::dgm::{AuxiliaryDeepGenerativeModel, DeepGenerativeModel, StackedDeepGenerativeModel};
pub use ssl::vae::{Decoder, Encoder, VariationalAutoencoder};
pub use training::classifier::ClassifierTrainer;
pub use training::TrainingConfig;
pub use utils::error::{ExperimentError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Number of digit classes
pub const NUM_CLASSES: usize = 10;

/// MNIST image side length
pub const IMAGE_SIZE: usize = 28;

/// Flattened image dimension (28 * 28)
pub const INPUT_DIM: usize = IMAGE_SIZE * IMAGE_SIZE;

/// Sentinel label for pool points whose label was withheld from the oracle
pub const UNLABELED: usize = 10;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
