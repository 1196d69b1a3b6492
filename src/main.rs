//! MNIST Bayesian Active Learning CLI
//!
//! Entry point for the BALD acquisition experiment and the semi-supervised
//! deep generative model experiments, built on the Burn framework.

use std::fs::File;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::info;

use mnist_bald_ssl::backend::{backend_name, device, DefaultBackend, TrainingBackend};
use mnist_bald_ssl::utils::logging::{init_logging, LogConfig};

/// MNIST Bayesian Active Learning and Semi-Supervised Generative Models
#[derive(Parser, Debug)]
#[command(name = "mnist_bald_ssl")]
#[command(version)]
#[command(about = "BALD active learning and deep generative models on MNIST", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// GPU device index (ignored on the CPU backend)
    #[arg(long, default_value = "0")]
    gpu: usize,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Which generative model variant to train
#[derive(ValueEnum, Clone, Copy, Debug)]
enum DgmVariant {
    /// The M2 generative semi-supervised model over raw pixels
    M2,
    /// M2 stacked on a pretrained, frozen M1 VAE
    Stacked,
    /// The auxiliary deep generative model
    Adgm,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the BALD active-learning acquisition experiment
    Bald {
        /// Number of acquisition iterations
        #[arg(long, default_value = "100")]
        acquisition_iterations: usize,

        /// Monte Carlo dropout passes per scoring round
        #[arg(long, default_value = "3")]
        dropout_iterations: usize,

        /// Points acquired per iteration
        #[arg(long, default_value = "10")]
        queries: usize,

        /// Size of the random pool subset scored each iteration
        #[arg(long, default_value = "2000")]
        pool_subset: usize,

        /// Neighbors consulted by the k-NN oracle
        #[arg(long, default_value = "3")]
        oracle_neighbors: usize,

        /// Boundary between the seed region and the acquisition pool
        #[arg(long, default_value = "10000")]
        initial_train_point: usize,

        /// Training epochs per (re)train
        #[arg(short, long, default_value = "4")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "128")]
        batch_size: usize,

        /// Adam learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Restrict to the binary 2-vs-8 task
        #[arg(long, default_value = "false")]
        binary: bool,

        /// Output path for the per-iteration history (JSON)
        #[arg(short, long, default_value = "output/bald_history.json")]
        output: PathBuf,

        /// Output path for the final model checkpoint
        #[arg(long, default_value = "output/models/bald_cnn")]
        checkpoint: PathBuf,
    },

    /// Pretrain the M1 variational autoencoder
    Vae {
        /// Number of training epochs
        #[arg(short, long, default_value = "10")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "64")]
        batch_size: usize,

        /// Adam learning rate
        #[arg(short, long, default_value = "0.0003")]
        learning_rate: f64,

        /// Latent dimension
        #[arg(long, default_value = "50")]
        z_dim: usize,

        /// Output path for the model checkpoint
        #[arg(short, long, default_value = "output/models/vae")]
        output: PathBuf,
    },

    /// Train a semi-supervised deep generative model
    Dgm {
        /// Model variant
        #[arg(long, value_enum, default_value = "m2")]
        variant: DgmVariant,

        /// Number of labeled examples (stratified over classes)
        #[arg(long, default_value = "100")]
        labeled: usize,

        /// Number of training epochs
        #[arg(short, long, default_value = "10")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "64")]
        batch_size: usize,

        /// Adam learning rate
        #[arg(short, long, default_value = "0.0003")]
        learning_rate: f64,

        /// Scale on the labeled/unlabeled ratio forming the classification weight
        #[arg(long, default_value = "0.1")]
        alpha_scale: f64,

        /// Latent dimension
        #[arg(long, default_value = "50")]
        z_dim: usize,

        /// M1 checkpoint (required for the stacked variant)
        #[arg(long)]
        m1_checkpoint: Option<PathBuf>,

        /// Latent dimension of the M1 checkpoint
        #[arg(long, default_value = "50")]
        m1_z_dim: usize,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output path for the model checkpoint
        #[arg(short, long, default_value = "output/models/dgm")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Bald {
            acquisition_iterations,
            dropout_iterations,
            queries,
            pool_subset,
            oracle_neighbors,
            initial_train_point,
            epochs,
            batch_size,
            learning_rate,
            seed,
            binary,
            output,
            checkpoint,
        } => cmd_bald(
            cli.gpu,
            acquisition_iterations,
            dropout_iterations,
            queries,
            pool_subset,
            oracle_neighbors,
            initial_train_point,
            epochs,
            batch_size,
            learning_rate,
            seed,
            binary,
            &output,
            &checkpoint,
        ),

        Commands::Vae {
            epochs,
            batch_size,
            learning_rate,
            z_dim,
            output,
        } => cmd_vae(cli.gpu, epochs, batch_size, learning_rate, z_dim, &output),

        Commands::Dgm {
            variant,
            labeled,
            epochs,
            batch_size,
            learning_rate,
            alpha_scale,
            z_dim,
            m1_checkpoint,
            m1_z_dim,
            seed,
            output,
        } => cmd_dgm(
            cli.gpu,
            variant,
            labeled,
            epochs,
            batch_size,
            learning_rate,
            alpha_scale,
            z_dim,
            m1_checkpoint.as_deref(),
            m1_z_dim,
            seed,
            &output,
        ),
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════╗
 ║   MNIST Bayesian Active Learning + SSL with Burn     ║
 ║   BALD acquisition · k-NN oracle · M1/M2/ADGM        ║
 ╚══════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

#[allow(clippy::too_many_arguments)]
fn cmd_bald(
    gpu: usize,
    acquisition_iterations: usize,
    dropout_iterations: usize,
    queries: usize,
    pool_subset: usize,
    oracle_neighbors: usize,
    initial_train_point: usize,
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
    seed: u64,
    binary: bool,
    output: &std::path::Path,
    checkpoint: &std::path::Path,
) -> Result<()> {
    use mnist_bald_ssl::dataset::split::{binary_filter, SplitConfig};
    use mnist_bald_ssl::dataset::{load_test_items, load_train_items};
    use mnist_bald_ssl::model::cnn::DropoutCnnConfig;
    use mnist_bald_ssl::{AcquisitionConfig, AcquisitionLoop, TrainingConfig};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    println!("{}", "BALD Acquisition Configuration:".cyan().bold());
    println!("  Iterations:        {}", acquisition_iterations);
    println!("  Dropout passes:    {}", dropout_iterations);
    println!("  Queries/iteration: {}", queries);
    println!("  Pool subset:       {}", pool_subset);
    println!("  Oracle neighbors:  {}", oracle_neighbors);
    println!("  Backend:           {}", backend_name());
    println!();

    let device = device(gpu);

    info!("Loading MNIST");
    let mut train_items = load_train_items();
    let mut test_items = load_test_items();

    if binary {
        println!("{}", "Binary 2-vs-8 mode".yellow());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        train_items = binary_filter(train_items, 2, 8, &mut rng);
        test_items = binary_filter(test_items, 2, 8, &mut rng);
    }

    let split = SplitConfig {
        initial_train_point: initial_train_point.min(train_items.len() / 2),
        seed,
        ..Default::default()
    }
    .prepare(train_items)?;

    let acquisition = AcquisitionConfig::new()
        .with_acquisition_iterations(acquisition_iterations)
        .with_dropout_iterations(dropout_iterations)
        .with_queries(queries)
        .with_pool_subset(pool_subset)
        .with_oracle_neighbors(oracle_neighbors);
    let training = TrainingConfig::new()
        .with_epochs(epochs)
        .with_batch_size(batch_size)
        .with_learning_rate(learning_rate)
        .with_seed(seed);

    let (mut acquisition_loop, valid) = AcquisitionLoop::<TrainingBackend>::new(
        split,
        acquisition,
        training,
        DropoutCnnConfig::new(),
        device,
    )?;

    let (history, final_model) = acquisition_loop.run(&test_items, &valid)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    serde_json::to_writer_pretty(File::create(output)?, &history)?;
    info!("History written to {:?}", output);
    final_model.save_checkpoint(checkpoint)?;

    if let Some(last) = history.last() {
        println!();
        println!("{}", "Experiment Summary:".green().bold());
        println!("  Final training set: {} points", last.train_size);
        println!("  Final test accuracy: {:.2}%", last.test_accuracy * 100.0);
    }

    Ok(())
}

fn cmd_vae(
    gpu: usize,
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
    z_dim: usize,
    output: &std::path::Path,
) -> Result<()> {
    use mnist_bald_ssl::dataset::{load_train_items, MnistBatcher};
    use mnist_bald_ssl::ssl::trainer::{SslTrainingConfig, VaeTrainer};
    use mnist_bald_ssl::ssl::vae::{VaeConfig, VariationalAutoencoder};

    println!("{}", "VAE (M1) Configuration:".cyan().bold());
    println!("  Epochs:     {}", epochs);
    println!("  Batch size: {}", batch_size);
    println!("  Latent dim: {}", z_dim);
    println!("  Backend:    {}", backend_name());
    println!();

    let device = device(gpu);

    info!("Loading MNIST");
    let train_items = load_train_items();
    let batches = MnistBatcher::<TrainingBackend>::new(device.clone())
        .batches(&train_items, batch_size);

    let config = SslTrainingConfig::new()
        .with_epochs(epochs)
        .with_batch_size(batch_size)
        .with_learning_rate(learning_rate);
    let vae_config = VaeConfig::new().with_z_dim(z_dim);

    let model = VariationalAutoencoder::<TrainingBackend>::new(&vae_config, &device);
    let mut trainer = VaeTrainer::new(model, config);

    let final_loss = trainer.fit(&batches);
    trainer.save_checkpoint(output)?;

    println!();
    println!("{}", "Training Summary:".green().bold());
    println!("  Final -ELBO: {:.2}", final_loss);
    println!("  Checkpoint:  {:?}", output);

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_dgm(
    gpu: usize,
    variant: DgmVariant,
    labeled: usize,
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
    alpha_scale: f64,
    z_dim: usize,
    m1_checkpoint: Option<&std::path::Path>,
    m1_z_dim: usize,
    seed: u64,
    output: &std::path::Path,
) -> Result<()> {
    use burn::module::Module;
    use burn::record::CompactRecorder;
    use mnist_bald_ssl::dataset::split::labeled_unlabeled_split;
    use mnist_bald_ssl::dataset::{load_test_items, load_train_items, MnistBatcher};
    use mnist_bald_ssl::ssl::dgm::{
        AuxiliaryDeepGenerativeModel, DeepGenerativeModel, DgmConfig,
        StackedDeepGenerativeModel,
    };
    use mnist_bald_ssl::ssl::trainer::{AdgmTrainer, DgmTrainer, SslTrainingConfig};
    use mnist_bald_ssl::ssl::vae::{VaeConfig, VariationalAutoencoder};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    println!("{}", "Deep Generative Model Configuration:".cyan().bold());
    println!("  Variant:    {:?}", variant);
    println!("  Labeled:    {}", labeled);
    println!("  Epochs:     {}", epochs);
    println!("  Latent dim: {}", z_dim);
    println!("  Backend:    {}", backend_name());
    println!();

    let device = device(gpu);

    info!("Loading MNIST");
    let train_items = load_train_items();
    let test_items = load_test_items();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (labeled_items, unlabeled_items) = labeled_unlabeled_split(train_items, labeled, &mut rng)?;
    info!(
        "Split: {} labeled, {} unlabeled",
        labeled_items.len(),
        unlabeled_items.len()
    );

    let config = SslTrainingConfig::new()
        .with_epochs(epochs)
        .with_batch_size(batch_size)
        .with_learning_rate(learning_rate)
        .with_alpha_scale(alpha_scale)
        .with_seed(seed);
    let alpha = config.alpha(labeled_items.len(), unlabeled_items.len());
    info!("Classification weight alpha = {:.2}", alpha);

    let batcher = MnistBatcher::<TrainingBackend>::new(device.clone());
    let labeled_batches = batcher.batches(&labeled_items, batch_size);
    let unlabeled_batches = batcher.batches(&unlabeled_items, batch_size);

    let inner_batcher = MnistBatcher::<DefaultBackend>::new(device.clone());
    let test_batches = inner_batcher.batches(&test_items, batch_size);

    let dgm_config = DgmConfig::new().with_z_dim(z_dim);

    let metrics = match variant {
        DgmVariant::M2 => {
            let model = DeepGenerativeModel::<TrainingBackend>::new(&dgm_config, &device);
            let mut trainer = DgmTrainer::new(model, None, config, alpha, device);
            trainer.fit(&labeled_batches, &unlabeled_batches);
            trainer.save_checkpoint(output)?;
            trainer.evaluate(&test_batches)
        }

        DgmVariant::Stacked => {
            let checkpoint = m1_checkpoint.ok_or_else(|| {
                anyhow::anyhow!("the stacked variant requires --m1-checkpoint")
            })?;

            let vae_config = VaeConfig::new().with_z_dim(m1_z_dim);
            let features = VariationalAutoencoder::<DefaultBackend>::new(&vae_config, &device)
                .load_file(checkpoint, &CompactRecorder::new(), &device)
                .map_err(|e| anyhow::anyhow!("failed to load M1 checkpoint: {:?}", e))?;

            let stacked =
                StackedDeepGenerativeModel::<TrainingBackend>::new(&dgm_config, features, &device);
            let mut trainer = DgmTrainer::from_stacked(stacked, config, alpha, device);
            trainer.fit(&labeled_batches, &unlabeled_batches);
            trainer.save_checkpoint(output)?;
            trainer.evaluate(&test_batches)
        }

        DgmVariant::Adgm => {
            let model = AuxiliaryDeepGenerativeModel::<TrainingBackend>::new(&dgm_config, &device);
            let mut trainer = AdgmTrainer::new(model, config, alpha, device);
            trainer.fit(&labeled_batches, &unlabeled_batches);
            trainer.save_checkpoint(output)?;
            trainer.evaluate(&test_batches)
        }
    };

    println!();
    println!("{}", "Training Summary:".green().bold());
    println!("  Test accuracy: {:.2}%", metrics.accuracy * 100.0);
    println!("  Checkpoint:    {:?}", output);

    Ok(())
}
