//! Training loops for the experiment models.

pub mod classifier;

use burn::config::Config;

/// Configuration for classifier training
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Number of training epochs
    #[config(default = "4")]
    pub epochs: usize,

    /// Batch size
    #[config(default = "128")]
    pub batch_size: usize,

    /// Adam learning rate
    #[config(default = "1e-3")]
    pub learning_rate: f64,

    /// RNG seed for shuffling
    #[config(default = "42")]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_defaults() {
        let config = TrainingConfig::new();
        assert_eq!(config.epochs, 4);
        assert_eq!(config.batch_size, 128);
        assert!((config.learning_rate - 1e-3).abs() < 1e-12);
    }
}
