//! Monte Carlo dropout CNN for MNIST.
//!
//! The architecture follows the Deep Bayesian Active Learning setup:
//! two valid-padded convolutions, max pooling, then a dense head, with
//! dropout after the pooling stage and after the dense layer. Dropout is
//! the source of the stochastic forward passes that BALD scores are
//! computed over; Burn keeps dropout active on the autodiff backend, so
//! Monte Carlo passes run on the training model rather than `valid()`.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the dropout CNN
#[derive(Config, Debug)]
pub struct DropoutCnnConfig {
    /// Number of output classes
    #[config(default = "10")]
    pub num_classes: usize,

    /// Filters in the first convolution
    #[config(default = "32")]
    pub base_filters: usize,

    /// Dropout rate after the pooling stage
    #[config(default = "0.25")]
    pub conv_dropout: f64,

    /// Dropout rate after the dense layer
    #[config(default = "0.5")]
    pub dense_dropout: f64,

    /// Width of the dense layer
    #[config(default = "128")]
    pub dense_units: usize,
}

impl DropoutCnnConfig {
    /// Initialize the model on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> DropoutCnn<B> {
        DropoutCnn::new(self, device)
    }
}

/// Dropout CNN classifier
///
/// Architecture (28x28 input):
/// - Conv 1 -> 32, 3x3 valid, ReLU (26x26)
/// - Conv 32 -> 64, 3x3 valid, ReLU (24x24)
/// - MaxPool 2x2 (12x12)
/// - Dropout 0.25
/// - Linear 9216 -> 128, ReLU
/// - Dropout 0.5
/// - Linear 128 -> 10
#[derive(Module, Debug)]
pub struct DropoutCnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    conv_dropout: Dropout,
    fc1: Linear<B>,
    dense_dropout: Dropout,
    fc2: Linear<B>,
    relu: Relu,
    num_classes: usize,
}

impl<B: Backend> DropoutCnn<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &DropoutCnnConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        // Valid padding: 28 -> 26 -> 24 -> (pool) 12
        let conv1 = Conv2dConfig::new([1, base], [3, 3]).init(device);
        let conv2 = Conv2dConfig::new([base, base * 2], [3, 3]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        let flattened = base * 2 * 12 * 12;
        let fc1 = LinearConfig::new(flattened, config.dense_units).init(device);
        let fc2 = LinearConfig::new(config.dense_units, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            pool,
            conv_dropout: DropoutConfig::new(config.conv_dropout).init(),
            fc1,
            dense_dropout: DropoutConfig::new(config.dense_dropout).init(),
            fc2,
            relu: Relu::new(),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass returning logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);
        let x = self.conv_dropout.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.relu.forward(self.fc1.forward(x));
        let x = self.dense_dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax, for probability outputs
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let config = DropoutCnnConfig::new();
        let model = config.init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 1, 28, 28], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 10]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = DropoutCnnConfig::new().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let probs = model.forward_softmax(input);

        let row: Vec<f32> = probs.into_data().to_vec().unwrap();
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_forward_on_autodiff_backend() {
        // Monte Carlo passes run on the autodiff backend where dropout
        // stays active; the shape contract must hold there too.
        let device = Default::default();
        let model = DropoutCnnConfig::new().init::<Autodiff<TestBackend>>(&device);

        let input = Tensor::<Autodiff<TestBackend>, 4>::zeros([3, 1, 28, 28], &device);
        assert_eq!(model.forward(input).dims(), [3, 10]);
    }

    #[test]
    fn test_custom_class_count() {
        let device = Default::default();
        let config = DropoutCnnConfig::new().with_num_classes(2);
        let model = config.init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 1, 28, 28], &device);
        assert_eq!(model.forward(input).dims(), [1, 2]);
        assert_eq!(model.num_classes(), 2);
    }
}
