//! Variational autoencoder (the M1 model).
//!
//! A dense Gaussian encoder and Bernoulli decoder over flattened MNIST
//! images. The encoder's reparameterized sample keeps gradients flowing
//! through the mean and log-variance while the noise stays a constant.

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation, backend::Backend, Distribution, Tensor},
};

/// Dimensions of a variational autoencoder
#[derive(Config, Debug)]
pub struct VaeConfig {
    /// Input (and reconstruction) dimension
    #[config(default = "784")]
    pub x_dim: usize,

    /// Latent dimension
    #[config(default = "50")]
    pub z_dim: usize,

    /// Hidden layer widths, encoder order (reversed for the decoder)
    #[config(default = "vec![600, 600]")]
    pub hidden: Vec<usize>,
}

/// A reparameterized Gaussian latent draw with its distribution parameters
#[derive(Debug, Clone)]
pub struct GaussianLatent<B: Backend> {
    /// Sampled latent, shape [batch, z_dim]
    pub z: Tensor<B, 2>,
    /// Mean, shape [batch, z_dim]
    pub mu: Tensor<B, 2>,
    /// Log variance, shape [batch, z_dim]
    pub log_var: Tensor<B, 2>,
}

/// Gaussian inference network q(z|x)
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    hidden: Vec<Linear<B>>,
    mu: Linear<B>,
    log_var: Linear<B>,
}

impl<B: Backend> Encoder<B> {
    /// Build an encoder mapping `in_dim` through `hidden` to a `z_dim` Gaussian
    pub fn new(in_dim: usize, hidden: &[usize], z_dim: usize, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut prev = in_dim;
        for &width in hidden {
            layers.push(LinearConfig::new(prev, width).init(device));
            prev = width;
        }

        Self {
            hidden: layers,
            mu: LinearConfig::new(prev, z_dim).init(device),
            log_var: LinearConfig::new(prev, z_dim).init(device),
        }
    }

    /// Infer the posterior parameters and draw a reparameterized sample
    pub fn forward(&self, x: Tensor<B, 2>) -> GaussianLatent<B> {
        let mut h = x;
        for layer in &self.hidden {
            h = activation::softplus(layer.forward(h), 1.0);
        }

        let mu = self.mu.forward(h.clone());
        let log_var = self.log_var.forward(h);

        // z = mu + eps * sigma, eps ~ N(0, 1)
        let std = (log_var.clone() * 0.5).exp();
        let eps = mu.random_like(Distribution::Normal(0.0, 1.0));
        let z = mu.clone() + eps * std;

        GaussianLatent { z, mu, log_var }
    }
}

/// Bernoulli generative network p(x|z)
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    hidden: Vec<Linear<B>>,
    reconstruction: Linear<B>,
}

impl<B: Backend> Decoder<B> {
    /// Build a decoder mapping `z_dim` through `hidden` (given in decoder
    /// order) to an `out_dim` sigmoid reconstruction
    pub fn new(z_dim: usize, hidden: &[usize], out_dim: usize, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut prev = z_dim;
        for &width in hidden {
            layers.push(LinearConfig::new(prev, width).init(device));
            prev = width;
        }

        Self {
            hidden: layers,
            reconstruction: LinearConfig::new(prev, out_dim).init(device),
        }
    }

    /// Decode a latent into pixel probabilities in [0, 1]
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut h = z;
        for layer in &self.hidden {
            h = activation::softplus(layer.forward(h), 1.0);
        }
        activation::sigmoid(self.reconstruction.forward(h))
    }
}

/// Output of a full VAE forward pass
#[derive(Debug, Clone)]
pub struct VaeOutput<B: Backend> {
    /// Reconstructed pixel probabilities, shape [batch, x_dim]
    pub reconstruction: Tensor<B, 2>,
    /// The latent draw and its parameters
    pub latent: GaussianLatent<B>,
}

/// The M1 variational autoencoder
#[derive(Module, Debug)]
pub struct VariationalAutoencoder<B: Backend> {
    /// Inference network
    pub encoder: Encoder<B>,
    /// Generative network
    pub decoder: Decoder<B>,
    z_dim: usize,
}

impl<B: Backend> VariationalAutoencoder<B> {
    /// Build a VAE from its dimension configuration
    pub fn new(config: &VaeConfig, device: &B::Device) -> Self {
        let decoder_hidden: Vec<usize> = config.hidden.iter().rev().copied().collect();

        Self {
            encoder: Encoder::new(config.x_dim, &config.hidden, config.z_dim, device),
            decoder: Decoder::new(config.z_dim, &decoder_hidden, config.x_dim, device),
            z_dim: config.z_dim,
        }
    }

    /// Encode, sample, and decode
    pub fn forward(&self, x: Tensor<B, 2>) -> VaeOutput<B> {
        let latent = self.encoder.forward(x);
        let reconstruction = self.decoder.forward(latent.z.clone());

        VaeOutput {
            reconstruction,
            latent,
        }
    }

    /// Generate an x from a latent draw
    pub fn sample(&self, z: Tensor<B, 2>) -> Tensor<B, 2> {
        self.decoder.forward(z)
    }

    /// Latent dimension
    pub fn z_dim(&self) -> usize {
        self.z_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_encoder_shapes() {
        let device = Default::default();
        let encoder = Encoder::<TestBackend>::new(784, &[64, 32], 16, &device);

        let x = Tensor::<TestBackend, 2>::zeros([3, 784], &device);
        let latent = encoder.forward(x);

        assert_eq!(latent.z.dims(), [3, 16]);
        assert_eq!(latent.mu.dims(), [3, 16]);
        assert_eq!(latent.log_var.dims(), [3, 16]);
    }

    #[test]
    fn test_decoder_output_in_unit_interval() {
        let device = Default::default();
        let decoder = Decoder::<TestBackend>::new(16, &[32], 784, &device);

        let z = Tensor::<TestBackend, 2>::ones([2, 16], &device);
        let recon = decoder.forward(z);
        assert_eq!(recon.dims(), [2, 784]);

        let values: Vec<f32> = recon.into_data().to_vec().unwrap();
        assert!(values.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_vae_round_trip_shapes() {
        let device = Default::default();
        let config = VaeConfig {
            x_dim: 784,
            z_dim: 8,
            hidden: vec![32],
        };
        let vae = VariationalAutoencoder::<TestBackend>::new(&config, &device);

        let x = Tensor::<TestBackend, 2>::zeros([4, 784], &device);
        let output = vae.forward(x);

        assert_eq!(output.reconstruction.dims(), [4, 784]);
        assert_eq!(output.latent.z.dims(), [4, 8]);
        assert_eq!(vae.z_dim(), 8);
    }
}
