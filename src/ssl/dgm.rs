//! Deep generative models for semi-supervised learning.
//!
//! M2 ("generative semi-supervised model") incorporates the label in both
//! inference and generation; the stacked M1+M2 model runs M2 on the latent
//! codes of a pretrained, frozen VAE; the auxiliary model (Maaloe 2016)
//! adds a second latent variable to fit richer variational distributions.

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation, backend::AutodiffBackend, backend::Backend, Tensor},
};

use crate::ssl::vae::{Decoder, Encoder, GaussianLatent, VariationalAutoencoder};

/// Dimensions of a deep generative model
#[derive(Config, Debug)]
pub struct DgmConfig {
    /// Input dimension seen by the encoder and classifier
    #[config(default = "784")]
    pub x_dim: usize,

    /// Reconstruction dimension (differs from `x_dim` in the stacked model)
    #[config(default = "784")]
    pub recon_dim: usize,

    /// Number of label classes
    #[config(default = "10")]
    pub y_dim: usize,

    /// Latent dimension
    #[config(default = "50")]
    pub z_dim: usize,

    /// Hidden layer widths, encoder order
    #[config(default = "vec![500, 500]")]
    pub hidden: Vec<usize>,
}

/// Two-layer classifier q(y|x) with softplus hidden activation
#[derive(Module, Debug)]
pub struct LabelClassifier<B: Backend> {
    dense: Linear<B>,
    logits: Linear<B>,
}

impl<B: Backend> LabelClassifier<B> {
    /// Build a classifier x_dim -> h_dim -> y_dim
    pub fn new(x_dim: usize, h_dim: usize, y_dim: usize, device: &B::Device) -> Self {
        Self {
            dense: LinearConfig::new(x_dim, h_dim).init(device),
            logits: LinearConfig::new(h_dim, y_dim).init(device),
        }
    }

    /// Forward pass returning logits; apply softmax for q(y|x)
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = activation::softplus(self.dense.forward(x), 1.0);
        self.logits.forward(h)
    }
}

/// Output of a label-conditioned forward pass
#[derive(Debug, Clone)]
pub struct DgmOutput<B: Backend> {
    /// Reconstructed pixel probabilities
    pub reconstruction: Tensor<B, 2>,
    /// Latent draw from q(z|x,y)
    pub latent: GaussianLatent<B>,
}

/// The M2 generative semi-supervised model
#[derive(Module, Debug)]
pub struct DeepGenerativeModel<B: Backend> {
    /// q(z|x,y), over the concatenation of input and one-hot label
    pub encoder: Encoder<B>,
    /// p(x|z,y), over the concatenation of latent and one-hot label
    pub decoder: Decoder<B>,
    /// q(y|x)
    pub classifier: LabelClassifier<B>,
    y_dim: usize,
}

impl<B: Backend> DeepGenerativeModel<B> {
    /// Build an M2 model from its dimension configuration
    pub fn new(config: &DgmConfig, device: &B::Device) -> Self {
        let decoder_hidden: Vec<usize> = config.hidden.iter().rev().copied().collect();
        let h0 = config.hidden.first().copied().unwrap_or(config.z_dim);

        Self {
            encoder: Encoder::new(
                config.x_dim + config.y_dim,
                &config.hidden,
                config.z_dim,
                device,
            ),
            decoder: Decoder::new(
                config.z_dim + config.y_dim,
                &decoder_hidden,
                config.recon_dim,
                device,
            ),
            classifier: LabelClassifier::new(config.x_dim, h0, config.y_dim, device),
            y_dim: config.y_dim,
        }
    }

    /// Classify without a label: q(y|x) logits
    pub fn forward_classify(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.classifier.forward(x)
    }

    /// Label-conditioned pass: infer z from [x, y], reconstruct from [z, y].
    ///
    /// The classifier head is not run here; unlabeled marginalization calls
    /// this once per label, and one [`Self::forward_classify`] per batch is
    /// enough.
    pub fn forward(&self, x: Tensor<B, 2>, y: Tensor<B, 2>) -> DgmOutput<B> {
        let latent = self.encoder.forward(Tensor::cat(vec![x, y.clone()], 1));
        let reconstruction = self
            .decoder
            .forward(Tensor::cat(vec![latent.z.clone(), y], 1));

        DgmOutput {
            reconstruction,
            latent,
        }
    }

    /// Generate an x from a latent draw and a one-hot label
    pub fn sample(&self, z: Tensor<B, 2>, y: Tensor<B, 2>) -> Tensor<B, 2> {
        self.decoder.forward(Tensor::cat(vec![z, y], 1))
    }

    /// Number of label classes
    pub fn y_dim(&self) -> usize {
        self.y_dim
    }
}

/// The stacked M1+M2 model.
///
/// A pretrained VAE lives on the inner (non-autodiff) backend so its
/// parameters stay frozen; its latent codes are lifted into the autodiff
/// graph as constants and fed to an M2 model that still reconstructs the
/// original pixels.
pub struct StackedDeepGenerativeModel<B: AutodiffBackend> {
    features: VariationalAutoencoder<B::InnerBackend>,
    /// The trainable M2 model over the M1 latent space
    pub dgm: DeepGenerativeModel<B>,
}

impl<B: AutodiffBackend> StackedDeepGenerativeModel<B> {
    /// Stack an M2 model on top of a pretrained feature VAE.
    ///
    /// The M2 encoder and classifier see the VAE's latent dimension; the
    /// decoder still reconstructs at `config.recon_dim`.
    pub fn new(
        config: &DgmConfig,
        features: VariationalAutoencoder<B::InnerBackend>,
        device: &B::Device,
    ) -> Self {
        let stacked_config = DgmConfig {
            x_dim: features.z_dim(),
            ..config.clone()
        };

        Self {
            features,
            dgm: DeepGenerativeModel::new(&stacked_config, device),
        }
    }

    /// Project pixels through the frozen M1 encoder into the latent space
    pub fn project(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let latent = self.features.encoder.forward(x.inner());
        Tensor::from_inner(latent.z)
    }

    /// Classify via the M1 latent code
    pub fn forward_classify(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let code = self.project(x);
        self.dgm.forward_classify(code)
    }

    /// Label-conditioned pass through the frozen features and the M2 model
    pub fn forward(&self, x: Tensor<B, 2>, y: Tensor<B, 2>) -> DgmOutput<B> {
        let code = self.project(x);
        self.dgm.forward(code, y)
    }

    /// Split into the frozen feature VAE and the trainable M2 model
    pub fn into_parts(self) -> (VariationalAutoencoder<B::InnerBackend>, DeepGenerativeModel<B>) {
        (self.features, self.dgm)
    }
}

/// Output of an auxiliary model forward pass
#[derive(Debug, Clone)]
pub struct AdgmOutput<B: Backend> {
    /// Reconstructed pixel probabilities
    pub reconstruction: Tensor<B, 2>,
    /// Primary latent draw
    pub z: GaussianLatent<B>,
    /// Auxiliary latent draw
    pub a: GaussianLatent<B>,
}

/// Auxiliary deep generative model (Maaloe 2016).
///
/// Adds an auxiliary latent `a` inferred from x; classification conditions
/// on both a and x, and generation runs through additive transform layers
/// mapping x, y, and z into a shared latent-sized space.
#[derive(Module, Debug)]
pub struct AuxiliaryDeepGenerativeModel<B: Backend> {
    aux_encoder: Encoder<B>,
    encoder: Encoder<B>,
    aux_decoder: Decoder<B>,
    decoder: Decoder<B>,
    classifier: LabelClassifier<B>,
    transform_x_to_z: Linear<B>,
    transform_y_to_z: Linear<B>,
    transform_z_to_x: Linear<B>,
    y_dim: usize,
}

impl<B: Backend> AuxiliaryDeepGenerativeModel<B> {
    /// Build an ADGM from its dimension configuration
    pub fn new(config: &DgmConfig, device: &B::Device) -> Self {
        let decoder_hidden: Vec<usize> = config.hidden.iter().rev().copied().collect();
        let h0 = config.hidden.first().copied().unwrap_or(config.z_dim);

        Self {
            aux_encoder: Encoder::new(config.x_dim, &config.hidden, config.z_dim, device),
            encoder: Encoder::new(config.z_dim, &config.hidden, config.z_dim, device),
            aux_decoder: Decoder::new(config.z_dim, &decoder_hidden, config.z_dim, device),
            decoder: Decoder::new(config.z_dim, &decoder_hidden, config.recon_dim, device),
            classifier: LabelClassifier::new(config.x_dim, h0, config.y_dim, device),
            transform_x_to_z: LinearConfig::new(config.x_dim, config.z_dim).init(device),
            transform_y_to_z: LinearConfig::new(config.y_dim, config.z_dim).init(device),
            transform_z_to_x: LinearConfig::new(config.z_dim, config.x_dim).init(device),
            y_dim: config.y_dim,
        }
    }

    /// Number of label classes
    pub fn y_dim(&self) -> usize {
        self.y_dim
    }

    /// Classification q(y|a,x) logits
    pub fn forward_classify(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let a = self.aux_encoder.forward(x.clone());
        self.classifier
            .forward(self.transform_z_to_x.forward(a.z) + x)
    }

    /// Label-conditioned pass through both latent variables
    pub fn forward(&self, x: Tensor<B, 2>, y: Tensor<B, 2>) -> AdgmOutput<B> {
        // Auxiliary inference q(a|x)
        let a = self.aux_encoder.forward(x.clone());

        // Latent inference q(z|a,y,x)
        let y_code = self.transform_y_to_z.forward(y);
        let z = self
            .encoder
            .forward(a.z.clone() + y_code.clone() + self.transform_x_to_z.forward(x));

        // Generative p(a|z,y) and p(x|a,z,y)
        let a_generated = self.aux_decoder.forward(z.z.clone() + y_code.clone());
        let reconstruction = self.decoder.forward(a_generated + z.z.clone() + y_code);

        AdgmOutput {
            reconstruction,
            z,
            a,
        }
    }

    /// Generate an x from a latent draw and a one-hot label, running the
    /// generative path: a from (z, y), then x from (a, z, y)
    pub fn sample(&self, z: Tensor<B, 2>, y: Tensor<B, 2>) -> Tensor<B, 2> {
        let y_code = self.transform_y_to_z.forward(y);
        let a = self.aux_decoder.forward(z.clone() + y_code.clone());
        self.decoder.forward(a + z + y_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssl::objective::one_hot;
    use crate::ssl::vae::VaeConfig;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    fn small_config() -> DgmConfig {
        DgmConfig {
            x_dim: 784,
            recon_dim: 784,
            y_dim: 10,
            z_dim: 8,
            hidden: vec![32],
        }
    }

    #[test]
    fn test_m2_shapes() {
        let device = Default::default();
        let model = DeepGenerativeModel::<TestBackend>::new(&small_config(), &device);

        let x = Tensor::<TestBackend, 2>::zeros([2, 784], &device);
        let y = one_hot::<TestBackend>(&[3, 7], 10, &device);

        let output = model.forward(x.clone(), y);
        assert_eq!(output.reconstruction.dims(), [2, 784]);
        assert_eq!(output.latent.z.dims(), [2, 8]);

        assert_eq!(model.forward_classify(x).dims(), [2, 10]);
    }

    #[test]
    fn test_m2_sample() {
        let device = Default::default();
        let model = DeepGenerativeModel::<TestBackend>::new(&small_config(), &device);

        let z = Tensor::<TestBackend, 2>::zeros([1, 8], &device);
        let y = one_hot::<TestBackend>(&[5], 10, &device);
        assert_eq!(model.sample(z, y).dims(), [1, 784]);
    }

    #[test]
    fn test_stacked_model_projects_through_features() {
        type TB = Autodiff<NdArray>;
        let device = Default::default();

        let vae_config = VaeConfig {
            x_dim: 784,
            z_dim: 16,
            hidden: vec![32],
        };
        let features = VariationalAutoencoder::<NdArray>::new(&vae_config, &device);
        let stacked =
            StackedDeepGenerativeModel::<TB>::new(&small_config(), features, &device);

        let x = Tensor::<TB, 2>::zeros([2, 784], &device);
        let y = one_hot::<TB>(&[0, 9], 10, &device);

        // Encoder sees the 16-dim latent, decoder reconstructs 784 pixels
        assert_eq!(stacked.project(x.clone()).dims(), [2, 16]);
        let output = stacked.forward(x.clone(), y);
        assert_eq!(output.reconstruction.dims(), [2, 784]);
        assert_eq!(stacked.forward_classify(x).dims(), [2, 10]);
    }

    #[test]
    fn test_adgm_shapes() {
        let device = Default::default();
        let model = AuxiliaryDeepGenerativeModel::<TestBackend>::new(&small_config(), &device);

        let x = Tensor::<TestBackend, 2>::zeros([3, 784], &device);
        let y = one_hot::<TestBackend>(&[1, 2, 3], 10, &device);

        let output = model.forward(x.clone(), y);
        assert_eq!(output.reconstruction.dims(), [3, 784]);
        assert_eq!(output.z.z.dims(), [3, 8]);
        assert_eq!(output.a.z.dims(), [3, 8]);

        assert_eq!(model.forward_classify(x).dims(), [3, 10]);
        assert_eq!(model.y_dim(), 10);
    }

    #[test]
    fn test_adgm_sample() {
        let device = Default::default();
        let model = AuxiliaryDeepGenerativeModel::<TestBackend>::new(&small_config(), &device);

        let z = Tensor::<TestBackend, 2>::zeros([2, 8], &device);
        let y = one_hot::<TestBackend>(&[4, 7], 10, &device);

        let generated = model.sample(z, y);
        assert_eq!(generated.dims(), [2, 784]);

        // Sigmoid output stays in the unit interval
        let values: Vec<f32> = generated.into_data().to_vec().unwrap();
        assert!(values.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
