//! The semi-supervised variational objective.
//!
//! For a labeled pair (x, y) the per-sample negative ELBO is
//!
//! ```text
//! -L(x,y) = BCE(x, x_hat) + KL(q(z|x,y) || p(z)) - log p(y)
//! ```
//!
//! with a uniform label prior, plus a scaled classification loss on the
//! classifier so it learns from labeled data too. For unlabeled x the
//! label is marginalized out under q(y|x):
//!
//! ```text
//! U(x) = sum_y q(y|x) * (-L(x,y)) - H(q(y|x))
//! ```
//!
//! Natural logarithms throughout.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::{activation, backend::Backend, Int, Tensor, TensorData};

use crate::ssl::dgm::{AuxiliaryDeepGenerativeModel, DeepGenerativeModel};

/// Numerical floor for logarithms of probabilities
const EPS: f32 = 1e-8;

/// One-hot encode integer labels into a float tensor [n, num_classes]
pub fn one_hot<B: Backend>(
    labels: &[usize],
    num_classes: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut data = vec![0.0f32; labels.len() * num_classes];
    for (i, &label) in labels.iter().enumerate() {
        debug_assert!(label < num_classes);
        data[i * num_classes + label] = 1.0;
    }

    Tensor::from_floats(TensorData::new(data, [labels.len(), num_classes]), device)
}

/// Per-sample KL divergence of a diagonal Gaussian from the standard normal
pub fn kl_divergence<B: Backend>(mu: Tensor<B, 2>, log_var: Tensor<B, 2>) -> Tensor<B, 1> {
    let kl = (log_var.clone().exp() + mu.powf_scalar(2.0) - log_var - 1.0) * 0.5;
    kl.sum_dim(1).squeeze::<1>(1)
}

/// Per-sample binary cross-entropy between reconstruction and target,
/// summed over pixels
pub fn binary_cross_entropy<B: Backend>(
    reconstruction: Tensor<B, 2>,
    target: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let r = reconstruction.clamp(EPS, 1.0 - EPS);
    let loss = target.clone() * r.clone().log() + (target.ones_like() - target) * (r.ones_like() - r).log();
    loss.sum_dim(1).squeeze::<1>(1).neg()
}

/// Per-sample negative ELBO for a label-conditioned pass of the M2 model.
///
/// `x` feeds the encoder/classifier; `x_target` is what the decoder is
/// scored against (they differ in the stacked model).
pub fn m2_negative_elbo<B: Backend>(
    model: &DeepGenerativeModel<B>,
    x: Tensor<B, 2>,
    x_target: Tensor<B, 2>,
    y: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let output = model.forward(x, y);
    let recon = binary_cross_entropy(output.reconstruction, x_target);
    let kl = kl_divergence(output.latent.mu, output.latent.log_var);

    // Uniform label prior: -log p(y) = ln(C)
    let log_prior = (model.y_dim() as f32).ln();
    recon + kl + log_prior
}

/// Labeled loss: mean negative ELBO plus `alpha` times the classification
/// cross-entropy
pub fn m2_labeled_loss<B: Backend>(
    model: &DeepGenerativeModel<B>,
    x: Tensor<B, 2>,
    x_target: Tensor<B, 2>,
    y: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    alpha: f64,
) -> Tensor<B, 1> {
    let nll = m2_negative_elbo(model, x.clone(), x_target, y).mean();

    let logits = model.forward_classify(x);
    let classification = CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets);

    nll + classification * alpha
}

/// Unlabeled loss: marginalize the negative ELBO over all labels weighted
/// by q(y|x), minus the classifier entropy
pub fn m2_unlabeled_loss<B: Backend>(
    model: &DeepGenerativeModel<B>,
    x: Tensor<B, 2>,
    x_target: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let num_classes = model.y_dim();
    let [batch_size, _] = x.dims();
    let device = x.device();

    let logits = model.forward_classify(x.clone());
    let probs = activation::softmax(logits, 1);

    // One label-conditioned ELBO per class
    let mut per_class = Vec::with_capacity(num_classes);
    for class in 0..num_classes {
        let y = one_hot::<B>(&vec![class; batch_size], num_classes, &device);
        per_class.push(m2_negative_elbo(
            model,
            x.clone(),
            x_target.clone(),
            y,
        ));
    }
    let nll_matrix = Tensor::stack::<2>(per_class, 1);

    let expected_nll = (probs.clone() * nll_matrix).sum_dim(1).squeeze::<1>(1);
    let neg_entropy = (probs.clone() * probs.clamp_min(EPS).log())
        .sum_dim(1)
        .squeeze::<1>(1);

    (expected_nll + neg_entropy).mean()
}

/// Per-sample negative ELBO for the auxiliary model: reconstruction plus
/// the KL terms of both latent variables, with the uniform label prior
pub fn adgm_negative_elbo<B: Backend>(
    model: &AuxiliaryDeepGenerativeModel<B>,
    x: Tensor<B, 2>,
    y: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let output = model.forward(x.clone(), y);
    let recon = binary_cross_entropy(output.reconstruction, x);
    let kl_z = kl_divergence(output.z.mu, output.z.log_var);
    let kl_a = kl_divergence(output.a.mu, output.a.log_var);

    let log_prior = (model.y_dim() as f32).ln();
    recon + kl_z + kl_a + log_prior
}

/// Labeled ADGM loss, analogous to [`m2_labeled_loss`]
pub fn adgm_labeled_loss<B: Backend>(
    model: &AuxiliaryDeepGenerativeModel<B>,
    x: Tensor<B, 2>,
    y: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    alpha: f64,
) -> Tensor<B, 1> {
    let nll = adgm_negative_elbo(model, x.clone(), y).mean();

    let logits = model.forward_classify(x);
    let classification = CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets);

    nll + classification * alpha
}

/// Unlabeled ADGM loss, marginalizing over labels under q(y|a,x)
pub fn adgm_unlabeled_loss<B: Backend>(
    model: &AuxiliaryDeepGenerativeModel<B>,
    x: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let logits = model.forward_classify(x.clone());
    let [batch_size, num_classes] = logits.dims();
    let device = x.device();
    let probs = activation::softmax(logits, 1);

    let mut per_class = Vec::with_capacity(num_classes);
    for class in 0..num_classes {
        let y = one_hot::<B>(&vec![class; batch_size], num_classes, &device);
        per_class.push(adgm_negative_elbo(model, x.clone(), y));
    }
    let nll_matrix = Tensor::stack::<2>(per_class, 1);

    let expected_nll = (probs.clone() * nll_matrix).sum_dim(1).squeeze::<1>(1);
    let neg_entropy = (probs.clone() * probs.clamp_min(EPS).log())
        .sum_dim(1)
        .squeeze::<1>(1);

    (expected_nll + neg_entropy).mean()
}

/// Plain VAE loss: mean of reconstruction BCE plus KL
pub fn vae_loss<B: Backend>(
    reconstruction: Tensor<B, 2>,
    target: Tensor<B, 2>,
    mu: Tensor<B, 2>,
    log_var: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (binary_cross_entropy(reconstruction, target) + kl_divergence(mu, log_var)).mean()
}
