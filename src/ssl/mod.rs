//! Semi-supervised deep generative models (Kingma et al. 2014).
//!
//! - `vae`: the M1 variational autoencoder
//! - `dgm`: the M2 generative classifier, the stacked M1+M2 model, and the
//!   auxiliary deep generative model
//! - `objective`: the labeled/unlabeled variational objectives
//! - `trainer`: hand-rolled Adam training loops

pub mod dgm;
pub mod objective;
pub mod trainer;
pub mod vae;
