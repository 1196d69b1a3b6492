//! Model architectures for the active-learning experiment.

pub mod cnn;

pub use cnn::{DropoutCnn, DropoutCnnConfig};
