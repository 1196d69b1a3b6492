//! Bayesian active learning: BALD scoring and the acquisition loop.

pub mod acquisition;
pub mod bald;
