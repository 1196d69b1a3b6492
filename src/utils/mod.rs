//! Logging, metrics, and error types shared by both experiments.

pub mod error;
pub mod logging;
pub mod metrics;
