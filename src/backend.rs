//! Backend selection
//!
//! CPU (ndarray) backend by default, CUDA via the `cuda` feature. The GPU
//! device index comes from the command line.

use burn::backend::Autodiff;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// The autodiff backend used for training and Monte Carlo dropout passes
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Resolve the device for the given GPU index.
///
/// The index is only meaningful on CUDA; the CPU backend ignores it.
pub fn device(gpu_index: usize) -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    #[cfg(feature = "cuda")]
    {
        burn_cuda::CudaDevice::new(gpu_index)
    }

    #[cfg(not(feature = "cuda"))]
    {
        let _ = gpu_index;
        burn::backend::ndarray::NdArrayDevice::Cpu
    }
}

/// Human-readable name for the active backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
