//! Compile-time backend selection.
//!
//! The `cuda` feature wins when enabled; otherwise training runs on the CPU
//! `ndarray` backend.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(not(any(feature = "cuda", feature = "ndarray")))]
compile_error!("Enable either the `cuda` or the `ndarray` feature");

/// Autodiff backend used by the training loop
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device of the selected backend
pub type Device = <DefaultBackend as Backend>::Device;

/// Human-readable backend name for logs and banners
pub const BACKEND_NAME: &str = if cfg!(feature = "cuda") {
    "CUDA (GPU)"
} else {
    "NdArray (CPU)"
};

pub fn default_device() -> Device {
    Device::default()
}
