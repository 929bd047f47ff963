//! Core building blocks of the recipe generation pipeline.
//!
//! This module contains the fundamental components shared by the pipeline:
//! - Error handling
//! - Tensor type aliases
//! - ONNX Runtime inference engine integration
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod errors;
pub mod inference;

pub use errors::{RecipeError, RecipeResult};
pub use inference::OrtInfer;

/// A 2D tensor of f32 values (batch, classes).
pub type Tensor2D = ndarray::Array2<f32>;
/// A 3D tensor of f32 values (batch, sequence, features).
pub type Tensor3D = ndarray::Array3<f32>;
/// A 4D tensor of f32 values (batch, channels, height, width).
pub type Tensor4D = ndarray::Array4<f32>;

/// Initializes the tracing subscriber for logging.
///
/// This function sets up the tracing subscriber with environment filter and
/// formatting layer. It's typically called at the start of an application to
/// enable logging.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
