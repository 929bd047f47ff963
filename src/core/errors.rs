//! Error types for the recipe generation pipeline.
//!
//! This module defines the error taxonomy shared by all pipeline stages:
//! image decoding, startup artifact loading, ONNX inference, and input
//! validation. Note that a food-gate rejection is *not* an error; it is a
//! successful outcome modeled by [`crate::pipeline::GenerateOutcome`].

use thiserror::Error;

/// Convenient result alias for pipeline operations.
pub type RecipeResult<T> = Result<T, RecipeError>;

/// Errors raised by the recipe generation pipeline.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// Input bytes could not be interpreted as an image. Fatal to the
    /// request, never retried internally.
    #[error("image decode")]
    ImageDecode(#[source] image::ImageError),

    /// A startup artifact (model weights or vocabulary) is missing or
    /// corrupt. Fatal to process startup; never recoverable at request time.
    #[error("model load from '{}': {context}", path.display())]
    ModelLoad {
        /// Path of the artifact that failed to load.
        path: std::path::PathBuf,
        /// What the loader was trying to do.
        context: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A model forward pass failed. Aborts the whole request.
    #[error("inference in {model_name}: {context}")]
    Inference {
        /// Name of the model that failed.
        model_name: String,
        /// Additional context about the failure.
        context: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl RecipeError {
    /// Creates a RecipeError for a failed artifact load.
    pub fn model_load(
        path: &std::path::Path,
        context: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ModelLoad {
            path: path.to_path_buf(),
            context: context.into(),
            source,
        }
    }

    /// Creates a RecipeError for a failed model forward pass.
    pub fn inference(
        model_name: &str,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.to_string(),
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a RecipeError for an inference-stage failure with no
    /// underlying error, such as a poisoned session lock.
    pub fn inference_context(model_name: &str, context: impl Into<String>) -> Self {
        Self::Inference {
            model_name: model_name.to_string(),
            context: context.into(),
            source: None,
        }
    }

    /// Creates a RecipeError for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a RecipeError for configuration errors.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

impl From<image::ImageError> for RecipeError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageDecode(error)
    }
}
