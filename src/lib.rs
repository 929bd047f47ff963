//! # dish2recipe
//!
//! A Rust library that generates cooking recipes from food photographs using
//! ONNX models. A food/non-food gate screens each image, then an image
//! encoder and two autoregressive decoders produce recipe candidates under
//! three sampling policies.
//!
//! ## Features
//!
//! - Complete pipeline from image bytes to titled, stepped recipes
//! - Food-validity gating over an ImageNet classifier before any decoding
//! - Greedy, temperature and beam-search decoding policies
//! - Structural validity checking with per-candidate reasons
//! - Session pooling for concurrent inference
//!
//! ## Modules
//!
//! * [`core`] - Error handling, tensor aliases and ONNX session pooling
//! * [`vocab`] - Token/id vocabulary tables
//! * [`preprocess`] - Image decoding, resize/crop/normalize transform
//! * [`classifier`] - Food gate over a 1000-class image classifier
//! * [`model`] - Encoder/decoder model graphs behind the [`model::RecipeModel`] trait
//! * [`decoder`] - Sequence decoding under sampling policies
//! * [`reconstruct`] - Token-to-text reconstruction and validity checks
//! * [`pipeline`] - Request-level orchestration and configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dish2recipe::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let context = InferenceContext::load(&config)?;
//!
//! let bytes = std::fs::read("dish.jpg")?;
//! match context.generate_from_bytes(&bytes)? {
//!     GenerateOutcome::Rejected(rejection) => {
//!         println!("{}", rejection.diagnostic());
//!     }
//!     GenerateOutcome::Candidates(candidates) => {
//!         for candidate in candidates {
//!             println!("[{}] {:?}", candidate.style, candidate.result);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod core;
pub mod decoder;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod reconstruct;
pub mod vocab;

/// Commonly used types for working with the pipeline.
pub mod prelude {
    pub use crate::classifier::{FoodCheck, FoodGate, ImageClassifier};
    pub use crate::core::{RecipeError, RecipeResult, init_tracing};
    pub use crate::decoder::{RawDecodeOutput, SamplingPolicy, SequenceDecoder};
    pub use crate::model::{ImageFeatures, RecipeModel};
    pub use crate::pipeline::{
        Candidate, FoodRejection, GenerateOutcome, InferenceContext, PipelineConfig,
        RecipeResponse,
    };
    pub use crate::preprocess::{ImageTransform, decode_image, load_image};
    pub use crate::reconstruct::{CandidateResult, ReconstructedRecipe};
    pub use crate::vocab::Vocabulary;
}
