//! The recipe generation model: an image encoder plus two autoregressive
//! decoders, each exported as a separate ONNX graph.
//!
//! The encoder runs once per candidate and produces a feature map that both
//! decoders attend over. The ingredient decoder conditions on the features
//! and the ingredient prefix; the instruction decoder additionally conditions
//! on the completed ingredient sequence. Each decoder call returns the logits
//! for the next token only.

use crate::core::inference::OrtInfer;
use crate::core::{RecipeError, Tensor3D, Tensor4D};
use ndarray::Array2;
use ort::value::TensorRef;
use std::path::Path;

/// Name of the encoder-features input on both decoder graphs.
const FEATURES_INPUT: &str = "features";
/// Name of the ingredient-prefix input.
const INGREDIENT_IDS_INPUT: &str = "ingr_ids";
/// Name of the instruction-prefix input on the instruction decoder.
const INSTRUCTION_IDS_INPUT: &str = "instr_ids";
/// Name of the logits output on both decoder graphs, shaped [1, len, vocab].
const LOGITS_OUTPUT: &str = "logits";

/// Encoded image features, shaped [1, positions, dim]. Produced once per
/// candidate and reused across every decoder step.
#[derive(Debug, Clone)]
pub struct ImageFeatures(Tensor3D);

impl ImageFeatures {
    /// Wraps an encoder output tensor.
    pub fn new(features: Tensor3D) -> Self {
        Self(features)
    }

    /// The underlying feature tensor.
    pub fn tensor(&self) -> &Tensor3D {
        &self.0
    }
}

/// The seam between sequence decoding and the backing model, so tests can
/// substitute scripted models and count invocations.
pub trait RecipeModel: Send + Sync {
    /// Encodes a preprocessed [1, 3, 224, 224] image into features.
    fn encode_image(&self, image: &Tensor4D) -> Result<ImageFeatures, RecipeError>;

    /// Next-token logits for the ingredient sequence given the current
    /// prefix (start token included).
    fn ingredient_logits(
        &self,
        features: &ImageFeatures,
        prefix: &[i64],
    ) -> Result<Vec<f32>, RecipeError>;

    /// Next-token logits for the instruction sequence given the decoded
    /// ingredients and the current instruction prefix.
    fn instruction_logits(
        &self,
        features: &ImageFeatures,
        ingredients: &[i64],
        prefix: &[i64],
    ) -> Result<Vec<f32>, RecipeError>;
}

/// ONNX-backed recipe model over three pooled sessions.
#[derive(Debug)]
pub struct OnnxRecipeModel {
    encoder: OrtInfer,
    ingredient_decoder: OrtInfer,
    instruction_decoder: OrtInfer,
}

impl OnnxRecipeModel {
    /// Loads the three model graphs. Any failure is fatal to startup.
    pub fn load(
        encoder_path: &Path,
        ingredient_decoder_path: &Path,
        instruction_decoder_path: &Path,
        pool_size: usize,
    ) -> Result<Self, RecipeError> {
        Ok(Self {
            encoder: OrtInfer::load(encoder_path, "image-encoder", pool_size)?,
            ingredient_decoder: OrtInfer::load(
                ingredient_decoder_path,
                "ingredient-decoder",
                pool_size,
            )?,
            instruction_decoder: OrtInfer::load(
                instruction_decoder_path,
                "instruction-decoder",
                pool_size,
            )?,
        })
    }
}

impl RecipeModel for OnnxRecipeModel {
    fn encode_image(&self, image: &Tensor4D) -> Result<ImageFeatures, RecipeError> {
        let features = self.encoder.infer_3d(image)?;
        Ok(ImageFeatures::new(features))
    }

    fn ingredient_logits(
        &self,
        features: &ImageFeatures,
        prefix: &[i64],
    ) -> Result<Vec<f32>, RecipeError> {
        let name = self.ingredient_decoder.model_name().to_string();
        let prefix_ids = id_row(prefix)?;
        self.ingredient_decoder.with_session(|session| {
            let features_tensor =
                TensorRef::from_array_view(features.tensor().view()).map_err(|e| {
                    RecipeError::inference(&name, "failed to convert feature tensor", e)
                })?;
            let prefix_tensor = TensorRef::from_array_view(prefix_ids.view()).map_err(|e| {
                RecipeError::inference(&name, "failed to convert ingredient prefix tensor", e)
            })?;
            let outputs = session
                .run(ort::inputs![
                    FEATURES_INPUT => features_tensor,
                    INGREDIENT_IDS_INPUT => prefix_tensor
                ])
                .map_err(|e| RecipeError::inference(&name, "decoder step failed", e))?;
            let (shape, data) = outputs[LOGITS_OUTPUT]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    RecipeError::inference(&name, "failed to extract logits as f32", e)
                })?;
            last_step_logits(&name, shape, data)
        })
    }

    fn instruction_logits(
        &self,
        features: &ImageFeatures,
        ingredients: &[i64],
        prefix: &[i64],
    ) -> Result<Vec<f32>, RecipeError> {
        let name = self.instruction_decoder.model_name().to_string();
        let ingredient_ids = id_row(ingredients)?;
        let prefix_ids = id_row(prefix)?;
        self.instruction_decoder.with_session(|session| {
            let features_tensor =
                TensorRef::from_array_view(features.tensor().view()).map_err(|e| {
                    RecipeError::inference(&name, "failed to convert feature tensor", e)
                })?;
            let ingredient_tensor =
                TensorRef::from_array_view(ingredient_ids.view()).map_err(|e| {
                    RecipeError::inference(&name, "failed to convert ingredient tensor", e)
                })?;
            let prefix_tensor = TensorRef::from_array_view(prefix_ids.view()).map_err(|e| {
                RecipeError::inference(&name, "failed to convert instruction prefix tensor", e)
            })?;
            let outputs = session
                .run(ort::inputs![
                    FEATURES_INPUT => features_tensor,
                    INGREDIENT_IDS_INPUT => ingredient_tensor,
                    INSTRUCTION_IDS_INPUT => prefix_tensor
                ])
                .map_err(|e| RecipeError::inference(&name, "decoder step failed", e))?;
            let (shape, data) = outputs[LOGITS_OUTPUT]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    RecipeError::inference(&name, "failed to extract logits as f32", e)
                })?;
            last_step_logits(&name, shape, data)
        })
    }
}

/// Lays out ids as a [1, len] batch row for the decoder graphs.
fn id_row(ids: &[i64]) -> Result<Array2<i64>, RecipeError> {
    Array2::from_shape_vec((1, ids.len()), ids.to_vec()).map_err(RecipeError::Tensor)
}

/// Extracts the final-position logit row from a [1, len, vocab] output.
fn last_step_logits(
    model_name: &str,
    shape: &[i64],
    data: &[f32],
) -> Result<Vec<f32>, RecipeError> {
    if shape.len() != 3 || shape[0] != 1 {
        return Err(RecipeError::invalid_input(format!(
            "model '{model_name}': expected [1, len, vocab] logits, got shape {shape:?}"
        )));
    }
    let len = shape[1] as usize;
    let vocab = shape[2] as usize;
    if len == 0 || vocab == 0 || data.len() != len * vocab {
        return Err(RecipeError::invalid_input(format!(
            "model '{model_name}': logits shape {shape:?} does not match {} values",
            data.len()
        )));
    }
    Ok(data[(len - 1) * vocab..].to_vec())
}
