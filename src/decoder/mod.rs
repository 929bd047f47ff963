//! Sequence decoding under configurable sampling policies.
//!
//! The decoder drives the recipe model autoregressively: starting from the
//! start token it repeatedly asks the model for next-token logits and selects
//! a token according to the sampling policy, until the end token is emitted
//! or the maximum sequence length is reached. The ingredient sequence is
//! decoded first; the instruction sequence is conditioned on it.

pub mod sampling;

use crate::core::{RecipeError, Tensor4D};
use crate::model::RecipeModel;
use rand::Rng;
use rand::thread_rng;
use sampling::{argmax, beam_search, sample_with_temperature};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of decoded ingredient tokens.
pub const MAX_INGREDIENTS: usize = 20;
/// Maximum number of decoded instruction tokens.
pub const MAX_INSTRUCTION_TOKENS: usize = 150;

/// Token-selection policy for one decode attempt.
///
/// The three fixed candidates in [`FIXED_CANDIDATES`] are the only policies
/// used by the default generation path; their constants are preserved for
/// behavioral compatibility and are tunable parameters, not derived values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    /// Always select the argmax token. Temperature has no effect.
    pub greedy: bool,
    /// Beam width when beam search is enabled; `None` disables it.
    pub beam: Option<usize>,
    /// Softmax temperature for sampling. Must be positive.
    pub temperature: f32,
}

impl SamplingPolicy {
    /// Greedy decoding at temperature 1.0.
    pub const STANDARD: Self = Self {
        greedy: true,
        beam: None,
        temperature: 1.0,
    };
    /// Temperature sampling at 0.8, sharpened toward confident tokens.
    pub const CONSERVATIVE: Self = Self {
        greedy: false,
        beam: None,
        temperature: 0.8,
    };
    /// Temperature sampling at 1.2, flattened for variety.
    pub const CREATIVE: Self = Self {
        greedy: false,
        beam: None,
        temperature: 1.2,
    };

    /// Validates the numeric contract of the policy.
    pub fn validate(&self) -> Result<(), RecipeError> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(RecipeError::invalid_input(format!(
                "temperature must be a positive finite value, got {}",
                self.temperature
            )));
        }
        if self.beam == Some(0) {
            return Err(RecipeError::invalid_input("beam width must be positive"));
        }
        Ok(())
    }
}

/// The three fixed candidates generated per image, in output order, with
/// their style labels.
pub const FIXED_CANDIDATES: [(SamplingPolicy, &str); 3] = [
    (SamplingPolicy::STANDARD, "standard"),
    (SamplingPolicy::CONSERVATIVE, "conservative"),
    (SamplingPolicy::CREATIVE, "creative"),
];

/// Start/end token ids and length bound for one decoded sequence.
#[derive(Debug, Clone, Copy)]
pub struct SequenceSpec {
    /// Id of the start token fed as the initial prefix.
    pub start_id: i64,
    /// Id of the end token that terminates decoding.
    pub end_id: i64,
    /// Maximum number of emitted tokens.
    pub max_len: usize,
}

/// Raw integer id sequences emitted by the decoder for one candidate.
/// Ephemeral: consumed immediately by reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDecodeOutput {
    /// Decoded ingredient ids, start and end tokens excluded.
    pub ingredient_ids: Vec<i64>,
    /// Decoded instruction ids, start and end tokens excluded.
    pub instruction_ids: Vec<i64>,
}

/// Drives the recipe model through both decode loops for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct SequenceDecoder {
    ingredient: SequenceSpec,
    instruction: SequenceSpec,
}

impl SequenceDecoder {
    /// Creates a decoder for the given sequence specifications.
    pub fn new(ingredient: SequenceSpec, instruction: SequenceSpec) -> Self {
        Self {
            ingredient,
            instruction,
        }
    }

    /// Decodes one candidate with a thread-local random source.
    ///
    /// The greedy policy is deterministic; sampling policies vary across
    /// invocations unless a seeded generator is supplied through
    /// [`SequenceDecoder::decode_with_rng`].
    pub fn decode(
        &self,
        model: &dyn RecipeModel,
        image: &Tensor4D,
        policy: SamplingPolicy,
    ) -> Result<RawDecodeOutput, RecipeError> {
        let mut rng = thread_rng();
        self.decode_with_rng(model, image, policy, &mut rng)
    }

    /// Decodes one candidate using the supplied random source.
    pub fn decode_with_rng<R: Rng>(
        &self,
        model: &dyn RecipeModel,
        image: &Tensor4D,
        policy: SamplingPolicy,
        rng: &mut R,
    ) -> Result<RawDecodeOutput, RecipeError> {
        policy.validate()?;

        let features = model.encode_image(image)?;

        let ingredient_ids = decode_sequence(
            &mut |prefix| model.ingredient_logits(&features, prefix),
            &self.ingredient,
            policy,
            rng,
        )?;
        let instruction_ids = decode_sequence(
            &mut |prefix| model.instruction_logits(&features, &ingredient_ids, prefix),
            &self.instruction,
            policy,
            rng,
        )?;

        debug!(
            greedy = policy.greedy,
            temperature = policy.temperature,
            ingredient_len = ingredient_ids.len(),
            instruction_len = instruction_ids.len(),
            "decoded candidate"
        );

        Ok(RawDecodeOutput {
            ingredient_ids,
            instruction_ids,
        })
    }
}

/// Runs one autoregressive decode loop until the end token or length bound.
fn decode_sequence<R: Rng>(
    step: &mut dyn FnMut(&[i64]) -> Result<Vec<f32>, RecipeError>,
    spec: &SequenceSpec,
    policy: SamplingPolicy,
    rng: &mut R,
) -> Result<Vec<i64>, RecipeError> {
    if let Some(width) = policy.beam {
        return beam_search(step, spec.start_id, spec.end_id, spec.max_len, width);
    }

    let mut prefix = vec![spec.start_id];
    let mut emitted = Vec::new();
    for _ in 0..spec.max_len {
        let logits = step(&prefix)?;
        if logits.is_empty() {
            return Err(RecipeError::invalid_input(
                "decoder step produced no logits",
            ));
        }
        let token = if policy.greedy {
            argmax(&logits)
        } else {
            sample_with_temperature(&logits, policy.temperature, rng)
        } as i64;
        if token == spec.end_id {
            break;
        }
        prefix.push(token);
        emitted.push(token);
    }
    Ok(emitted)
}
