//! The end-to-end generation pipeline.
//!
//! One request flows through a fixed sequence: preprocess the image, run the
//! food gate, and either reject early or decode three recipe candidates under
//! the fixed sampling policies. Candidates are independent and run in
//! parallel; an invalid candidate occupies its output slot with a sentinel
//! title and a reason instead of aborting the others.

use crate::classifier::{FoodGate, ImageClassifier, OnnxImageClassifier};
use crate::core::{RecipeError, init_tracing};
use crate::decoder::{
    FIXED_CANDIDATES, MAX_INGREDIENTS, MAX_INSTRUCTION_TOKENS, SequenceDecoder, SequenceSpec,
};
use crate::model::{OnnxRecipeModel, RecipeModel};
use crate::preprocess::{ImageTransform, decode_image};
use crate::reconstruct::{
    CandidateResult, INVALID_RECIPE_TITLE, ReconstructedRecipe, append_tips, reconstruct,
};
use crate::vocab::{EOI_TOKEN, Vocabulary};
use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use crate::classifier::DEFAULT_FOOD_THRESHOLD;

/// Title of the single output slot produced when the food gate rejects.
pub const REJECTED_TITLE: &str = "Not a valid food image!";
/// User-facing message accompanying a rejection.
pub const REJECTED_MESSAGE: &str = "Please upload a clear image of food.";

/// File-level configuration of the pipeline: model locations and tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the model and vocabulary files.
    pub data_dir: PathBuf,
    /// Food classifier graph file name.
    pub classifier_model: String,
    /// Image encoder graph file name.
    pub encoder_model: String,
    /// Ingredient decoder graph file name.
    pub ingredient_decoder_model: String,
    /// Instruction decoder graph file name.
    pub instruction_decoder_model: String,
    /// Ingredient vocabulary file name.
    pub ingredient_vocab: String,
    /// Instruction vocabulary file name.
    pub instruction_vocab: String,
    /// Food-probability mass below which an image is rejected.
    pub food_threshold: f32,
    /// Length bound for the decoded ingredient sequence.
    pub max_ingredients: usize,
    /// Length bound for the decoded instruction sequence.
    pub max_instruction_tokens: usize,
    /// Sessions pooled per model.
    pub session_pool_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            classifier_model: "food_classifier.onnx".to_string(),
            encoder_model: "image_encoder.onnx".to_string(),
            ingredient_decoder_model: "ingredient_decoder.onnx".to_string(),
            instruction_decoder_model: "instruction_decoder.onnx".to_string(),
            ingredient_vocab: "ingr_vocab.txt".to_string(),
            instruction_vocab: "instr_vocab.txt".to_string(),
            food_threshold: DEFAULT_FOOD_THRESHOLD,
            max_ingredients: MAX_INGREDIENTS,
            max_instruction_tokens: MAX_INSTRUCTION_TOKENS,
            session_pool_size: 1,
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, RecipeError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| RecipeError::config_error(format!("invalid config file: {e}")))
    }

    fn data_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }
}

/// Diagnostics of a food-gate rejection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodRejection {
    /// Most probable class id, for the diagnostic string.
    pub top_label_id: usize,
    /// Summed food-probability mass that fell below the threshold.
    pub food_prob_mass: f32,
}

impl FoodRejection {
    /// Diagnostic string embedding the top class and the food mass.
    pub fn diagnostic(&self) -> String {
        format!(
            "Our AI detected non-food content (Class ID: {}, Confidence: {:.2}).",
            self.top_label_id, self.food_prob_mass
        )
    }
}

/// One generated candidate with its sampling-style label.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Style label of the policy that produced this candidate.
    pub style: &'static str,
    /// Reconstruction outcome, tips already applied when valid.
    pub result: CandidateResult,
}

/// Outcome of one generation request. Callers pattern-match instead of
/// comparing sentinel title strings.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    /// The food gate rejected the image; no decoding happened.
    Rejected(FoodRejection),
    /// Three candidate slots, one per fixed sampling policy, in policy order.
    Candidates(Vec<Candidate>),
}

impl GenerateOutcome {
    /// Flattens the outcome into the parallel-list response shape.
    pub fn into_response(self) -> RecipeResponse {
        match self {
            GenerateOutcome::Rejected(rejection) => RecipeResponse {
                titles: vec![REJECTED_TITLE.to_string()],
                ingredients: vec![vec![REJECTED_MESSAGE.to_string()]],
                recipes: vec![vec![rejection.diagnostic()]],
                styles: vec!["rejected".to_string()],
            },
            GenerateOutcome::Candidates(candidates) => {
                let mut response = RecipeResponse::default();
                for candidate in candidates {
                    response.styles.push(candidate.style.to_string());
                    match candidate.result {
                        CandidateResult::Valid(recipe) => {
                            response.titles.push(recipe.title);
                            response.ingredients.push(recipe.ingredients);
                            response.recipes.push(recipe.steps);
                        }
                        CandidateResult::Invalid { reason } => {
                            response.titles.push(INVALID_RECIPE_TITLE.to_string());
                            response.ingredients.push(Vec::new());
                            response.recipes.push(vec![format!("Reason: {reason}")]);
                        }
                    }
                }
                response
            }
        }
    }
}

/// Parallel output lists, one entry per candidate slot. This is the shape
/// consumed by the serving layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecipeResponse {
    /// Candidate titles.
    pub titles: Vec<String>,
    /// Candidate ingredient lists.
    pub ingredients: Vec<Vec<String>>,
    /// Candidate recipe-step lists.
    pub recipes: Vec<Vec<String>>,
    /// Per-candidate style labels.
    pub styles: Vec<String>,
}

/// Everything loaded once at startup and shared read-only across requests.
pub struct InferenceContext {
    transform: ImageTransform,
    gate: FoodGate,
    model: Box<dyn RecipeModel>,
    decoder: SequenceDecoder,
    ingredient_vocab: Vocabulary,
    instruction_vocab: Vocabulary,
}

impl std::fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceContext")
            .field("gate", &self.gate)
            .field("ingredient_vocab_len", &self.ingredient_vocab.len())
            .field("instruction_vocab_len", &self.instruction_vocab.len())
            .finish()
    }
}

impl InferenceContext {
    /// Loads every model and vocabulary named by the configuration. Loading
    /// is all-or-nothing: any missing or malformed file fails startup.
    pub fn load(config: &PipelineConfig) -> Result<Self, RecipeError> {
        let ingredient_vocab = Vocabulary::from_file(&config.data_path(&config.ingredient_vocab))?;
        let instruction_vocab =
            Vocabulary::from_file(&config.data_path(&config.instruction_vocab))?;

        let classifier = OnnxImageClassifier::load(
            &config.data_path(&config.classifier_model),
            config.session_pool_size,
        )?;
        let model = OnnxRecipeModel::load(
            &config.data_path(&config.encoder_model),
            &config.data_path(&config.ingredient_decoder_model),
            &config.data_path(&config.instruction_decoder_model),
            config.session_pool_size,
        )?;

        info!(
            data_dir = %config.data_dir.display(),
            ingredient_vocab_len = ingredient_vocab.len(),
            instruction_vocab_len = instruction_vocab.len(),
            "inference context loaded"
        );

        Self::from_components(
            Box::new(classifier),
            Box::new(model),
            ingredient_vocab,
            instruction_vocab,
            config,
        )
    }

    /// Assembles a context from pre-built components. Used by alternate
    /// backends and tests.
    pub fn from_components(
        classifier: Box<dyn ImageClassifier>,
        model: Box<dyn RecipeModel>,
        ingredient_vocab: Vocabulary,
        instruction_vocab: Vocabulary,
        config: &PipelineConfig,
    ) -> Result<Self, RecipeError> {
        // Without the sentence separator, reconstruction can never segment a
        // step out of the instruction stream; catch the corrupt vocabulary at
        // startup instead of failing every request.
        if instruction_vocab.eoi_id().is_none() {
            return Err(RecipeError::config_error(format!(
                "instruction vocabulary is missing the sentence separator '{EOI_TOKEN}'"
            )));
        }
        let gate = FoodGate::new(classifier, config.food_threshold)?;
        let decoder = SequenceDecoder::new(
            SequenceSpec {
                start_id: ingredient_vocab.start_id() as i64,
                end_id: ingredient_vocab.end_id() as i64,
                max_len: config.max_ingredients,
            },
            SequenceSpec {
                start_id: instruction_vocab.start_id() as i64,
                end_id: instruction_vocab.end_id() as i64,
                max_len: config.max_instruction_tokens,
            },
        );
        Ok(Self {
            transform: ImageTransform::new(),
            gate,
            model,
            decoder,
            ingredient_vocab,
            instruction_vocab,
        })
    }

    /// Generates recipe candidates for a decoded image.
    pub fn generate(&self, image: &DynamicImage) -> Result<GenerateOutcome, RecipeError> {
        self.generate_with_hints(image, None, None)
    }

    /// Decodes raw bytes and generates recipe candidates.
    pub fn generate_from_bytes(&self, bytes: &[u8]) -> Result<GenerateOutcome, RecipeError> {
        let image = decode_image(bytes)?;
        self.generate(&image)
    }

    /// Generates candidates with optional user overrides.
    ///
    /// A non-empty `user_title` replaces the decoded title of every valid
    /// candidate before tip matching. `user_ingredients` is a comma-separated
    /// list prepended to each valid candidate's ingredients, duplicates
    /// skipped. Invalid candidates and gate rejections are unaffected.
    pub fn generate_with_hints(
        &self,
        image: &DynamicImage,
        user_title: Option<&str>,
        user_ingredients: Option<&str>,
    ) -> Result<GenerateOutcome, RecipeError> {
        let tensor = self.transform.apply(image)?;

        let check = self.gate.classify_food(&tensor)?;
        if !check.is_food {
            info!(
                top_label_id = check.top_label_id,
                food_prob_mass = check.food_prob_mass,
                "image rejected by food gate"
            );
            return Ok(GenerateOutcome::Rejected(FoodRejection {
                top_label_id: check.top_label_id,
                food_prob_mass: check.food_prob_mass,
            }));
        }

        let user_title = user_title.map(str::trim).filter(|t| !t.is_empty());
        let hinted_ingredients = parse_ingredient_hints(user_ingredients);

        let candidates: Vec<Candidate> = FIXED_CANDIDATES
            .par_iter()
            .map(|&(policy, style)| {
                let raw = self.decoder.decode(self.model.as_ref(), &tensor, policy)?;
                let mut result =
                    reconstruct(&raw, &self.ingredient_vocab, &self.instruction_vocab);
                if let CandidateResult::Valid(recipe) = &mut result {
                    apply_hints(recipe, user_title, &hinted_ingredients);
                    append_tips(recipe);
                }
                debug!(style, valid = result.is_valid(), "candidate reconstructed");
                Ok(Candidate { style, result })
            })
            .collect::<Result<_, RecipeError>>()?;

        Ok(GenerateOutcome::Candidates(candidates))
    }
}

/// Splits a comma-separated ingredient hint into trimmed, non-empty names.
fn parse_ingredient_hints(hints: Option<&str>) -> Vec<String> {
    hints
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn apply_hints(recipe: &mut ReconstructedRecipe, title: Option<&str>, ingredients: &[String]) {
    if let Some(title) = title {
        recipe.title = title.to_string();
    }
    if !ingredients.is_empty() {
        let mut merged: Vec<String> = ingredients
            .iter()
            .filter(|hint| !recipe.ingredients.contains(hint))
            .cloned()
            .collect();
        merged.append(&mut recipe.ingredients);
        recipe.ingredients = merged;
    }
}

/// Initializes logging and loads the pipeline in one call. Convenience for
/// binaries embedding the pipeline.
pub fn bootstrap(config: &PipelineConfig) -> Result<InferenceContext, RecipeError> {
    init_tracing();
    InferenceContext::load(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Tensor3D, Tensor4D};
    use crate::model::ImageFeatures;
    use crate::reconstruct::UNIVERSAL_TIP;
    use crate::vocab::{EOI_TOKEN, END_TOKEN, PAD_TOKEN, START_TOKEN, UNK_TOKEN};
    use image::{Rgb, RgbImage};
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    struct ScriptedClassifier {
        probs: Vec<(usize, f32)>,
    }

    impl ImageClassifier for ScriptedClassifier {
        fn class_logits(&self, _image: &Tensor4D) -> Result<Vec<f32>, RecipeError> {
            let mut logits = vec![f32::NEG_INFINITY; 1000];
            for &(id, p) in &self.probs {
                logits[id] = p.ln();
            }
            Ok(logits)
        }
    }

    /// Model scripted with fixed token sequences, counting encoder calls so
    /// tests can assert the decoder never ran.
    struct CountingModel {
        vocab_size: usize,
        ingredient_script: Vec<i64>,
        instruction_script: Vec<i64>,
        encode_calls: Arc<AtomicUsize>,
    }

    fn one_hot(vocab_size: usize, token: i64) -> Vec<f32> {
        let mut logits = vec![f32::NEG_INFINITY; vocab_size];
        logits[token as usize] = 0.0;
        logits
    }

    impl RecipeModel for CountingModel {
        fn encode_image(&self, _image: &Tensor4D) -> Result<ImageFeatures, RecipeError> {
            self.encode_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ImageFeatures::new(Tensor3D::zeros((1, 1, 4))))
        }

        fn ingredient_logits(
            &self,
            _features: &ImageFeatures,
            prefix: &[i64],
        ) -> Result<Vec<f32>, RecipeError> {
            let step = prefix.len() - 1;
            let token = self.ingredient_script.get(step).copied().unwrap_or(2);
            Ok(one_hot(self.vocab_size, token))
        }

        fn instruction_logits(
            &self,
            _features: &ImageFeatures,
            _ingredients: &[i64],
            prefix: &[i64],
        ) -> Result<Vec<f32>, RecipeError> {
            let step = prefix.len() - 1;
            let token = self.instruction_script.get(step).copied().unwrap_or(2);
            Ok(one_hot(self.vocab_size, token))
        }
    }

    fn vocab(extra: &[&str]) -> Vocabulary {
        let mut tokens: Vec<String> = [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN, EOI_TOKEN]
            .iter()
            .map(|s| s.to_string())
            .collect();
        tokens.extend(extra.iter().map(|s| s.to_string()));
        Vocabulary::from_tokens(tokens).unwrap()
    }

    fn script(vocab: &Vocabulary, tokens: &[&str]) -> Vec<i64> {
        tokens.iter().map(|t| vocab.id_or_unk(t) as i64).collect()
    }

    fn food_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 300, Rgb([120, 80, 40])))
    }

    /// Context over a burger-scripted model and a classifier scripted with
    /// the given class probabilities.
    fn burger_context(
        classifier_probs: Vec<(usize, f32)>,
    ) -> (InferenceContext, Arc<AtomicUsize>) {
        let ingr = vocab(&["beef", "bun", "cheese"]);
        let instr = vocab(&["juicy", "burger", "grill", "the", "patty", "assemble", "it"]);

        let encode_calls = Arc::new(AtomicUsize::new(0));
        let model = CountingModel {
            vocab_size: instr.len().max(ingr.len()),
            ingredient_script: script(&ingr, &["beef", "bun", "cheese", END_TOKEN]),
            instruction_script: script(
                &instr,
                &[
                    "juicy", "burger", EOI_TOKEN, "grill", "the", "patty", EOI_TOKEN, "assemble",
                    "it", END_TOKEN,
                ],
            ),
            encode_calls: Arc::clone(&encode_calls),
        };

        let context = InferenceContext::from_components(
            Box::new(ScriptedClassifier {
                probs: classifier_probs,
            }),
            Box::new(model),
            ingr,
            instr,
            &PipelineConfig::default(),
        )
        .unwrap();
        (context, encode_calls)
    }

    #[test]
    fn test_food_image_yields_three_candidates() {
        let (context, _) = burger_context(vec![(933, 0.82), (0, 0.18)]);
        let outcome = context.generate(&food_image()).unwrap();

        let GenerateOutcome::Candidates(candidates) = outcome else {
            panic!("expected candidates");
        };
        assert_eq!(candidates.len(), 3);
        let styles: Vec<&str> = candidates.iter().map(|c| c.style).collect();
        assert_eq!(styles, vec!["standard", "conservative", "creative"]);
        for candidate in &candidates {
            assert!(candidate.result.is_valid());
        }
    }

    #[test]
    fn test_rejection_skips_decoding() {
        // Mass on "plate" only: below the food threshold. The decoder and
        // encoder must never run.
        let (context, encode_calls) = burger_context(vec![(923, 0.95), (933, 0.05)]);
        let outcome = context.generate(&food_image()).unwrap();

        let GenerateOutcome::Rejected(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(encode_calls.load(Ordering::SeqCst), 0);
        assert_eq!(rejection.top_label_id, 923);

        let response = GenerateOutcome::Rejected(rejection).into_response();
        assert_eq!(response.titles, vec![REJECTED_TITLE.to_string()]);
        assert_eq!(
            response.ingredients,
            vec![vec![REJECTED_MESSAGE.to_string()]]
        );
        assert_eq!(response.recipes.len(), 1);
        assert_eq!(
            response.recipes[0][0],
            "Our AI detected non-food content (Class ID: 923, Confidence: 0.05)."
        );
        assert_eq!(response.styles, vec!["rejected".to_string()]);
    }

    #[test]
    fn test_burger_candidate_gets_tips() {
        let (context, _) = burger_context(vec![(933, 0.9), (0, 0.1)]);
        let outcome = context.generate(&food_image()).unwrap();

        let GenerateOutcome::Candidates(candidates) = outcome else {
            panic!("expected candidates");
        };
        let CandidateResult::Valid(recipe) = &candidates[0].result else {
            panic!("expected valid candidate");
        };
        assert_eq!(recipe.title, "juicy burger");
        assert_eq!(recipe.ingredients, vec!["beef", "bun", "cheese"]);
        let steps = &recipe.steps;
        assert!(steps[steps.len() - 2].contains("juicy patty"));
        assert_eq!(steps[steps.len() - 1], UNIVERSAL_TIP);
    }

    #[test]
    fn test_greedy_candidate_is_deterministic() {
        let (context, _) = burger_context(vec![(933, 0.9), (0, 0.1)]);
        let first = context.generate(&food_image()).unwrap();
        let second = context.generate(&food_image()).unwrap();

        let (GenerateOutcome::Candidates(a), GenerateOutcome::Candidates(b)) = (first, second)
        else {
            panic!("expected candidates");
        };
        assert_eq!(a[0], b[0]);
    }

    #[test]
    fn test_user_hints_override_title_and_prepend_ingredients() {
        let (context, _) = burger_context(vec![(933, 0.9), (0, 0.1)]);
        let outcome = context
            .generate_with_hints(
                &food_image(),
                Some("Backyard Burger"),
                Some("pickles, beef , "),
            )
            .unwrap();

        let GenerateOutcome::Candidates(candidates) = outcome else {
            panic!("expected candidates");
        };
        let CandidateResult::Valid(recipe) = &candidates[0].result else {
            panic!("expected valid candidate");
        };
        assert_eq!(recipe.title, "Backyard Burger");
        // "beef" is already decoded, so only "pickles" is prepended.
        assert_eq!(recipe.ingredients, vec!["pickles", "beef", "bun", "cheese"]);
        // The tip matches the overridden title.
        assert!(recipe.steps[recipe.steps.len() - 2].contains("juicy patty"));
    }

    #[test]
    fn test_invalid_candidates_keep_their_slots() {
        // Ingredient script ends immediately: no ingredients decoded, so
        // every candidate is invalid but still occupies a slot.
        let ingr = vocab(&[]);
        let instr = vocab(&["plain", "toast", "butter", "it"]);
        let model = CountingModel {
            vocab_size: instr.len(),
            ingredient_script: script(&ingr, &[END_TOKEN]),
            instruction_script: script(&instr, &["plain", "toast", EOI_TOKEN, "butter", "it"]),
            encode_calls: Arc::new(AtomicUsize::new(0)),
        };
        let context = InferenceContext::from_components(
            Box::new(ScriptedClassifier {
                probs: vec![(933, 0.9), (0, 0.1)],
            }),
            Box::new(model),
            ingr,
            instr,
            &PipelineConfig::default(),
        )
        .unwrap();

        let response = context.generate(&food_image()).unwrap().into_response();
        assert_eq!(response.titles.len(), 3);
        for i in 0..3 {
            assert_eq!(response.titles[i], INVALID_RECIPE_TITLE);
            assert!(response.ingredients[i].is_empty());
            assert!(response.recipes[i][0].starts_with("Reason: "));
        }
    }

    #[test]
    fn test_instruction_vocab_without_separator_fails_startup() {
        // A vocabulary that passes the base reserved-token checks but lacks
        // the sentence separator must be rejected at assembly, not surface
        // as invalid candidates on every request.
        let ingr = vocab(&["beef"]);
        let instr = Vocabulary::from_tokens(
            [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN, "toast"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();

        let result = InferenceContext::from_components(
            Box::new(ScriptedClassifier {
                probs: vec![(933, 0.9), (0, 0.1)],
            }),
            Box::new(CountingModel {
                vocab_size: 8,
                ingredient_script: vec![],
                instruction_script: vec![],
                encode_calls: Arc::new(AtomicUsize::new(0)),
            }),
            ingr,
            instr,
            &PipelineConfig::default(),
        );
        assert!(matches!(result, Err(RecipeError::ConfigError { .. })));
    }

    #[test]
    fn test_generate_from_bytes_rejects_garbage() {
        let (context, _) = burger_context(vec![(933, 0.9), (0, 0.1)]);
        assert!(matches!(
            context.generate_from_bytes(&[0, 1, 2, 3]),
            Err(RecipeError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_config_from_json_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"food_threshold": 0.2, "data_dir": "/models"}}"#).unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.food_threshold, 0.2);
        assert_eq!(config.data_dir, PathBuf::from("/models"));
        assert_eq!(config.max_ingredients, MAX_INGREDIENTS);
        assert_eq!(config.session_pool_size, 1);
    }

    #[test]
    fn test_config_rejects_malformed_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(PipelineConfig::from_json_file(file.path()).is_err());
    }
}
