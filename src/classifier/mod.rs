//! Food classifier gate.
//!
//! A general-purpose 1000-class image classifier runs once per request. The
//! gate applies softmax over its logits, sums the probability mass assigned
//! to the designated food-label subset, and rejects the image when that mass
//! falls below the threshold. The top label is diagnostic only; ties among
//! labels are irrelevant because only the subset sum matters.

pub mod food_labels;

use crate::core::inference::OrtInfer;
use crate::core::{RecipeError, Tensor4D};
use crate::decoder::sampling::{argmax, softmax};
use food_labels::is_food_label;
use std::path::Path;
use tracing::debug;

/// Default food-probability threshold. Trades false rejections of borderline
/// photos against the cost of decoding garbage from non-food input. Tunable,
/// not derived.
pub const DEFAULT_FOOD_THRESHOLD: f32 = 0.15;

/// Produces a class-logit vector for a preprocessed image.
///
/// This is the seam between the food gate and the backing model, so tests
/// can substitute scripted classifiers.
pub trait ImageClassifier: Send + Sync {
    /// Returns one logit per class for the single image in the batch.
    fn class_logits(&self, image: &Tensor4D) -> Result<Vec<f32>, RecipeError>;
}

/// ONNX-backed image classifier.
#[derive(Debug)]
pub struct OnnxImageClassifier {
    inference: OrtInfer,
}

impl OnnxImageClassifier {
    /// Loads the classifier model.
    pub fn load(model_path: &Path, pool_size: usize) -> Result<Self, RecipeError> {
        let inference = OrtInfer::load(model_path, "food-classifier", pool_size)?;
        Ok(Self { inference })
    }
}

impl ImageClassifier for OnnxImageClassifier {
    fn class_logits(&self, image: &Tensor4D) -> Result<Vec<f32>, RecipeError> {
        let predictions = self.inference.infer_2d(image)?;
        let row = predictions.row(0);
        Ok(row.to_vec())
    }
}

/// Result of running the food gate on one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodCheck {
    /// Whether the food-probability mass reached the threshold.
    pub is_food: bool,
    /// Most probable class id. Diagnostic only.
    pub top_label_id: usize,
    /// Probability of the top class.
    pub top_prob: f32,
    /// Summed probability mass over the food-label subset.
    pub food_prob_mass: f32,
}

/// The probability-threshold check that rejects non-food images before
/// expensive decoding.
pub struct FoodGate {
    classifier: Box<dyn ImageClassifier>,
    threshold: f32,
}

impl std::fmt::Debug for FoodGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoodGate")
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl FoodGate {
    /// Creates a gate over a classifier with the given threshold.
    pub fn new(classifier: Box<dyn ImageClassifier>, threshold: f32) -> Result<Self, RecipeError> {
        if !(threshold.is_finite() && (0.0..=1.0).contains(&threshold)) {
            return Err(RecipeError::config_error(format!(
                "food threshold must be in [0, 1], got {threshold}"
            )));
        }
        Ok(Self {
            classifier,
            threshold,
        })
    }

    /// Runs the classifier once and applies the decision rule.
    pub fn classify_food(&self, image: &Tensor4D) -> Result<FoodCheck, RecipeError> {
        let logits = self.classifier.class_logits(image)?;
        if logits.is_empty() {
            return Err(RecipeError::invalid_input(
                "classifier produced no class logits",
            ));
        }
        let probabilities = softmax(&logits);
        let food_prob_mass: f32 = probabilities
            .iter()
            .enumerate()
            .filter(|(id, _)| is_food_label(*id))
            .map(|(_, p)| p)
            .sum();
        let top_label_id = argmax(&probabilities);
        let top_prob = probabilities[top_label_id];
        let is_food = food_prob_mass >= self.threshold;

        debug!(
            top_label_id,
            top_prob, food_prob_mass, is_food, "food gate decision"
        );

        Ok(FoodCheck {
            is_food,
            top_label_id,
            top_prob,
            food_prob_mass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifier scripted with exact class probabilities: passing ln(p)
    /// logits through softmax recovers p.
    struct ScriptedClassifier {
        probs: Vec<(usize, f32)>,
        classes: usize,
    }

    impl ImageClassifier for ScriptedClassifier {
        fn class_logits(&self, _image: &Tensor4D) -> Result<Vec<f32>, RecipeError> {
            let mut logits = vec![f32::NEG_INFINITY; self.classes];
            for &(id, p) in &self.probs {
                logits[id] = p.ln();
            }
            Ok(logits)
        }
    }

    fn image() -> Tensor4D {
        Tensor4D::zeros((1, 3, 224, 224))
    }

    #[test]
    fn test_gate_accepts_food_heavy_image() {
        // 0.82 on cheeseburger (933), remainder on a non-food class.
        let gate = FoodGate::new(
            Box::new(ScriptedClassifier {
                probs: vec![(933, 0.82), (0, 0.18)],
                classes: 1000,
            }),
            DEFAULT_FOOD_THRESHOLD,
        )
        .unwrap();

        let check = gate.classify_food(&image()).unwrap();
        assert!(check.is_food);
        assert_eq!(check.top_label_id, 933);
        assert!((check.food_prob_mass - 0.82).abs() < 1e-3);
    }

    #[test]
    fn test_gate_rejects_non_food_image() {
        // Mass on "plate" (923) and "cup" (968) does not count as food.
        let gate = FoodGate::new(
            Box::new(ScriptedClassifier {
                probs: vec![(923, 0.5), (968, 0.4), (959, 0.1)],
                classes: 1000,
            }),
            DEFAULT_FOOD_THRESHOLD,
        )
        .unwrap();

        let check = gate.classify_food(&image()).unwrap();
        assert!(!check.is_food);
        assert_eq!(check.top_label_id, 923);
        assert!((check.food_prob_mass - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_gate_threshold_boundary() {
        // The decision rule is >=, so mass just above the threshold passes
        // and mass well below it does not.
        let gate = FoodGate::new(
            Box::new(ScriptedClassifier {
                probs: vec![(963, 0.16), (0, 0.84)],
                classes: 1000,
            }),
            DEFAULT_FOOD_THRESHOLD,
        )
        .unwrap();
        assert!(gate.classify_food(&image()).unwrap().is_food);

        let gate = FoodGate::new(
            Box::new(ScriptedClassifier {
                probs: vec![(963, 0.14), (0, 0.86)],
                classes: 1000,
            }),
            DEFAULT_FOOD_THRESHOLD,
        )
        .unwrap();
        assert!(!gate.classify_food(&image()).unwrap().is_food);
    }

    #[test]
    fn test_gate_threshold_is_inclusive() {
        // Measure the mass once, then gate on exactly that f32 value: the
        // decision rule is >=, so equal mass passes and any larger threshold
        // fails.
        let scripted = || {
            Box::new(ScriptedClassifier {
                probs: vec![(963, 0.15), (0, 0.85)],
                classes: 1000,
            })
        };
        let mass = FoodGate::new(scripted(), 0.0)
            .unwrap()
            .classify_food(&image())
            .unwrap()
            .food_prob_mass;

        let gate = FoodGate::new(scripted(), mass).unwrap();
        assert!(gate.classify_food(&image()).unwrap().is_food);

        let gate = FoodGate::new(scripted(), mass + f32::EPSILON).unwrap();
        assert!(!gate.classify_food(&image()).unwrap().is_food);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let classifier = Box::new(ScriptedClassifier {
            probs: vec![],
            classes: 10,
        });
        assert!(FoodGate::new(classifier, 1.5).is_err());
    }
}
