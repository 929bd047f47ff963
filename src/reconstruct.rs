//! Token-to-text reconstruction and validity checking.
//!
//! Raw decoded id sequences become a titled, stepped recipe here. The
//! instruction stream is segmented at the sentence boundary marker: the first
//! segment is the title, the remaining segments are the recipe steps. The
//! ingredient stream is mapped token by token with consecutive duplicates
//! collapsed. A candidate that fails a structural check becomes
//! [`CandidateResult::Invalid`] with a reason instead of a recipe; callers
//! pattern-match rather than compare sentinel strings.

use crate::decoder::RawDecodeOutput;
use crate::vocab::Vocabulary;
use serde::Serialize;

/// Title shown in the output slot of an invalid candidate.
pub const INVALID_RECIPE_TITLE: &str = "Not a valid recipe!";

/// Appended to every valid candidate after any dish-specific tip.
pub const UNIVERSAL_TIP: &str =
    "General: Ensure all fresh ingredients are washed and prepped before starting.";

/// Dish-category keyword to tip table. Scanned in order against the
/// lowercased title; the first match wins and at most one tip is appended.
pub const DISH_TIPS: &[(&str, &str)] = &[
    (
        "burger",
        "Pro Tip: For a juicy patty, mix ground meat with salt, pepper, and a dash of Worcestershire sauce. Form gently and indent the center to prevent bulging.",
    ),
    (
        "sandwich",
        "Pro Tip: Toasting the bread and applying a thin layer of mayo or butter creates a moisture barrier to prevent sogginess.",
    ),
    (
        "pizza",
        "Pro Tip: For the best dough, let it rest in the fridge overnight. Stretch it by hand instead of rolling to keep air bubbles.",
    ),
    (
        "pasta",
        "Pro Tip: Save some pasta water before draining! Use it to emulsify the sauce for a silky texture.",
    ),
    (
        "salad",
        "Pro Tip: Only dress the salad right before serving to keep the leaves crisp and fresh.",
    ),
    (
        "cake",
        "Pro Tip: Let the cake layers cool completely before frosting to prevent the frosting from melting.",
    ),
    (
        "soup",
        "Pro Tip: Sauté the aromatic vegetables (onions, carrots, celery) first to build a deep flavor base.",
    ),
    (
        "pie",
        "Pro Tip: Keep your butter and water ice-cold when making the crust for maximum flakiness.",
    ),
    (
        "curry",
        "Pro Tip: Toast your spices in oil before adding liquids to release their essential oils and enhance flavor.",
    ),
];

/// A reconstructed, human-readable recipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructedRecipe {
    /// Dish title assembled from the first instruction segment.
    pub title: String,
    /// Ingredient names in decode order, consecutive duplicates removed.
    pub ingredients: Vec<String>,
    /// Ordered recipe steps, tips included once appended.
    pub steps: Vec<String>,
}

/// Outcome of reconstructing one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateResult {
    /// Structurally sound recipe.
    Valid(ReconstructedRecipe),
    /// Degenerate sequence; the reason names the failed check.
    Invalid { reason: String },
}

impl CandidateResult {
    /// Whether this candidate passed the structural checks.
    pub fn is_valid(&self) -> bool {
        matches!(self, CandidateResult::Valid(_))
    }
}

/// Maps one raw decode output to text and applies the structural checks.
pub fn reconstruct(
    raw: &RawDecodeOutput,
    ingredient_vocab: &Vocabulary,
    instruction_vocab: &Vocabulary,
) -> CandidateResult {
    let ingredients = reconstruct_ingredients(&raw.ingredient_ids, ingredient_vocab);

    let (segments, total, unk_count) =
        segment_instructions(&raw.instruction_ids, instruction_vocab);

    // A stream dominated by the unknown token is decoder degeneration, not a
    // recipe with a few gaps.
    if total > 0 && unk_count * 2 > total {
        return CandidateResult::Invalid {
            reason: "instructions are mostly unknown tokens".to_string(),
        };
    }
    if ingredients.is_empty() {
        return CandidateResult::Invalid {
            reason: "no ingredients were decoded".to_string(),
        };
    }

    let mut segments = segments.into_iter();
    let title = segments.next().unwrap_or_default();
    if title.is_empty() {
        return CandidateResult::Invalid {
            reason: "no title was decoded".to_string(),
        };
    }
    let steps: Vec<String> = segments.filter(|s| !s.is_empty()).collect();
    if steps.is_empty() {
        return CandidateResult::Invalid {
            reason: "no instruction steps were decoded".to_string(),
        };
    }

    CandidateResult::Valid(ReconstructedRecipe {
        title,
        ingredients,
        steps,
    })
}

/// Appends at most one dish-specific tip plus the universal tip.
///
/// The title is scanned lowercased; [`DISH_TIPS`] order decides precedence
/// when several keywords match.
pub fn append_tips(recipe: &mut ReconstructedRecipe) {
    let title_lower = recipe.title.to_lowercase();
    if let Some((_, tip)) = DISH_TIPS
        .iter()
        .find(|(keyword, _)| title_lower.contains(keyword))
    {
        recipe.steps.push(tip.to_string());
    }
    recipe.steps.push(UNIVERSAL_TIP.to_string());
}

/// Maps ingredient ids to names: stops at the end token or group separator,
/// skips padding and unknown tokens, collapses consecutive repeats.
fn reconstruct_ingredients(ids: &[i64], vocab: &Vocabulary) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for &id in ids {
        let id = id as usize;
        if id == vocab.end_id() || Some(id) == vocab.true_end_id() {
            break;
        }
        if id == vocab.pad_id() || id == vocab.start_id() || id == vocab.unk_id() {
            continue;
        }
        let Some(token) = vocab.token(id) else {
            continue;
        };
        if out.last().map(String::as_str) != Some(token) {
            out.push(token.to_string());
        }
    }
    out
}

/// Splits the instruction stream at sentence boundaries into joined word
/// segments. Returns the segments plus the counted content and unknown
/// tokens for the degeneration check.
fn segment_instructions(ids: &[i64], vocab: &Vocabulary) -> (Vec<String>, usize, usize) {
    let eoi_id = vocab.eoi_id();
    let mut segments: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut total = 0usize;
    let mut unk_count = 0usize;

    for &id in ids {
        let id = id as usize;
        if id == vocab.end_id() {
            break;
        }
        if id == vocab.pad_id() || id == vocab.start_id() {
            continue;
        }
        if Some(id) == eoi_id {
            segments.push(current.join(" "));
            current.clear();
            continue;
        }
        total += 1;
        if id == vocab.unk_id() {
            unk_count += 1;
            continue;
        }
        if let Some(token) = vocab.token(id) {
            current.push(token);
        }
    }
    segments.push(current.join(" "));
    (segments, total, unk_count)
}
