//! Token selection primitives: softmax, argmax, temperature sampling, and
//! beam search over a step-logits function.

use crate::core::RecipeError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Numerically stable softmax. Non-finite logits contribute zero mass; an
/// all-masked input yields the zero vector.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let mut max = f32::NEG_INFINITY;
    for &val in logits {
        if val.is_finite() && val > max {
            max = val;
        }
    }
    let mut exps = Vec::with_capacity(logits.len());
    let mut sum = 0.0f32;
    for &val in logits {
        let exp = if val.is_finite() { (val - max).exp() } else { 0.0 };
        exps.push(exp);
        sum += exp;
    }
    if sum == 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}

/// Index of the largest finite logit. NaN entries are skipped; ties keep the
/// first occurrence.
pub fn argmax(logits: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &val) in logits.iter().enumerate() {
        if val.is_nan() {
            continue;
        }
        if val > best_val {
            best_val = val;
            best_idx = idx;
        }
    }
    best_idx
}

/// Draws one token from the temperature-scaled softmax distribution.
///
/// The temperature divides the logits before softmax: values below 1 sharpen
/// the distribution toward high-confidence tokens, values above 1 flatten it.
/// Falls back to argmax when the distribution degenerates.
pub fn sample_with_temperature<R: Rng>(logits: &[f32], temperature: f32, rng: &mut R) -> usize {
    let scaled: Vec<f32>;
    let logits = if (temperature - 1.0).abs() > f32::EPSILON {
        scaled = logits.iter().map(|&v| v / temperature).collect();
        &scaled[..]
    } else {
        logits
    };

    let probs = softmax(logits);
    match WeightedIndex::new(&probs) {
        Ok(dist) => dist.sample(rng),
        Err(_) => argmax(logits),
    }
}

/// One partial hypothesis tracked during beam search.
#[derive(Debug, Clone)]
struct Beam {
    /// Decoded prefix including the start token.
    prefix: Vec<i64>,
    /// Cumulative log-probability of the emitted tokens.
    log_prob: f32,
    finished: bool,
}

/// Beam search over a step-logits function.
///
/// Tracks the top-`width` partial sequences by cumulative log-probability.
/// Each hypothesis terminates when it emits `end_id` or reaches `max_len`
/// emitted tokens. Returns the emitted tokens (start and end excluded) of
/// the best hypothesis.
pub fn beam_search(
    step: &mut dyn FnMut(&[i64]) -> Result<Vec<f32>, RecipeError>,
    start_id: i64,
    end_id: i64,
    max_len: usize,
    width: usize,
) -> Result<Vec<i64>, RecipeError> {
    if width == 0 {
        return Err(RecipeError::invalid_input("beam width must be positive"));
    }

    let mut beams = vec![Beam {
        prefix: vec![start_id],
        log_prob: 0.0,
        finished: false,
    }];

    for _ in 0..max_len {
        if beams.iter().all(|b| b.finished) {
            break;
        }

        let mut expanded: Vec<Beam> = Vec::new();
        for beam in &beams {
            if beam.finished {
                expanded.push(beam.clone());
                continue;
            }
            let logits = step(&beam.prefix)?;
            let probs = softmax(&logits);
            // Only the top `width` continuations of each beam can survive
            // the global cut.
            let mut ranked: Vec<(usize, f32)> = probs
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, p)| *p > 0.0)
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            for (token, prob) in ranked.into_iter().take(width) {
                let mut next = beam.clone();
                next.log_prob += prob.ln();
                if token as i64 == end_id {
                    next.finished = true;
                } else {
                    next.prefix.push(token as i64);
                }
                expanded.push(next);
            }
        }

        if expanded.is_empty() {
            break;
        }
        expanded.sort_by(|a, b| {
            b.log_prob
                .partial_cmp(&a.log_prob)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        expanded.truncate(width);
        beams = expanded;
    }

    let best = beams
        .into_iter()
        .max_by(|a, b| {
            a.log_prob
                .partial_cmp(&b.log_prob)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or_else(|| RecipeError::invalid_input("beam search produced no hypotheses"))?;
    Ok(best.prefix[1..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_handles_neg_infinity() {
        let probs = softmax(&[f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY]);
        assert_eq!(probs[0], 0.0);
        assert!((probs[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_first_max_wins() {
        assert_eq!(argmax(&[0.5, 2.0, 2.0, 1.0]), 1);
    }

    #[test]
    fn test_low_temperature_sharpens() {
        let logits = [2.0, 1.0, 0.0];
        let standard = softmax(&logits);
        let sharpened = softmax(&logits.iter().map(|v| v / 0.5).collect::<Vec<_>>());
        assert!(sharpened[0] > standard[0]);
    }

    #[test]
    fn test_sample_degenerate_distribution() {
        // All mass on one token: sampling must return it.
        let mut rng = StdRng::seed_from_u64(7);
        let logits = [f32::NEG_INFINITY, 10.0, f32::NEG_INFINITY];
        for _ in 0..16 {
            assert_eq!(sample_with_temperature(&logits, 0.8, &mut rng), 1);
        }
    }

    #[test]
    fn test_sample_all_masked_falls_back_to_argmax() {
        let mut rng = StdRng::seed_from_u64(7);
        let logits = [f32::NEG_INFINITY; 4];
        let token = sample_with_temperature(&logits, 1.2, &mut rng);
        assert!(token < 4);
    }

    #[test]
    fn test_beam_search_prefers_higher_cumulative_probability() {
        // Token ids: 0 = start, 1 = end, 2 and 3 are content tokens.
        // Greedy takes token 2 first (0.6 > 0.4) but the best two-step path
        // is 3 followed by end: 0.4 * 0.9 beats any continuation of 2.
        let mut step = |prefix: &[i64]| -> Result<Vec<f32>, RecipeError> {
            let logits = match prefix {
                [0] => vec![f32::NEG_INFINITY, f32::NEG_INFINITY, 0.6f32.ln(), 0.4f32.ln()],
                [0, 2] => vec![f32::NEG_INFINITY, 0.1f32.ln(), 0.45f32.ln(), 0.45f32.ln()],
                [0, 3] => vec![f32::NEG_INFINITY, 0.9f32.ln(), 0.05f32.ln(), 0.05f32.ln()],
                _ => vec![f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY, f32::NEG_INFINITY],
            };
            Ok(logits)
        };

        let tokens = beam_search(&mut step, 0, 1, 2, 2).unwrap();
        assert_eq!(tokens, vec![3]);
    }

    #[test]
    fn test_beam_search_terminates_on_end_token() {
        let mut step = |_prefix: &[i64]| -> Result<Vec<f32>, RecipeError> {
            Ok(vec![f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY])
        };
        let tokens = beam_search(&mut step, 0, 1, 10, 3).unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_beam_search_zero_width_is_error() {
        let mut step = |_: &[i64]| Ok(vec![0.0]);
        assert!(beam_search(&mut step, 0, 1, 4, 0).is_err());
    }
}
