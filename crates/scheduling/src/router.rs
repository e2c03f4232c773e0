//! Weighted model routing

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use llm_inference_director_core::InferenceModel;

/// Resolve a logical model to one of its physical targets by weighted draw.
///
/// Any target without a weight makes the whole draw uniform. Returns `None`
/// for an empty target list; callers route by the logical name in that case.
pub fn random_weighted_draw(model: &InferenceModel, seed: u64) -> Option<String> {
    let targets = &model.target_models;
    if targets.is_empty() {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let total: u64 = if targets.iter().any(|t| t.weight.is_none()) {
        0
    } else {
        targets.iter().map(|t| u64::from(t.weight.unwrap_or(0))).sum()
    };

    if total == 0 {
        // Nil or all-zero weights: uniform pick.
        let index = rng.random_range(0..targets.len());
        return Some(targets[index].name.clone());
    }

    let drawn = rng.random_range(0..total);
    let mut acc = 0u64;
    for target in targets {
        acc += u64::from(target.weight.unwrap_or(0));
        if drawn < acc {
            return Some(target.name.clone());
        }
    }

    // Unreachable: acc == total > drawn by the end of the loop.
    None
}
