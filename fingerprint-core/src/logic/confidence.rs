//! Confidence Scorer
//!
//! How much of the intended signal set was actually collected.
//! Weighted: a missing high-entropy signal costs more than a missing
//! storage flag. Independent of matching.

use std::collections::BTreeSet;

use crate::logic::canonical::CanonicalVector;
use crate::logic::schema::FeatureWeights;

/// Weighted fraction of `expected_keys` present as non-null in `vector`
///
/// Total: an empty expected set or zero total weight yields 0.
pub fn score(vector: &CanonicalVector, expected_keys: &BTreeSet<String>, weights: &FeatureWeights) -> f64 {
    let mut total = 0.0;
    let mut present = 0.0;

    for key in expected_keys {
        let weight = weights.get(key);
        total += weight;
        if vector.get(key).is_some_and(|value| !value.is_null()) {
            present += weight;
        }
    }

    if total <= 0.0 {
        return 0.0;
    }
    (present / total).clamp(0.0, 1.0)
}

/// Expected set = every key the vector was built against
pub fn score_all(vector: &CanonicalVector, weights: &FeatureWeights) -> f64 {
    let expected = vector.iter().map(|entry| entry.key.clone()).collect();
    score(vector, &expected, weights)
}
