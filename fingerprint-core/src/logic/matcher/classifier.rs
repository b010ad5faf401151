//! Similarity Classifier
//!
//! Only the matching logic lives here.
//! Input: incoming per-feature hashes, stored record(s), weights, thresholds
//! Output: MatchResult / BestMatch

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::rules::{MatchThresholds, SCORE_EPSILON};
use super::types::{BestMatch, Classification, MatchResult};
use crate::logic::identity::FeatureHashes;
use crate::logic::schema::FeatureWeights;
use crate::logic::store::FingerprintRecord;

// ============================================================================
// MAIN MATCH FUNCTION
// ============================================================================

/// Compare incoming hashes against one stored record
pub fn match_record(
    incoming: &FeatureHashes,
    stored: &FingerprintRecord,
    weights: &FeatureWeights,
    thresholds: &MatchThresholds,
) -> MatchResult {
    match_features(incoming, &stored.features, weights, thresholds)
}

/// Weighted similarity over the union of keys present on either side
pub fn match_features(
    incoming: &FeatureHashes,
    stored: &FeatureHashes,
    weights: &FeatureWeights,
    thresholds: &MatchThresholds,
) -> MatchResult {
    // Sorted union: accumulation order is fixed
    let keys: BTreeSet<&String> = incoming.keys().chain(stored.keys()).collect();

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut shared = 0usize;
    let mut matched_keys = BTreeSet::new();

    for key in keys {
        let weight = weights.get(key);
        denominator += weight;

        if let (Some(a), Some(b)) = (incoming.get(key), stored.get(key)) {
            shared += 1;
            if a == b {
                numerator += weight;
                matched_keys.insert(key.clone());
            }
        }
    }

    // Zero-overlap guard: never a variant, whatever the thresholds say
    if shared == 0 || matched_keys.is_empty() || denominator <= 0.0 {
        return MatchResult::new_device();
    }

    let score = (numerator / denominator).clamp(0.0, 1.0);

    MatchResult {
        classification: classify_score(score, thresholds),
        score,
        matched_keys,
    }
}

/// Map a score to a classification (both thresholds inclusive)
pub fn classify_score(score: f64, thresholds: &MatchThresholds) -> Classification {
    if score + SCORE_EPSILON >= thresholds.high {
        Classification::KnownDevice
    } else if score + SCORE_EPSILON >= thresholds.low {
        Classification::LikelyVariant
    } else {
        Classification::NewDevice
    }
}

// ============================================================================
// CANDIDATE SELECTION
// ============================================================================

/// Evaluate every candidate and pick one winner
///
/// Order: highest score, then most recent `last_seen_at`, then smallest
/// `device_id`. A winner classified `NewDevice` carries no device id.
pub fn best_match(
    incoming: &FeatureHashes,
    candidates: &[FingerprintRecord],
    weights: &FeatureWeights,
    thresholds: &MatchThresholds,
) -> BestMatch {
    let winner = candidates
        .iter()
        .map(|record| (record, match_record(incoming, record, weights, thresholds)))
        .min_by(|(ra, ma), (rb, mb)| {
            mb.score
                .partial_cmp(&ma.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| rb.last_seen_at.cmp(&ra.last_seen_at))
                .then_with(|| ra.device_id.cmp(&rb.device_id))
        });

    match winner {
        Some((record, result)) if result.classification.is_match() => BestMatch {
            device_id: Some(record.device_id.clone()),
            result,
            candidates: candidates.len(),
        },
        Some((_, result)) => BestMatch {
            device_id: None,
            result,
            candidates: candidates.len(),
        },
        None => BestMatch::none(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn hashes(pairs: &[(&str, &str)]) -> FeatureHashes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn record(device_id: &str, features: FeatureHashes, age_secs: i64) -> FingerprintRecord {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() - Duration::seconds(age_secs);
        FingerprintRecord::new(device_id.to_string(), features, now)
    }

    fn uniform() -> FeatureWeights {
        FeatureWeights::uniform(1.0)
    }

    #[test]
    fn test_identical_is_known_device() {
        let features = hashes(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let stored = record("dev", features.clone(), 0);

        let result = match_record(&features, &stored, &uniform(), &MatchThresholds::default());
        assert_eq!(result.classification, Classification::KnownDevice);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.matched_keys.len(), 3);
    }

    #[test]
    fn test_high_threshold_boundary_inclusive() {
        // 17 of 20 uniform keys match → exactly 0.85
        let stored: FeatureHashes = (0..20).map(|i| (format!("k{:02}", i), "x".to_string())).collect();
        let incoming: FeatureHashes = (0..20)
            .map(|i| (format!("k{:02}", i), if i < 17 { "x" } else { "y" }.to_string()))
            .collect();

        let result = match_features(&incoming, &stored, &uniform(), &MatchThresholds::default());
        assert!((result.score - 0.85).abs() < 1e-12);
        assert_eq!(result.classification, Classification::KnownDevice);
    }

    #[test]
    fn test_boundary_inclusive_with_fractional_weights() {
        // 0.1-weighted sums do not land exactly on 0.85
        let stored: FeatureHashes = (0..20).map(|i| (format!("k{:02}", i), "x".to_string())).collect();
        let incoming: FeatureHashes = (0..20)
            .map(|i| (format!("k{:02}", i), if i < 17 { "x" } else { "y" }.to_string()))
            .collect();

        let result = match_features(&incoming, &stored, &FeatureWeights::uniform(0.1), &MatchThresholds::default());
        assert_eq!(result.classification, Classification::KnownDevice);
    }

    #[test]
    fn test_variant_and_new_bands() {
        let stored = hashes(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")]);

        // 3/5 = 0.6 → LikelyVariant (low inclusive)
        let incoming = hashes(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "x"), ("e", "x")]);
        let result = match_features(&incoming, &stored, &uniform(), &MatchThresholds::default());
        assert_eq!(result.classification, Classification::LikelyVariant);

        // 2/5 = 0.4 → NewDevice
        let incoming = hashes(&[("a", "1"), ("b", "2"), ("c", "x"), ("d", "x"), ("e", "x")]);
        let result = match_features(&incoming, &stored, &uniform(), &MatchThresholds::default());
        assert_eq!(result.classification, Classification::NewDevice);
        assert!((result.score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_keys_on_one_side_count_in_denominator() {
        let stored = hashes(&[("a", "1"), ("b", "2")]);
        let incoming = hashes(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);

        let result = match_features(&incoming, &stored, &uniform(), &MatchThresholds::default());
        assert_eq!(result.score, 0.5);
        assert!(!result.matched_keys.contains("c"));
    }

    #[test]
    fn test_zero_overlap_guard_for_any_thresholds() {
        let stored = hashes(&[("a", "1"), ("b", "2")]);
        let incoming = hashes(&[("c", "3"), ("d", "4")]);

        for thresholds in [
            MatchThresholds::default(),
            MatchThresholds::new(0.0, 0.0),
            MatchThresholds::new(1.0, 0.0),
        ] {
            let result = match_features(&incoming, &stored, &uniform(), &thresholds);
            assert_eq!(result.classification, Classification::NewDevice);
            assert_eq!(result.score, 0.0);
        }
    }

    #[test]
    fn test_empty_inputs_never_divide_by_zero() {
        let result = match_features(&FeatureHashes::new(), &FeatureHashes::new(), &uniform(), &MatchThresholds::default());
        assert_eq!(result, MatchResult::new_device());

        // All-zero weights
        let features = hashes(&[("a", "1")]);
        let result = match_features(&features, &features, &FeatureWeights::uniform(0.0), &MatchThresholds::default());
        assert_eq!(result.classification, Classification::NewDevice);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_monotonic_in_matched_high_weight_keys() {
        let weights = FeatureWeights::defaults();
        let thresholds = MatchThresholds::default();
        let keys = ["canvas_hash", "audio_hash", "fonts", "webgl_renderer", "timezone", "platform"];

        let stored: FeatureHashes = keys.iter().map(|k| (k.to_string(), "same".to_string())).collect();

        let mut last = 0.0;
        for matched in 0..=keys.len() {
            let incoming: FeatureHashes = keys
                .iter()
                .enumerate()
                .map(|(i, k)| (k.to_string(), if i < matched { "same" } else { "diff" }.to_string()))
                .collect();
            let score = match_features(&incoming, &stored, &weights, &thresholds).score;
            assert!(score >= last, "score dropped from {} to {} at {}", last, score, matched);
            last = score;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn test_best_match_prefers_highest_score() {
        let incoming = hashes(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let candidates = vec![
            record("partial", hashes(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "x")]), 0),
            record("exact", incoming.clone(), 100),
        ];

        let best = best_match(&incoming, &candidates, &uniform(), &MatchThresholds::default());
        assert_eq!(best.device_id.as_deref(), Some("exact"));
        assert_eq!(best.candidates, 2);
    }

    #[test]
    fn test_best_match_tie_break() {
        let incoming = hashes(&[("a", "1")]);

        // Equal score: most recently seen wins
        let candidates = vec![
            record("older", incoming.clone(), 500),
            record("newer", incoming.clone(), 10),
        ];
        let best = best_match(&incoming, &candidates, &uniform(), &MatchThresholds::default());
        assert_eq!(best.device_id.as_deref(), Some("newer"));

        // Equal score and recency: smallest id wins
        let candidates = vec![
            record("bbb", incoming.clone(), 10),
            record("aaa", incoming.clone(), 10),
        ];
        let best = best_match(&incoming, &candidates, &uniform(), &MatchThresholds::default());
        assert_eq!(best.device_id.as_deref(), Some("aaa"));
    }

    #[test]
    fn test_best_match_without_candidates_or_match() {
        let incoming = hashes(&[("a", "1")]);
        let best = best_match(&incoming, &[], &uniform(), &MatchThresholds::default());
        assert_eq!(best, BestMatch::none());

        let candidates = vec![record("other", hashes(&[("a", "2")]), 0)];
        let best = best_match(&incoming, &candidates, &uniform(), &MatchThresholds::default());
        assert!(best.device_id.is_none());
        assert_eq!(best.result.classification, Classification::NewDevice);
    }

    #[test]
    fn test_classify_score() {
        let t = MatchThresholds::default();
        assert_eq!(classify_score(1.0, &t), Classification::KnownDevice);
        assert_eq!(classify_score(0.85, &t), Classification::KnownDevice);
        assert_eq!(classify_score(0.84, &t), Classification::LikelyVariant);
        assert_eq!(classify_score(0.6, &t), Classification::LikelyVariant);
        assert_eq!(classify_score(0.59, &t), Classification::NewDevice);
    }
}
