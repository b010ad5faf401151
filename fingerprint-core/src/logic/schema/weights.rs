//! Entropy Weights
//!
//! Weight per signal = stability × uniqueness, in [0, 1].
//! These are product-policy defaults, not values fitted to data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_FEATURE_WEIGHT;
use crate::logic::config::ConfigError;

/// Default weight table, in layout order
pub const DEFAULT_WEIGHTS: &[(&str, f64)] = &[
    ("screen_width", 0.45),
    ("screen_height", 0.45),
    ("screen_avail_width", 0.3),
    ("screen_avail_height", 0.3),
    ("color_depth", 0.2),
    ("pixel_ratio", 0.35),
    ("screen_frame", 0.15),
    ("hardware_concurrency", 0.4),
    ("device_memory", 0.3),
    ("max_touch_points", 0.25),
    ("platform", 0.3),
    ("architecture", 0.2),
    ("user_agent", 0.5),
    ("vendor", 0.15),
    ("vendor_flavors", 0.15),
    ("os_cpu", 0.2),
    ("browser_name", 0.25),
    ("browser_version", 0.2), // changes on every update
    ("languages", 0.4),
    ("timezone", 0.5),
    ("timezone_offset", 0.3),
    ("date_time_locale", 0.3),
    ("cookies_enabled", 0.05),
    ("local_storage", 0.05),
    ("session_storage", 0.05),
    ("indexed_db", 0.05),
    ("open_database", 0.05),
    ("canvas_hash", 0.9),
    ("webgl_vendor", 0.5),
    ("webgl_renderer", 0.8),
    ("webgl_params_hash", 0.75),
    ("webgl_extensions_hash", 0.6),
    ("audio_hash", 0.85),
    ("math_fingerprint", 0.4),
    ("fonts", 0.85),
    ("font_preferences_hash", 0.7),
    ("plugins", 0.5),
    ("do_not_track", 0.1),
    ("pdf_viewer_enabled", 0.1),
    ("color_gamut", 0.15),
    ("reduced_motion", 0.1),
    ("hdr", 0.1),
    ("http_header_order_hash", 0.45),
    ("accept_language", 0.35),
    ("tls_client_hello_hash", 0.6),
];

/// Per-signal weights used by the matcher and the confidence scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    weights: BTreeMap<String, f64>,
    /// Weight for keys not present in the table
    fallback: f64,
}

impl FeatureWeights {
    /// Default table shipped with the schema
    pub fn defaults() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS
                .iter()
                .map(|(key, weight)| (key.to_string(), *weight))
                .collect(),
            fallback: DEFAULT_FEATURE_WEIGHT,
        }
    }

    /// Uniform weights (every key counts the same)
    pub fn uniform(weight: f64) -> Self {
        Self {
            weights: BTreeMap::new(),
            fallback: weight,
        }
    }

    /// Build from an explicit table
    pub fn from_map(weights: BTreeMap<String, f64>, fallback: f64) -> Self {
        Self { weights, fallback }
    }

    /// Apply per-key overrides on top of this table
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, f64>) -> Self {
        for (key, weight) in overrides {
            self.weights.insert(key.clone(), *weight);
        }
        self
    }

    /// Weight of a key
    pub fn get(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(self.fallback)
    }

    /// Every weight must be finite and within [0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |key: &str, weight: f64| {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                Err(ConfigError::InvalidWeight {
                    key: key.to_string(),
                    weight,
                })
            } else {
                Ok(())
            }
        };

        check("<fallback>", self.fallback)?;
        for (key, weight) in &self.weights {
            check(key, *weight)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::schema::layout::{SIGNAL_COUNT, SIGNAL_LAYOUT};

    #[test]
    fn test_default_table_covers_layout() {
        let weights = FeatureWeights::defaults();
        assert_eq!(weights.len(), SIGNAL_COUNT);
        for (key, _) in DEFAULT_WEIGHTS {
            assert!(SIGNAL_LAYOUT.contains(key), "weight for unknown key {}", key);
        }
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_uses_fallback() {
        let weights = FeatureWeights::defaults();
        assert_eq!(weights.get("not_a_signal"), DEFAULT_FEATURE_WEIGHT);
        assert_eq!(weights.get("canvas_hash"), 0.9);
    }

    #[test]
    fn test_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("canvas_hash".to_string(), 0.5);
        let weights = FeatureWeights::defaults().with_overrides(&overrides);
        assert_eq!(weights.get("canvas_hash"), 0.5);
    }

    #[test]
    fn test_rejects_negative_and_oversized_weights() {
        let mut overrides = BTreeMap::new();
        overrides.insert("fonts".to_string(), -0.1);
        let weights = FeatureWeights::defaults().with_overrides(&overrides);
        assert!(matches!(
            weights.validate(),
            Err(ConfigError::InvalidWeight { ref key, .. }) if key == "fonts"
        ));

        assert!(FeatureWeights::uniform(1.5).validate().is_err());
        assert!(FeatureWeights::uniform(f64::NAN).validate().is_err());
    }
}
