//! Central Configuration Constants
//!
//! Single source of truth for all engine defaults.
//! `EngineConfig` starts from these values and then applies file/env overrides.

/// Default similarity threshold for `KnownDevice` (inclusive)
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.85;

/// Default similarity threshold for `LikelyVariant` (inclusive)
pub const DEFAULT_LOW_THRESHOLD: f64 = 0.6;

/// Weight used for signal keys that have no configured weight
pub const DEFAULT_FEATURE_WEIGHT: f64 = 0.1;

/// Maximum number of (timestamp, score) entries kept per fingerprint record
pub const DEFAULT_SCORE_HISTORY_CAP: usize = 50;

/// Reference velocity windows (name, seconds), shortest first
pub const DEFAULT_VELOCITY_WINDOWS: &[(&str, i64)] = &[
    ("5m", 5 * 60),
    ("1h", 60 * 60),
    ("24h", 24 * 60 * 60),
];

/// Event retention for scheduled compaction (seconds)
pub const DEFAULT_RETENTION_SECS: i64 = 24 * 60 * 60;

/// Live event count that triggers an eager inline compaction
pub const DEFAULT_MAX_EVENTS: usize = 1_000_000;

/// Events per sealed velocity log segment
pub const DEFAULT_SEGMENT_SIZE: usize = 1024;

/// Interval of the background compactor (seconds)
pub const DEFAULT_COMPACTION_INTERVAL_SECS: u64 = 60;

/// Per-provider geolocation timeout (milliseconds)
pub const DEFAULT_GEO_TIMEOUT_MS: u64 = 300;

/// Geolocation cache TTL (seconds)
pub const DEFAULT_GEO_CACHE_TTL_SECS: u64 = 3600;

/// Geolocation cache capacity (entries)
pub const DEFAULT_GEO_CACHE_CAPACITY: usize = 10_000;

/// Budget for the whole identify pipeline (milliseconds)
pub const DEFAULT_BUILD_DEADLINE_MS: u64 = 1500;

/// Confidence multiplier when an external lookup timed out or was abandoned
pub const DEFAULT_TIMEOUT_CONFIDENCE_FACTOR: f64 = 0.8;

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Helper functions to read from env with fallback
// ============================================

use std::str::FromStr;

use crate::logic::config::ConfigError;

/// Parse an override; a set but unparseable value is a configuration error
pub fn parse_override<T: FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
    }
}

/// Read a float override from the environment
pub fn env_f64(name: &str) -> Result<Option<f64>, ConfigError> {
    parse_override(name, std::env::var(name).ok())
}

/// Read an integer override from the environment
pub fn env_i64(name: &str) -> Result<Option<i64>, ConfigError> {
    parse_override(name, std::env::var(name).ok())
}

/// Read an unsigned override from the environment
pub fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    parse_override(name, std::env::var(name).ok())
}

/// Read a non-empty string from the environment
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override::<f64>("FP_X", None).unwrap(), None);
        assert_eq!(parse_override::<f64>("FP_X", Some(" 0.9 ".into())).unwrap(), Some(0.9));

        match parse_override::<f64>("FP_HIGH_THRESHOLD", Some("0,9".into())) {
            Err(ConfigError::InvalidValue { name, value }) => {
                assert_eq!(name, "FP_HIGH_THRESHOLD");
                assert_eq!(value, "0,9");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
        assert!(parse_override::<u64>("FP_MAX_EVENTS", Some("-1".into())).is_err());
    }
}
