//! Match Thresholds
//!
//! Configuration only, no matching logic.
//! Defaults are product policy and should be tuned against labeled outcomes.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD};
use crate::logic::config::ConfigError;

/// Tolerance for weight accumulation rounding at a threshold boundary
pub const SCORE_EPSILON: f64 = 1e-9;

/// Classification thresholds (both inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    /// `score >= high` → KnownDevice
    pub high: f64,
    /// `low <= score < high` → LikelyVariant
    pub low: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_THRESHOLD,
            low: DEFAULT_LOW_THRESHOLD,
        }
    }
}

impl MatchThresholds {
    pub fn new(high: f64, low: f64) -> Self {
        Self { high, low }
    }

    /// Fewer merges: only near-identical vectors are the same device
    pub fn strict() -> Self {
        Self { high: 0.95, low: 0.75 }
    }

    /// More merges: tolerant of browser updates and resolution changes
    pub fn lenient() -> Self {
        Self { high: 0.75, low: 0.5 }
    }

    /// `0 <= low <= high <= 1`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(self.high) || !in_range(self.low) || self.low > self.high {
            return Err(ConfigError::InvalidThresholds {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}
