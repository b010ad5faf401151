//! Matcher Types
//!
//! Data only: classification verdict and match results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Three-way verdict of the similarity matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// No stored record is close enough
    NewDevice,
    /// Same device with some changed signals
    LikelyVariant,
    /// Same device
    KnownDevice,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::NewDevice => "new_device",
            Classification::LikelyVariant => "likely_device_variant",
            Classification::KnownDevice => "known_device",
        }
    }

    /// True when the incoming vector belongs to an existing record
    pub fn is_match(&self) -> bool {
        !matches!(self, Classification::NewDevice)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MATCH RESULT
// ============================================================================

/// Result of comparing incoming hashes against one stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub classification: Classification,
    /// Weighted similarity in [0, 1]
    pub score: f64,
    /// Keys present on both sides with equal hashes
    pub matched_keys: BTreeSet<String>,
}

impl MatchResult {
    pub fn new_device() -> Self {
        Self {
            classification: Classification::NewDevice,
            score: 0.0,
            matched_keys: BTreeSet::new(),
        }
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self::new_device()
    }
}

/// Winner of `best_match` over a candidate set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMatch {
    /// Device id of the winning record, `None` when there were no candidates
    pub device_id: Option<String>,
    pub result: MatchResult,
    /// Number of candidates evaluated
    pub candidates: usize,
}

impl BestMatch {
    pub fn none() -> Self {
        Self {
            device_id: None,
            result: MatchResult::new_device(),
            candidates: 0,
        }
    }
}
