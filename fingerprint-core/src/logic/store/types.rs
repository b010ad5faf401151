//! Store Types
//!
//! `FingerprintRecord` holds per-feature hashes only; raw signal values are
//! never persisted.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SCORE_HISTORY_CAP;
use crate::logic::identity::FeatureHashes;
use crate::logic::matcher::Classification;
use crate::logic::schema::{layout_hash, ANCHOR_KEYS, SCHEMA_VERSION};

/// One (timestamp, match score) observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub at: DateTime<Utc>,
    pub score: f64,
}

// ============================================================================
// FINGERPRINT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Primary key
    pub device_id: String,
    pub schema_version: u8,
    pub layout_hash: u32,
    /// Signal key → per-feature hash
    pub features: FeatureHashes,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// External account/session ids seen with this device (weak reference)
    pub linked_ids: BTreeSet<String>,
    /// Oldest first, capped
    pub score_history: VecDeque<ScoreEntry>,
}

impl FingerprintRecord {
    /// Fresh record: first seen = last seen = `now`, empty score history
    pub fn new(device_id: String, features: FeatureHashes, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            schema_version: SCHEMA_VERSION,
            layout_hash: layout_hash(),
            features,
            first_seen_at: now,
            last_seen_at: now,
            linked_ids: BTreeSet::new(),
            score_history: VecDeque::new(),
        }
    }

    /// Apply a repeat visit
    ///
    /// Decay: incoming hashes for keys outside `matched_keys` overwrite the
    /// stored ones; matched keys and keys missing from the visit are kept.
    pub fn apply_visit(&mut self, request: &UpsertRequest, history_cap: usize) {
        if request.now > self.last_seen_at {
            self.last_seen_at = request.now;
        }

        for (key, hash) in &request.features {
            if !request.matched_keys.contains(key) {
                self.features.insert(key.clone(), hash.clone());
            }
        }

        self.push_score(request.now, request.score, history_cap);
        self.schema_version = SCHEMA_VERSION;
        self.layout_hash = layout_hash();
    }

    /// Append to the score history, evicting the oldest entries past `cap`
    pub fn push_score(&mut self, at: DateTime<Utc>, score: f64, cap: usize) {
        self.score_history.push_back(ScoreEntry { at, score });
        while self.score_history.len() > cap {
            self.score_history.pop_front();
        }
    }

    /// (key, hash) pairs of this record used for candidate indexing
    pub fn anchor_entries<'a>(&'a self, anchor_keys: &'a [String]) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        anchor_entries(&self.features, anchor_keys)
    }
}

/// (key, hash) pairs of `features` restricted to `anchor_keys`
pub fn anchor_entries<'a>(
    features: &'a FeatureHashes,
    anchor_keys: &'a [String],
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    anchor_keys.iter().filter_map(move |key| {
        features
            .get(key)
            .map(|hash| (key.as_str(), hash.as_str()))
    })
}

// ============================================================================
// UPSERT REQUEST
// ============================================================================

/// Persist a matcher verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    /// Matched record id, or the derived id for a new device
    pub device_id: String,
    pub classification: Classification,
    /// Incoming per-feature hashes
    pub features: FeatureHashes,
    pub matched_keys: BTreeSet<String>,
    pub score: f64,
    pub linked_id: Option<String>,
    pub now: DateTime<Utc>,
}

impl UpsertRequest {
    pub fn new_device(device_id: String, features: FeatureHashes, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            classification: Classification::NewDevice,
            features,
            matched_keys: BTreeSet::new(),
            score: 0.0,
            linked_id: None,
            now,
        }
    }

    pub fn with_linked_id(mut self, linked_id: Option<String>) -> Self {
        self.linked_id = linked_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Record this request produces when none exists yet
    ///
    /// A new device starts with an empty score history; an update whose
    /// target is gone recreates the record with this visit's score.
    pub fn into_record(&self, history_cap: usize) -> FingerprintRecord {
        let mut record = FingerprintRecord::new(self.device_id.clone(), self.features.clone(), self.now);
        if self.classification.is_match() {
            record.push_score(self.now, self.score, history_cap);
        }
        if let Some(linked_id) = &self.linked_id {
            record.linked_ids.insert(linked_id.clone());
        }
        record
    }

    /// Apply this request to an existing record or create one
    pub fn apply(&self, existing: Option<FingerprintRecord>, options: &StoreOptions) -> FingerprintRecord {
        match existing {
            // Existing id is always a visit, whatever the verdict
            Some(mut record) => {
                record.apply_visit(self, options.score_history_cap);
                if let Some(linked_id) = &self.linked_id {
                    record.linked_ids.insert(linked_id.clone());
                }
                record
            }
            None => self.into_record(options.score_history_cap),
        }
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

/// Settings shared by every store backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Keys whose hashes are indexed for candidate lookup
    pub anchor_keys: Vec<String>,
    pub score_history_cap: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            anchor_keys: ANCHOR_KEYS.iter().map(|k| k.to_string()).collect(),
            score_history_cap: DEFAULT_SCORE_HISTORY_CAP,
        }
    }
}
