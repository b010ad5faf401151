//! Matcher Module
//!
//! Weighted similarity between incoming per-feature hashes and stored
//! fingerprint records. Read-only: persisting the verdict is the caller's job.
//!
//! ## Structure
//! - `types`: `Classification`, `MatchResult`, `BestMatch`
//! - `rules`: `MatchThresholds`
//! - `classifier`: `match_record`, `best_match`
//!
//! ## Usage
//! ```ignore
//! use crate::logic::matcher::{best_match, Classification};
//!
//! let best = best_match(&incoming, &candidates, &weights, &thresholds);
//! match best.result.classification {
//!     Classification::KnownDevice => { /* refresh record */ }
//!     Classification::LikelyVariant => { /* refresh + decay changed fields */ }
//!     Classification::NewDevice => { /* create record */ }
//! }
//! ```

pub mod classifier;
pub mod rules;
pub mod types;

pub use classifier::{best_match, classify_score, match_features, match_record};
pub use rules::{MatchThresholds, SCORE_EPSILON};
pub use types::{BestMatch, Classification, MatchResult};
