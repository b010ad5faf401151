//! Canonical Module
//!
//! Turns a sparse, unordered signal bag into a deterministic, ordered
//! feature vector with an explicit null marker.
//!
//! ## Structure
//! - `bag`: `SignalBag`, `SignalValue` (collector output)
//! - `vector`: `CanonicalVector`, canonical serialization
//! - `normalize`: `canonicalize` and per-type normalization rules

pub mod bag;
pub mod normalize;
pub mod vector;


pub use bag::{SignalBag, SignalValue};
pub use normalize::{canonicalize, normalize_text, normalize_value, FieldError};
pub use vector::{CanonicalEntry, CanonicalValue, CanonicalVector};
