//! Signal Schema
//!
//! The versioned, ordered list of signal keys and their entropy weights.
//!
//! ## Structure
//! - `layout`: key order, schema version, CRC32 layout hash, anchor keys
//! - `weights`: stability × uniqueness weight per key

pub mod layout;
pub mod weights;

pub use layout::{
    is_known_signal, layout_hash, validate_layout, LayoutInfo, LayoutMismatchError, ANCHOR_KEYS,
    SCHEMA_VERSION, SIGNAL_COUNT, SIGNAL_LAYOUT,
};
pub use weights::FeatureWeights;
