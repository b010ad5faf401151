//! Device Identity Module
//!
//! Derives a persistent device identifier from a canonical vector.
//!
//! Features:
//! - Keyed HMAC-SHA256 device id (secret held server-side)
//! - Per-feature SHA-256 content hashes for partial matching
//! - Raw signal values never leave this module; only hashes are persisted

pub mod deriver;

pub use deriver::{
    derive_identity, feature_hash, DerivedIdentity, DeviceSecret, FeatureHashes, IdentityDeriver,
};
