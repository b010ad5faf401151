//! Logic Module - Fingerprint Engines
//!
//! ## Structure
//! - `schema/` - Signal layout, schema version, entropy weights
//! - `canonical/` - SignalBag → CanonicalVector
//! - `identity/` - HMAC device id, per-feature hashes
//! - `confidence.rs` - Weighted signal coverage
//! - `matcher/` - Weighted similarity, three-way classification
//! - `store/` - Fingerprint records (memory, SQLite)
//! - `velocity/` - Multi-window visitor activity index
//! - `risk/` - Risk rules and combiner
//! - `network/` - Header order and TLS ClientHello signals
//! - `geo/` - IP geolocation provider chain
//! - `config.rs` - EngineConfig (file + env)
//! - `engine/` - FingerprintEngine, the public pipeline

// Pure stages
pub mod schema;
pub mod canonical;
pub mod identity;
pub mod confidence;
pub mod matcher;
pub mod risk;
pub mod network;

// Shared state
pub mod store;
pub mod velocity;
pub mod geo;

pub mod config;
pub mod engine;
