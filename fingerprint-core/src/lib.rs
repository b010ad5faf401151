//! Device Fingerprint Core
//!
//! Canonicalization, identity derivation, similarity matching, velocity
//! tracking and risk scoring for device/browser fingerprints.
//!
//! ## Structure
//! - `constants` - Engine defaults and env helpers
//! - `logic` - Engines (see `logic/mod.rs`)
//!
//! ## Usage
//! ```ignore
//! use device_fingerprint_core::{EngineConfig, FingerprintEngine, IdentifyRequest};
//!
//! let engine = FingerprintEngine::new(EngineConfig::load()?)?;
//! let response = engine.identify_default(request).await?;
//! ```

pub mod constants;
pub mod logic;

pub use logic::config::{ConfigError, EngineConfig, StoreBackend};
pub use logic::engine::{
    BuildOutput, EngineError, FingerprintEngine, IdentifyRequest, IdentifyResponse, MatchOutcome,
};
