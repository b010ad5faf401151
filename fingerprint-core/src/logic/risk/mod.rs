//! Risk Module - Velocity and detector based risk scoring
//!
//! ## Structure
//! - `types.rs` - External signals, assessment
//! - `rules.rs` - Thresholds and weights (config only)
//! - `behavior.rs` - Per-session interaction ring buffer
//! - `combiner.rs` - Pure combine function

pub mod behavior;
pub mod combiner;
pub mod rules;
pub mod types;

pub use behavior::{Interaction, InteractionCounters, InteractionKind};
pub use combiner::combine;
pub use rules::{DetectorWeights, DriftRule, InteractionRule, RiskRules, ThresholdRule};
pub use types::{BotVerdict, ExternalSignals, RiskAssessment, SignalFlag};

#[cfg(test)]
mod tests;
