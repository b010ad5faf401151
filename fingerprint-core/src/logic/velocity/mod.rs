//! Velocity Module
//!
//! Short-horizon activity tracking over visitor events.
//!
//! ## Structure
//! - `types`: `IncomingEvent`, `VisitorEvent`, `VelocityConfig`, `VelocityWindowSet`
//! - `segment`: sealed, immutable log segments
//! - `aggregate`: per-window distinct/raw counts
//! - `index`: `VelocityIndex` (record, query, compact)
//! - `compactor`: periodic background compaction
//!
//! ## Guarantees
//! - Nested windows: wider windows never count less than narrower ones
//! - Compaction never changes a query whose windows fit in the retention
//! - Compacted events never reappear
//! - The log never grows past `max_events` between scheduled compactions
//!
//! The index never looks up fingerprint records; events for unknown
//! visitors are fine.

pub mod aggregate;
pub mod compactor;
pub mod index;
pub mod segment;
pub mod types;

#[cfg(test)]
mod tests;

pub use compactor::{spawn_compactor, spawn_default_compactor};
pub use index::VelocityIndex;
pub use types::{
    IncomingEvent, VelocityConfig, VelocityError, VelocityStats, VelocityWindowSet, VisitorEvent, WindowCounts,
    WindowSpec,
};
