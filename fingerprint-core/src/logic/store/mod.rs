//! Fingerprint Store Module
//!
//! Persistence of fingerprint records keyed by device id.
//!
//! ## Structure
//! - `types`: `FingerprintRecord`, `UpsertRequest`, `StoreOptions`
//! - `error`: `StoreError`
//! - `memory`: in-memory reference store
//! - `sqlite`: durable SQLite store
//!
//! ## Contract
//! - Candidate lookup goes through an anchor-hash index, never a full scan
//! - Per-device operations are linearizable; different devices proceed concurrently
//! - Delete is a hard, idempotent removal
//! - Linked ids are weak references: unlinking never deletes a record

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod types;


pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{anchor_entries, FingerprintRecord, ScoreEntry, StoreOptions, UpsertRequest};

use crate::logic::identity::FeatureHashes;

/// Storage backend for fingerprint records
pub trait FingerprintStore: Send + Sync {
    /// Records sharing an anchor hash with `features`, plus `device_id` itself
    fn lookup_candidates(&self, device_id: &str, features: &FeatureHashes) -> StoreResult<Vec<FingerprintRecord>>;

    fn get(&self, device_id: &str) -> StoreResult<Option<FingerprintRecord>>;

    /// Apply a matcher verdict; returns the stored record
    fn upsert(&self, request: UpsertRequest) -> StoreResult<FingerprintRecord>;

    /// Hard delete; `Ok(false)` when the id did not exist
    fn delete(&self, device_id: &str) -> StoreResult<bool>;

    fn find_by_linked_id(&self, linked_id: &str) -> StoreResult<Vec<FingerprintRecord>>;

    /// Remove `linked_id` from every record; returns how many records changed
    fn unlink_linked_id(&self, linked_id: &str) -> StoreResult<usize>;

    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Calls block on I/O; async callers move them off the runtime threads
    fn is_blocking(&self) -> bool {
        false
    }
}
