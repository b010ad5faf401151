//! In-memory Fingerprint Store
//!
//! Map of device id → per-record slot. Each slot has its own mutex so
//! writes to one device serialize while other devices proceed. Anchor and
//! linked-id indexes are updated while the slot is held.
//!
//! Lock order: records map (released before slot) → slot → indexes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::error::StoreResult;
use super::types::{anchor_entries, FingerprintRecord, StoreOptions, UpsertRequest};
use super::FingerprintStore;
use crate::logic::identity::FeatureHashes;

/// `None` = not yet written, or removed by a concurrent delete
type Slot = Arc<Mutex<Option<FingerprintRecord>>>;

/// (signal key, feature hash)
type AnchorKey = (String, String);

pub struct MemoryStore {
    records: RwLock<HashMap<String, Slot>>,
    anchors: RwLock<HashMap<AnchorKey, BTreeSet<String>>>,
    linked: RwLock<HashMap<String, BTreeSet<String>>>,
    options: StoreOptions,
}

impl MemoryStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            anchors: RwLock::new(HashMap::new()),
            linked: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Existing slot, or a fresh empty one
    fn slot(&self, device_id: &str) -> Slot {
        if let Some(slot) = self.records.read().get(device_id) {
            return slot.clone();
        }
        self.records
            .write()
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Slot still registered under `device_id` (not swapped out by a delete)
    fn is_current(&self, device_id: &str, slot: &Slot) -> bool {
        self.records
            .read()
            .get(device_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    fn index(&self, record: &FingerprintRecord) {
        let mut anchors = self.anchors.write();
        for (key, hash) in record.anchor_entries(&self.options.anchor_keys) {
            anchors
                .entry((key.to_string(), hash.to_string()))
                .or_default()
                .insert(record.device_id.clone());
        }
        drop(anchors);

        let mut linked = self.linked.write();
        for linked_id in &record.linked_ids {
            linked
                .entry(linked_id.clone())
                .or_default()
                .insert(record.device_id.clone());
        }
    }

    fn unindex(&self, record: &FingerprintRecord) {
        let mut anchors = self.anchors.write();
        for (key, hash) in record.anchor_entries(&self.options.anchor_keys) {
            let anchor = (key.to_string(), hash.to_string());
            if let Some(ids) = anchors.get_mut(&anchor) {
                ids.remove(&record.device_id);
                if ids.is_empty() {
                    anchors.remove(&anchor);
                }
            }
        }
        drop(anchors);

        let mut linked = self.linked.write();
        for linked_id in &record.linked_ids {
            if let Some(ids) = linked.get_mut(linked_id) {
                ids.remove(&record.device_id);
                if ids.is_empty() {
                    linked.remove(linked_id);
                }
            }
        }
    }

    fn get_many<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> Vec<FingerprintRecord> {
        let slots: Vec<Slot> = {
            let records = self.records.read();
            ids.into_iter().filter_map(|id| records.get(id).cloned()).collect()
        };
        slots.iter().filter_map(|slot| slot.lock().clone()).collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl FingerprintStore for MemoryStore {
    fn lookup_candidates(&self, device_id: &str, features: &FeatureHashes) -> StoreResult<Vec<FingerprintRecord>> {
        let mut ids = BTreeSet::new();
        ids.insert(device_id.to_string());
        {
            let anchors = self.anchors.read();
            for (key, hash) in anchor_entries(features, &self.options.anchor_keys) {
                if let Some(found) = anchors.get(&(key.to_string(), hash.to_string())) {
                    ids.extend(found.iter().cloned());
                }
            }
        }
        Ok(self.get_many(&ids))
    }

    fn get(&self, device_id: &str) -> StoreResult<Option<FingerprintRecord>> {
        let slot = self.records.read().get(device_id).cloned();
        Ok(slot.and_then(|slot| slot.lock().clone()))
    }

    fn upsert(&self, request: UpsertRequest) -> StoreResult<FingerprintRecord> {
        loop {
            let slot = self.slot(&request.device_id);
            let mut guard = slot.lock();

            // A delete may have dropped this slot between lookup and lock
            if !self.is_current(&request.device_id, &slot) {
                continue;
            }

            let existing = guard.take();
            if let Some(old) = &existing {
                self.unindex(old);
            }
            let record = request.apply(existing, &self.options);
            self.index(&record);
            *guard = Some(record.clone());

            log::debug!(
                "Upserted {} ({}, score {:.3})",
                record.device_id,
                request.classification,
                request.score
            );
            return Ok(record);
        }
    }

    fn delete(&self, device_id: &str) -> StoreResult<bool> {
        let slot = self.records.write().remove(device_id);
        let Some(slot) = slot else {
            return Ok(false);
        };

        let removed = slot.lock().take();
        match removed {
            Some(record) => {
                self.unindex(&record);
                log::info!("Purged fingerprint record {}", device_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_by_linked_id(&self, linked_id: &str) -> StoreResult<Vec<FingerprintRecord>> {
        let ids = self.linked.read().get(linked_id).cloned().unwrap_or_default();
        Ok(self.get_many(&ids))
    }

    fn unlink_linked_id(&self, linked_id: &str) -> StoreResult<usize> {
        let ids = self.linked.write().remove(linked_id).unwrap_or_default();
        let mut changed = 0;

        for id in &ids {
            let slot = self.records.read().get(id).cloned();
            if let Some(slot) = slot {
                if let Some(record) = slot.lock().as_mut() {
                    if record.linked_ids.remove(linked_id) {
                        changed += 1;
                    }
                }
            }
        }
        Ok(changed)
    }

    fn len(&self) -> StoreResult<usize> {
        let slots: Vec<Slot> = self.records.read().values().cloned().collect();
        Ok(slots.iter().filter(|slot| slot.lock().is_some()).count())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
