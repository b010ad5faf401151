//! SQLite Fingerprint Store
//!
//! Durable backend with the same contract as `MemoryStore`. One
//! mutex-guarded connection; every upsert runs in a transaction, so
//! per-device operations are linearizable.
//!
//! Tables:
//! - `fingerprints`: one row per device (JSON columns for maps/sets)
//! - `feature_index`: anchor (key, hash) → device id
//! - `linked_ids`: linked id → device id

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::error::{StoreError, StoreResult};
use super::types::{anchor_entries, FingerprintRecord, StoreOptions, UpsertRequest};
use super::FingerprintStore;
use crate::logic::identity::FeatureHashes;

const DB_FILE_NAME: &str = "fingerprints.db";

const SELECT_COLUMNS: &str = "device_id, schema_version, layout_hash, features, first_seen_at, \
     last_seen_at, linked_ids, score_history";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    options: StoreOptions,
}

impl SqliteStore {
    pub fn open(path: &Path, options: StoreOptions) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            options,
        };
        store.init_schema()?;
        log::info!("Fingerprint store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory(options: StoreOptions) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            options,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// `<local data dir>/device-fingerprint/fingerprints.db`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("device-fingerprint")
            .join(DB_FILE_NAME)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS fingerprints (
                device_id TEXT PRIMARY KEY,
                schema_version INTEGER NOT NULL,
                layout_hash INTEGER NOT NULL,
                features TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                linked_ids TEXT NOT NULL,
                score_history TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feature_index (
                feature_key TEXT NOT NULL,
                feature_hash TEXT NOT NULL,
                device_id TEXT NOT NULL,
                PRIMARY KEY (feature_key, feature_hash, device_id)
            );

            CREATE TABLE IF NOT EXISTS linked_ids (
                linked_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                PRIMARY KEY (linked_id, device_id)
            );

            CREATE INDEX IF NOT EXISTS idx_feature_index_device
                ON feature_index(device_id);

            CREATE INDEX IF NOT EXISTS idx_linked_ids_device
                ON linked_ids(device_id);
        "#,
        )?;
        Ok(())
    }

    fn write_record(&self, tx: &Transaction<'_>, record: &FingerprintRecord) -> StoreResult<()> {
        let encode = |what: &str, result: serde_json::Result<String>| {
            result.map_err(|e| StoreError::Corrupt {
                device_id: record.device_id.clone(),
                reason: format!("encode {}: {}", what, e),
            })
        };
        let features = encode("features", serde_json::to_string(&record.features))?;
        let linked_ids = encode("linked_ids", serde_json::to_string(&record.linked_ids))?;
        let history = encode("score_history", serde_json::to_string(&record.score_history))?;

        tx.execute(
            "INSERT OR REPLACE INTO fingerprints
                (device_id, schema_version, layout_hash, features, first_seen_at, last_seen_at, linked_ids, score_history)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.device_id,
                record.schema_version,
                record.layout_hash,
                features,
                record.first_seen_at.to_rfc3339(),
                record.last_seen_at.to_rfc3339(),
                linked_ids,
                history,
            ],
        )?;

        tx.execute("DELETE FROM feature_index WHERE device_id = ?1", params![record.device_id])?;
        for (key, hash) in record.anchor_entries(&self.options.anchor_keys) {
            tx.execute(
                "INSERT OR IGNORE INTO feature_index (feature_key, feature_hash, device_id) VALUES (?1, ?2, ?3)",
                params![key, hash, record.device_id],
            )?;
        }

        tx.execute("DELETE FROM linked_ids WHERE device_id = ?1", params![record.device_id])?;
        for linked_id in &record.linked_ids {
            tx.execute(
                "INSERT OR IGNORE INTO linked_ids (linked_id, device_id) VALUES (?1, ?2)",
                params![linked_id, record.device_id],
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// ROW DECODING
// ============================================================================

/// Raw column values of one `fingerprints` row
struct RawRow {
    device_id: String,
    schema_version: u8,
    layout_hash: u32,
    features: String,
    first_seen_at: String,
    last_seen_at: String,
    linked_ids: String,
    score_history: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            schema_version: row.get(1)?,
            layout_hash: row.get(2)?,
            features: row.get(3)?,
            first_seen_at: row.get(4)?,
            last_seen_at: row.get(5)?,
            linked_ids: row.get(6)?,
            score_history: row.get(7)?,
        })
    }

    fn decode(self) -> StoreResult<FingerprintRecord> {
        let corrupt = |reason: String| StoreError::Corrupt {
            device_id: self.device_id.clone(),
            reason,
        };
        let timestamp = |what: &str, value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| corrupt(format!("{}: {}", what, e)))
        };

        Ok(FingerprintRecord {
            features: serde_json::from_str(&self.features).map_err(|e| corrupt(format!("features: {}", e)))?,
            first_seen_at: timestamp("first_seen_at", &self.first_seen_at)?,
            last_seen_at: timestamp("last_seen_at", &self.last_seen_at)?,
            linked_ids: serde_json::from_str(&self.linked_ids).map_err(|e| corrupt(format!("linked_ids: {}", e)))?,
            score_history: serde_json::from_str(&self.score_history)
                .map_err(|e| corrupt(format!("score_history: {}", e)))?,
            schema_version: self.schema_version,
            layout_hash: self.layout_hash,
            device_id: self.device_id,
        })
    }
}

fn load_record(conn: &Connection, device_id: &str) -> StoreResult<Option<FingerprintRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM fingerprints WHERE device_id = ?1", SELECT_COLUMNS),
            params![device_id],
            RawRow::from_row,
        )
        .optional()?;
    row.map(RawRow::decode).transpose()
}

fn load_many(conn: &Connection, ids: &BTreeSet<String>) -> StoreResult<Vec<FingerprintRecord>> {
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(record) = load_record(conn, id)? {
            records.push(record);
        }
    }
    Ok(records)
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl FingerprintStore for SqliteStore {
    fn lookup_candidates(&self, device_id: &str, features: &FeatureHashes) -> StoreResult<Vec<FingerprintRecord>> {
        let conn = self.conn.lock();
        let mut ids = BTreeSet::new();
        ids.insert(device_id.to_string());

        let mut stmt = conn.prepare_cached(
            "SELECT device_id FROM feature_index WHERE feature_key = ?1 AND feature_hash = ?2",
        )?;
        for (key, hash) in anchor_entries(features, &self.options.anchor_keys) {
            let rows = stmt.query_map(params![key, hash], |row| row.get::<_, String>(0))?;
            for id in rows {
                ids.insert(id?);
            }
        }
        drop(stmt);

        load_many(&conn, &ids)
    }

    fn get(&self, device_id: &str) -> StoreResult<Option<FingerprintRecord>> {
        let conn = self.conn.lock();
        load_record(&conn, device_id)
    }

    fn upsert(&self, request: UpsertRequest) -> StoreResult<FingerprintRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing = load_record(&tx, &request.device_id)?;
        let record = request.apply(existing, &self.options);
        self.write_record(&tx, &record)?;
        tx.commit()?;

        log::debug!(
            "Upserted {} ({}, score {:.3})",
            record.device_id,
            request.classification,
            request.score
        );
        Ok(record)
    }

    fn delete(&self, device_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let count = tx.execute("DELETE FROM fingerprints WHERE device_id = ?1", params![device_id])?;
        tx.execute("DELETE FROM feature_index WHERE device_id = ?1", params![device_id])?;
        tx.execute("DELETE FROM linked_ids WHERE device_id = ?1", params![device_id])?;
        tx.commit()?;

        if count > 0 {
            log::info!("Purged fingerprint record {}", device_id);
        }
        Ok(count > 0)
    }

    fn find_by_linked_id(&self, linked_id: &str) -> StoreResult<Vec<FingerprintRecord>> {
        let conn = self.conn.lock();
        let ids = {
            let mut stmt = conn.prepare_cached("SELECT device_id FROM linked_ids WHERE linked_id = ?1")?;
            let rows = stmt.query_map(params![linked_id], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<BTreeSet<String>>>()?
        };
        load_many(&conn, &ids)
    }

    fn unlink_linked_id(&self, linked_id: &str) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let ids = {
            let mut stmt = tx.prepare("SELECT device_id FROM linked_ids WHERE linked_id = ?1")?;
            let rows = stmt.query_map(params![linked_id], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<BTreeSet<String>>>()?
        };

        let mut changed = 0;
        for id in &ids {
            if let Some(mut record) = load_record(&tx, id)? {
                if record.linked_ids.remove(linked_id) {
                    self.write_record(&tx, &record)?;
                    changed += 1;
                }
            }
        }
        tx.execute("DELETE FROM linked_ids WHERE linked_id = ?1", params![linked_id])?;
        tx.commit()?;
        Ok(changed)
    }

    fn len(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn is_blocking(&self) -> bool {
        true
    }
}
