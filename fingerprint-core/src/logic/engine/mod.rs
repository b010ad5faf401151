//! Fingerprint Engine
//!
//! Wires the pure stages (canonicalize, derive, score, match, combine) to
//! the shared resources (fingerprint store, velocity index, geo resolver).
//!
//! ## Pipeline (`identify`)
//! 1. Merge server-observed network signals into the bag
//! 2. Geolocate the client IP, abandoned at the caller's deadline
//! 3. Canonicalize, derive device id and per-feature hashes, score confidence
//! 4. Classify against stored candidates and persist the verdict
//! 5. Record a visitor event, query velocity, combine risk
//!
//! Only store failures fail a request. Everything external degrades to
//! "unknown"; a timed-out lookup also scales confidence down.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::logic::canonical::{canonicalize, CanonicalVector, SignalBag};
use crate::logic::confidence;
use crate::logic::config::{ConfigError, EngineConfig, StoreBackend};
use crate::logic::geo::{GeoLookup, GeoResolver};
use crate::logic::identity::{FeatureHashes, IdentityDeriver};
use crate::logic::matcher::{best_match, Classification, MatchThresholds};
use crate::logic::network::NetworkSignals;
use crate::logic::risk::{combine, ExternalSignals, InteractionCounters, RiskAssessment};
use crate::logic::schema::{FeatureWeights, SIGNAL_LAYOUT};
use crate::logic::store::{
    FingerprintRecord, FingerprintStore, MemoryStore, SqliteStore, StoreError, StoreOptions, UpsertRequest,
};
use crate::logic::velocity::{
    spawn_default_compactor, IncomingEvent, VelocityError, VelocityIndex, VelocityWindowSet, VisitorEvent,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Velocity(#[from] VelocityError),
}

// ============================================================================
// TYPES
// ============================================================================

/// Output of the pure build stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildOutput {
    pub vector: CanonicalVector,
    pub device_id: String,
    pub per_feature_hash: FeatureHashes,
    pub confidence: f64,
}

/// Matcher verdict resolved to the device id that will be persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub classification: Classification,
    /// Matched record id, or the derived id for a new device
    pub device_id: String,
    pub score: f64,
    pub matched_keys: std::collections::BTreeSet<String>,
    pub candidates: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentifyRequest {
    /// Client collector output
    pub signals: SignalBag,
    pub network: NetworkSignals,
    pub ip: Option<String>,
    pub linked_id: Option<String>,
    pub url: Option<String>,
    pub event_type: Option<String>,
    /// Flags from detectors outside the engine
    pub external: ExternalSignals,
    pub behavior: Option<InteractionCounters>,
    /// Defaults to the time the request is handled
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifyResponse {
    pub request_id: Uuid,
    pub visitor_id: String,
    pub classification: Classification,
    pub match_score: f64,
    pub confidence: f64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub geo: GeoLookup,
    pub velocity: VelocityWindowSet,
    pub risk: RiskAssessment,
    pub engine_version: &'static str,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct FingerprintEngine {
    config: EngineConfig,
    weights: FeatureWeights,
    deriver: IdentityDeriver,
    store: Arc<dyn FingerprintStore>,
    velocity: Arc<VelocityIndex>,
    geo: Arc<GeoResolver>,
}

impl FingerprintEngine {
    /// Validate the config and build every component it describes
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let options = Self::store_options(&config);
        let store: Arc<dyn FingerprintStore> = match &config.store {
            StoreBackend::Memory => Arc::new(MemoryStore::new(options)),
            StoreBackend::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(SqliteStore::default_path);
                Arc::new(SqliteStore::open(&path, options)?)
            }
        };
        let geo = GeoResolver::from_config(&config.geo).map_err(|e| ConfigError::InvalidGeo(e.to_string()))?;

        Self::with_parts(config, store, Arc::new(geo))
    }

    /// Build around an existing store and resolver
    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn FingerprintStore>,
        geo: Arc<GeoResolver>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let deriver = IdentityDeriver::new(config.device_secret()?);
        let weights = config.feature_weights();
        let velocity = Arc::new(VelocityIndex::new(config.velocity.clone()));

        log::info!(
            "Fingerprint engine ready: {} signals, {} store, {} geo providers",
            SIGNAL_LAYOUT.len(),
            store.backend(),
            geo.provider_names().len()
        );

        Ok(Self {
            config,
            weights,
            deriver,
            store,
            velocity,
            geo,
        })
    }

    pub fn store_options(config: &EngineConfig) -> StoreOptions {
        StoreOptions {
            anchor_keys: config.anchor_keys.clone(),
            score_history_cap: config.score_history_cap,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &MatchThresholds {
        &self.config.thresholds
    }

    pub fn velocity_index(&self) -> &Arc<VelocityIndex> {
        &self.velocity
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Default SQLite location, for logging
    pub fn default_store_path() -> PathBuf {
        SqliteStore::default_path()
    }

    // ========================================================================
    // STAGES
    // ========================================================================

    /// Canonical vector, device id, per-feature hashes and confidence
    pub fn build_canonical_and_identity(&self, bag: &SignalBag) -> BuildOutput {
        let vector = canonicalize(bag, SIGNAL_LAYOUT);
        let identity = self.deriver.derive(&vector);
        let confidence = confidence::score_all(&vector, &self.weights);

        BuildOutput {
            vector,
            device_id: identity.device_id,
            per_feature_hash: identity.per_feature_hash,
            confidence,
        }
    }

    /// Match against stored candidates; a store failure is an error, never a new device
    pub fn classify(&self, per_feature_hash: &FeatureHashes, derived_id: &str) -> Result<MatchOutcome, EngineError> {
        classify_with(
            self.store.as_ref(),
            &self.weights,
            &self.config.thresholds,
            per_feature_hash,
            derived_id,
        )
    }

    /// Create or refresh the record the verdict points at
    pub fn persist(
        &self,
        outcome: &MatchOutcome,
        per_feature_hash: &FeatureHashes,
        linked_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<FingerprintRecord, EngineError> {
        persist_with(self.store.as_ref(), outcome, per_feature_hash, linked_id, now)
    }

    /// `classify` then `persist`; on a blocking backend both run on the
    /// blocking pool
    async fn classify_and_persist(
        &self,
        build: &BuildOutput,
        linked_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(MatchOutcome, FingerprintRecord), EngineError> {
        if !self.store.is_blocking() {
            let outcome = self.classify(&build.per_feature_hash, &build.device_id)?;
            let record = self.persist(&outcome, &build.per_feature_hash, linked_id, now)?;
            return Ok((outcome, record));
        }

        let store = Arc::clone(&self.store);
        let weights = self.weights.clone();
        let thresholds = self.config.thresholds;
        let hashes = build.per_feature_hash.clone();
        let derived_id = build.device_id.clone();

        tokio::task::spawn_blocking(move || -> Result<(MatchOutcome, FingerprintRecord), EngineError> {
            let outcome = classify_with(store.as_ref(), &weights, &thresholds, &hashes, &derived_id)?;
            let record = persist_with(store.as_ref(), &outcome, &hashes, linked_id, now)?;
            Ok((outcome, record))
        })
        .await
        .map_err(|e| EngineError::Store(StoreError::Unavailable(format!("store task failed: {}", e))))?
    }

    pub fn record_event(&self, event: IncomingEvent) -> Result<(), EngineError> {
        Ok(self.velocity.record(event)?)
    }

    pub fn query_velocity(&self, visitor_id: &str, now: DateTime<Utc>) -> VelocityWindowSet {
        self.velocity.query_default(visitor_id, now)
    }

    pub fn compute_risk(
        &self,
        velocity: &VelocityWindowSet,
        match_score: f64,
        external: &ExternalSignals,
        behavior: Option<&InteractionCounters>,
    ) -> RiskAssessment {
        combine(velocity, match_score, external, behavior, &self.config.risk)
    }

    // ========================================================================
    // PIPELINE
    // ========================================================================

    /// Whole pipeline; geolocation still pending at `deadline` is abandoned
    pub async fn identify(&self, request: IdentifyRequest, deadline: Instant) -> Result<IdentifyResponse, EngineError> {
        let IdentifyRequest {
            mut signals,
            network,
            ip,
            linked_id,
            url,
            event_type,
            external,
            behavior,
            timestamp,
        } = request;
        let now = timestamp.unwrap_or_else(Utc::now);

        let network_flags = network.apply(&mut signals);
        let geo = self.locate(ip.as_deref(), deadline).await;

        let mut build = self.build_canonical_and_identity(&signals);
        if geo.timed_out() {
            build.confidence *= self.config.timeout_confidence_factor;
        }
        let (outcome, record) = self.classify_and_persist(&build, linked_id.clone(), now).await?;

        let visitor_id = record.device_id.clone();
        self.velocity.append(VisitorEvent {
            visitor_id: visitor_id.clone(),
            ip: ip.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            linked_id: linked_id.filter(|s| !s.trim().is_empty()),
            country: geo.country().map(str::to_string),
            timestamp: now,
            url,
            event_type,
        });
        let velocity = self.query_velocity(&visitor_id, now);

        let mut external = external.merge(&network_flags);
        external.datacenter_ip |= geo.is_datacenter();
        let risk = self.compute_risk(&velocity, outcome.score, &external, behavior.as_ref());

        if !risk.signals.is_empty() {
            log::info!(
                "Visitor {} risk {:.2}: {}",
                visitor_id,
                risk.risk_score,
                risk.signals.join(", ")
            );
        }

        Ok(IdentifyResponse {
            request_id: Uuid::new_v4(),
            visitor_id,
            classification: outcome.classification,
            match_score: outcome.score,
            confidence: build.confidence,
            first_seen_at: record.first_seen_at,
            last_seen_at: record.last_seen_at,
            geo,
            velocity,
            risk,
            engine_version: crate::constants::ENGINE_VERSION,
        })
    }

    /// Pipeline with the configured build deadline
    pub async fn identify_default(&self, request: IdentifyRequest) -> Result<IdentifyResponse, EngineError> {
        let deadline = Instant::now() + std::time::Duration::from_millis(self.config.build_deadline_ms);
        self.identify(request, deadline).await
    }

    async fn locate(&self, ip: Option<&str>, deadline: Instant) -> GeoLookup {
        let Some(ip) = ip else {
            return GeoLookup::Unknown;
        };
        match tokio::time::timeout_at(deadline, self.geo.resolve_str(ip)).await {
            Ok(lookup) => lookup,
            Err(_) => {
                log::debug!("Geolocation for {} abandoned at build deadline", ip);
                GeoLookup::TimedOut
            }
        }
    }

    // ========================================================================
    // RECORDS & MAINTENANCE
    // ========================================================================

    pub fn device(&self, device_id: &str) -> Result<Option<FingerprintRecord>, EngineError> {
        Ok(self.store.get(device_id)?)
    }

    /// Hard delete; `false` when nothing was stored
    pub fn purge(&self, device_id: &str) -> Result<bool, EngineError> {
        let removed = self.store.delete(device_id)?;
        if removed {
            log::info!("Purged device {}", device_id);
        }
        Ok(removed)
    }

    /// Strip a linked id from every record; records stay
    pub fn unlink(&self, linked_id: &str) -> Result<usize, EngineError> {
        let count = self.store.unlink_linked_id(linked_id)?;
        log::info!("Unlinked '{}' from {} devices", linked_id, count);
        Ok(count)
    }

    pub fn devices_for_linked_id(&self, linked_id: &str) -> Result<Vec<FingerprintRecord>, EngineError> {
        Ok(self.store.find_by_linked_id(linked_id)?)
    }

    /// Scheduled compaction with the configured retention
    pub fn compact(&self, now: DateTime<Utc>) -> usize {
        self.velocity.compact_default(now)
    }

    /// Periodic compaction on the current tokio runtime
    pub fn spawn_compactor(&self) -> JoinHandle<()> {
        spawn_default_compactor(self.velocity.clone())
    }

    pub fn device_count(&self) -> Result<usize, EngineError> {
        Ok(self.store.len()?)
    }
}

// ============================================================================
// STORE STEPS
// ============================================================================

fn classify_with(
    store: &dyn FingerprintStore,
    weights: &FeatureWeights,
    thresholds: &MatchThresholds,
    per_feature_hash: &FeatureHashes,
    derived_id: &str,
) -> Result<MatchOutcome, EngineError> {
    let candidates = store.lookup_candidates(derived_id, per_feature_hash)?;
    let best = best_match(per_feature_hash, &candidates, weights, thresholds);

    log::debug!(
        "Classified {} against {} candidates: {} ({:.3})",
        derived_id,
        best.candidates,
        best.result.classification,
        best.result.score
    );

    Ok(MatchOutcome {
        classification: best.result.classification,
        device_id: best.device_id.unwrap_or_else(|| derived_id.to_string()),
        score: best.result.score,
        matched_keys: best.result.matched_keys,
        candidates: best.candidates,
    })
}

fn persist_with(
    store: &dyn FingerprintStore,
    outcome: &MatchOutcome,
    per_feature_hash: &FeatureHashes,
    linked_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<FingerprintRecord, EngineError> {
    let request = UpsertRequest {
        device_id: outcome.device_id.clone(),
        classification: outcome.classification,
        features: per_feature_hash.clone(),
        matched_keys: outcome.matched_keys.clone(),
        score: outcome.score,
        linked_id: None,
        now,
    }
    .with_linked_id(linked_id);

    Ok(store.upsert(request)?)
}
