//! Engine Configuration
//!
//! Loaded once at startup: defaults from `constants.rs`, then an optional
//! JSON file (`FINGERPRINT_CONFIG`), then `FP_*` environment overrides.
//! Everything is validated before the engine is built; a bad value fails
//! startup, never a request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    env_f64, env_i64, env_string, env_u64, DEFAULT_BUILD_DEADLINE_MS, DEFAULT_SCORE_HISTORY_CAP,
    DEFAULT_TIMEOUT_CONFIDENCE_FACTOR,
};
use crate::logic::geo::GeoConfig;
use crate::logic::identity::DeviceSecret;
use crate::logic::matcher::MatchThresholds;
use crate::logic::risk::RiskRules;
use crate::logic::schema::{is_known_signal, FeatureWeights, ANCHOR_KEYS};
use crate::logic::velocity::VelocityConfig;

/// Path of the optional JSON config file
pub const CONFIG_PATH_ENV: &str = "FINGERPRINT_CONFIG";

/// Invalid configuration, reported at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("weight for '{key}' must be within [0, 1], got {weight}")]
    InvalidWeight { key: String, weight: f64 },

    #[error("device secret is missing or empty (set FP_SECRET)")]
    MissingSecret,

    #[error("thresholds must satisfy 0 <= low <= high <= 1 (low={low}, high={high})")]
    InvalidThresholds { low: f64, high: f64 },

    #[error("invalid velocity configuration: {0}")]
    InvalidVelocity(String),

    #[error("invalid risk rule '{rule}': {reason}")]
    InvalidRiskRule { rule: String, reason: String },

    #[error("invalid geolocation configuration: {0}")]
    InvalidGeo(String),

    #[error("unknown anchor key '{0}'")]
    UnknownAnchorKey(String),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// STORE BACKEND
// ============================================================================

/// Which fingerprint store the engine is built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    /// SQLite file; `None` = default path under the local data dir
    Sqlite { path: Option<PathBuf> },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Memory
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HMAC key for device ids; normally supplied via `FP_SECRET`
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub thresholds: MatchThresholds,
    /// Per-key overrides on top of the default weight table
    pub weight_overrides: BTreeMap<String, f64>,
    /// Keys whose hashes index candidate lookup
    pub anchor_keys: Vec<String>,
    pub score_history_cap: usize,
    pub velocity: VelocityConfig,
    pub risk: RiskRules,
    pub geo: GeoConfig,
    pub store: StoreBackend,
    /// Deadline of the external enrichment step of `identify`
    pub build_deadline_ms: u64,
    /// Multiplies confidence when an external lookup timed out, in [0, 1]
    pub timeout_confidence_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            secret: None,
            thresholds: MatchThresholds::default(),
            weight_overrides: BTreeMap::new(),
            anchor_keys: ANCHOR_KEYS.iter().map(|k| k.to_string()).collect(),
            score_history_cap: DEFAULT_SCORE_HISTORY_CAP,
            velocity: VelocityConfig::default(),
            risk: RiskRules::default(),
            geo: GeoConfig::default(),
            store: StoreBackend::default(),
            build_deadline_ms: DEFAULT_BUILD_DEADLINE_MS,
            timeout_confidence_factor: DEFAULT_TIMEOUT_CONFIDENCE_FACTOR,
        }
    }
}

impl EngineConfig {
    /// Defaults + optional file + env, validated
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env_string(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;

        log::info!(
            "Engine config loaded: thresholds {:.2}/{:.2}, {} windows, store {:?}",
            config.thresholds.low,
            config.thresholds.high,
            config.velocity.windows.len(),
            config.store
        );
        Ok(config)
    }

    /// Parse a JSON config file (missing fields take defaults)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `FP_*` overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(secret) = env_string("FP_SECRET") {
            self.secret = Some(secret);
        }
        if let Some(high) = env_f64("FP_HIGH_THRESHOLD")? {
            self.thresholds.high = high;
        }
        if let Some(low) = env_f64("FP_LOW_THRESHOLD")? {
            self.thresholds.low = low;
        }
        if let Some(retention) = env_i64("FP_RETENTION_SECS")? {
            self.velocity.retention_secs = retention;
        }
        if let Some(max_events) = env_u64("FP_MAX_EVENTS")? {
            self.velocity.max_events = to_usize("FP_MAX_EVENTS", max_events)?;
        }
        if let Some(interval) = env_u64("FP_COMPACTION_INTERVAL_SECS")? {
            self.velocity.compaction_interval_secs = interval;
        }
        if let Some(cap) = env_u64("FP_SCORE_HISTORY_CAP")? {
            self.score_history_cap = to_usize("FP_SCORE_HISTORY_CAP", cap)?;
        }
        if let Some(timeout) = env_u64("FP_GEO_TIMEOUT_MS")? {
            self.geo.timeout_ms = timeout;
        }
        if let Some(deadline) = env_u64("FP_BUILD_DEADLINE_MS")? {
            self.build_deadline_ms = deadline;
        }
        if let Some(factor) = env_f64("FP_TIMEOUT_CONFIDENCE_FACTOR")? {
            self.timeout_confidence_factor = factor;
        }
        if let Some(path) = env_string("FP_STORE_PATH") {
            self.store = StoreBackend::Sqlite {
                path: Some(PathBuf::from(path)),
            };
        }
        Ok(())
    }

    /// Fail fast on anything the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.feature_weights().validate()?;
        self.velocity.validate()?;
        self.risk.validate()?;
        self.geo.validate()?;

        for key in &self.anchor_keys {
            if !is_known_signal(key) {
                return Err(ConfigError::UnknownAnchorKey(key.clone()));
            }
        }
        if self.score_history_cap == 0 {
            return Err(ConfigError::InvalidValue {
                name: "score_history_cap".to_string(),
                value: "0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.timeout_confidence_factor) {
            return Err(ConfigError::InvalidValue {
                name: "timeout_confidence_factor".to_string(),
                value: self.timeout_confidence_factor.to_string(),
            });
        }
        if self.build_deadline_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "build_deadline_ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Default weight table with overrides applied
    pub fn feature_weights(&self) -> FeatureWeights {
        FeatureWeights::defaults().with_overrides(&self.weight_overrides)
    }

    /// HMAC key; missing secret is a configuration error
    pub fn device_secret(&self) -> Result<DeviceSecret, ConfigError> {
        match &self.secret {
            Some(secret) => DeviceSecret::new(secret.as_bytes().to_vec()),
            None => Err(ConfigError::MissingSecret),
        }
    }
}

fn to_usize(name: &str, value: u64) -> Result<usize, ConfigError> {
    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.high, 0.85);
        assert_eq!(config.thresholds.low, 0.6);
        assert_eq!(config.anchor_keys.len(), ANCHOR_KEYS.len());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.low = 0.9;
        config.thresholds.high = 0.8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = EngineConfig::default();
        config.weight_overrides.insert("canvas_hash".to_string(), -0.5);
        match config.validate() {
            Err(ConfigError::InvalidWeight { key, .. }) => assert_eq!(key, "canvas_hash"),
            other => panic!("expected InvalidWeight, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_confidence_factor_bounds() {
        let mut config = EngineConfig::default();
        config.timeout_confidence_factor = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        config.timeout_confidence_factor = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_anchor_key_rejected() {
        let mut config = EngineConfig::default();
        config.anchor_keys.push("not_a_signal".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownAnchorKey(_))
        ));
    }

    #[test]
    fn test_missing_secret() {
        let config = EngineConfig::default();
        assert!(matches!(config.device_secret(), Err(ConfigError::MissingSecret)));

        let config = EngineConfig {
            secret: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert!(config.device_secret().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "thresholds": { "high": 0.9, "low": 0.5 }, "store": { "kind": "sqlite", "path": null } }"#,
        )
        .unwrap();

        assert_eq!(config.thresholds.high, 0.9);
        assert_eq!(config.thresholds.low, 0.5);
        assert_eq!(config.score_history_cap, DEFAULT_SCORE_HISTORY_CAP);
        assert_eq!(config.store, StoreBackend::Sqlite { path: None });
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "score_history_cap": 7, "weight_overrides": {{ "fonts": 0.2 }} }}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.score_history_cap, 7);
        assert_eq!(config.feature_weights().get("fonts"), 0.2);
        assert_eq!(config.feature_weights().get("canvas_hash"), 0.9);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = EngineConfig::from_file("/nonexistent/fingerprint.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    /// The only test touching `FP_*` variables
    #[test]
    fn test_env_overrides() {
        std::env::set_var("FP_SECRET", "env-secret");
        std::env::set_var("FP_HIGH_THRESHOLD", "0,9");
        let mut config = EngineConfig::default();
        match config.apply_env() {
            Err(ConfigError::InvalidValue { name, value }) => {
                assert_eq!(name, "FP_HIGH_THRESHOLD");
                assert_eq!(value, "0,9");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
        assert!(EngineConfig::load().is_err());

        std::env::set_var("FP_HIGH_THRESHOLD", "0.9");
        std::env::set_var("FP_RETENTION_SECS", "172800");
        let config = EngineConfig::load().unwrap();
        assert_eq!(config.thresholds.high, 0.9);
        assert_eq!(config.velocity.retention_secs, 172_800);
        assert_eq!(config.secret.as_deref(), Some("env-secret"));

        for name in ["FP_SECRET", "FP_HIGH_THRESHOLD", "FP_RETENTION_SECS"] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
