//! Geolocation Types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_GEO_CACHE_CAPACITY, DEFAULT_GEO_CACHE_TTL_SECS, DEFAULT_GEO_TIMEOUT_MS};
use crate::logic::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoError {
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("provider returned status {0}")]
    ServerError(u16),

    #[error("unparseable provider response: {0}")]
    ParseError(String),

    #[error("lookup timed out after {0} ms")]
    Timeout(u64),
}

/// What a provider knows about an IP
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoInfo {
    /// ISO 3166-1 alpha-2, upper case
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub asn: Option<u32>,
    /// Hosting / cloud provider range
    pub datacenter: bool,
}

impl GeoInfo {
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn with_datacenter(mut self, datacenter: bool) -> Self {
        self.datacenter = datacenter;
        self
    }

    /// Upper-case country, drop blank values
    pub fn normalized(mut self) -> Self {
        self.country = self
            .country
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty());
        self
    }
}

/// Outcome of resolving one IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GeoLookup {
    Found { provider: String, info: GeoInfo },
    Unknown,
    /// A provider or the caller's deadline ran out before any answer
    TimedOut,
}

impl GeoLookup {
    pub fn info(&self) -> Option<&GeoInfo> {
        match self {
            GeoLookup::Found { info, .. } => Some(info),
            GeoLookup::Unknown | GeoLookup::TimedOut => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, GeoLookup::TimedOut)
    }

    pub fn country(&self) -> Option<&str> {
        self.info().and_then(|i| i.country.as_deref())
    }

    pub fn is_datacenter(&self) -> bool {
        self.info().map_or(false, |i| i.datacenter)
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// One entry of the provider chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeoProviderConfig {
    /// Fixed IP → info table
    Static {
        #[serde(default)]
        entries: BTreeMap<String, GeoInfo>,
    },
    /// JSON endpoint; `{ip}` in the template is replaced by the address
    Http { name: String, url_template: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Per-provider lookup timeout
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    /// Tried in order
    pub providers: Vec<GeoProviderConfig>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_GEO_TIMEOUT_MS,
            cache_ttl_secs: DEFAULT_GEO_CACHE_TTL_SECS,
            cache_capacity: DEFAULT_GEO_CACHE_CAPACITY,
            providers: Vec::new(),
        }
    }
}

impl GeoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidGeo("timeout_ms must be positive".to_string()));
        }
        for provider in &self.providers {
            match provider {
                GeoProviderConfig::Static { entries } => {
                    if let Some(bad) = entries.keys().find(|ip| ip.parse::<std::net::IpAddr>().is_err()) {
                        return Err(ConfigError::InvalidGeo(format!("static entry '{}' is not an IP address", bad)));
                    }
                }
                GeoProviderConfig::Http { name, url_template } => {
                    if !url_template.contains("{ip}") {
                        return Err(ConfigError::InvalidGeo(format!(
                            "provider '{}' url_template must contain {{ip}}",
                            name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
