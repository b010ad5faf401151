//! Configuration module
//!
//! Server settings only. Engine settings (thresholds, windows, store,
//! geolocation) are loaded by `EngineConfig::load` from `FINGERPRINT_CONFIG`
//! and `FP_*` variables.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Required `x-api-key` value; `None` disables the check
    pub api_key: Option<String>,

    /// Environment (development, production)
    pub environment: String,

    /// Maximum request body size in bytes
    pub body_limit: usize,

    /// Reverse proxies in front of the server whose forwarding headers are
    /// trusted; 0 = clients connect directly
    pub trusted_proxy_hops: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            api_key: None,
            environment: "development".to_string(),
            body_limit: 256 * 1024,
            trusted_proxy_hops: 0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            api_key: env::var("API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),

            environment: env::var("ENVIRONMENT")
                .unwrap_or(defaults.environment),

            body_limit: env::var("BODY_LIMIT_BYTES")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(defaults.body_limit),

            trusted_proxy_hops: env::var("TRUSTED_PROXY_HOPS")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or(defaults.trusted_proxy_hops),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
