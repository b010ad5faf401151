//! Device Identity Derivation
//!
//! - `device_id`: HMAC-SHA256 of the canonical serialization, keyed by a
//!   server-held secret that never reaches the collecting environment
//! - per-feature hashes: plain SHA-256 of each tagged normalized value,
//!   used for weighted partial matching

use std::collections::BTreeMap;
use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::logic::canonical::CanonicalVector;
use crate::logic::config::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Per-feature content hashes keyed by signal name
pub type FeatureHashes = BTreeMap<String, String>;

/// Server-held HMAC key
#[derive(Clone)]
pub struct DeviceSecret(Vec<u8>);

impl DeviceSecret {
    /// Secret must be non-empty
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Never print key material
impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceSecret(<{} bytes>)", self.0.len())
    }
}

/// Output of identity derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedIdentity {
    /// 64 hex chars (HMAC-SHA256)
    pub device_id: String,
    /// Hash per non-null signal; null signals have no entry
    pub per_feature_hash: FeatureHashes,
}

/// Stateless deriver bound to one secret
#[derive(Debug, Clone)]
pub struct IdentityDeriver {
    secret: DeviceSecret,
}

impl IdentityDeriver {
    pub fn new(secret: DeviceSecret) -> Self {
        Self { secret }
    }

    /// Derive the device id and per-feature hashes
    pub fn derive(&self, vector: &CanonicalVector) -> DerivedIdentity {
        derive_identity(vector, &self.secret)
    }
}

/// Pure function of (vector, secret)
pub fn derive_identity(vector: &CanonicalVector, secret: &DeviceSecret) -> DerivedIdentity {
    let canonical = vector.serialize();

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    let device_id = hex::encode(mac.finalize().into_bytes());

    let per_feature_hash = vector
        .iter()
        .filter_map(|entry| {
            entry
                .value
                .tagged_payload()
                .map(|payload| (entry.key.clone(), feature_hash(&entry.key, &payload)))
        })
        .collect();

    DerivedIdentity {
        device_id,
        per_feature_hash,
    }
}

/// SHA-256 over `key \0 tagged-payload`
///
/// The key is part of the input so equal values of different signals never
/// share a hash.
pub fn feature_hash(key: &str, tagged_payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(tagged_payload.as_bytes());
    hex::encode(hasher.finalize())
}
