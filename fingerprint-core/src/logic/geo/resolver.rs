//! Geo Resolver
//!
//! Ordered provider chain with a per-provider timeout and a bounded TTL
//! cache. Never fails: anything short of an answer is `GeoLookup::Unknown`,
//! or `GeoLookup::TimedOut` when a provider ran out of time.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::provider::{GeoProvider, HttpGeoProvider, StaticGeoProvider};
use super::types::{GeoConfig, GeoError, GeoLookup, GeoProviderConfig};

struct CacheEntry {
    lookup: GeoLookup,
    inserted: Instant,
}

pub struct GeoResolver {
    providers: Vec<Arc<dyn GeoProvider>>,
    timeout: Duration,
    ttl: Duration,
    capacity: usize,
    cache: Mutex<HashMap<IpAddr, CacheEntry>>,
}

impl GeoResolver {
    pub fn new(providers: Vec<Arc<dyn GeoProvider>>, timeout: Duration, ttl: Duration, capacity: usize) -> Self {
        Self {
            providers,
            timeout,
            ttl,
            capacity,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// No providers: every lookup is `Unknown`
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::from_millis(1), Duration::ZERO, 0)
    }

    /// Build the configured provider chain
    pub fn from_config(config: &GeoConfig) -> Result<Self, GeoError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut providers: Vec<Arc<dyn GeoProvider>> = Vec::with_capacity(config.providers.len());

        for (i, provider) in config.providers.iter().enumerate() {
            match provider {
                GeoProviderConfig::Static { entries } => {
                    providers.push(Arc::new(StaticGeoProvider::from_entries(format!("static-{}", i), entries)));
                }
                GeoProviderConfig::Http { name, url_template } => {
                    providers.push(Arc::new(HttpGeoProvider::new(name.clone(), url_template.clone(), timeout)?));
                }
            }
        }

        log::info!(
            "Geo resolver: {} providers, timeout {} ms, cache {} entries / {} s",
            providers.len(),
            config.timeout_ms,
            config.cache_capacity,
            config.cache_ttl_secs
        );
        Ok(Self::new(
            providers,
            timeout,
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        ))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    // ========================================================================
    // RESOLVE
    // ========================================================================

    /// Resolve a textual IP; unparseable input is `Unknown`
    pub async fn resolve_str(&self, ip: &str) -> GeoLookup {
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.resolve(addr).await,
            Err(_) => {
                log::debug!("Not an IP address: '{}'", ip);
                GeoLookup::Unknown
            }
        }
    }

    pub async fn resolve(&self, ip: IpAddr) -> GeoLookup {
        if !is_public(ip) {
            return GeoLookup::Unknown;
        }
        if let Some(cached) = self.cached(ip) {
            return cached;
        }

        let mut timed_out = false;
        for provider in &self.providers {
            match tokio::time::timeout(self.timeout, provider.lookup(ip)).await {
                Ok(Ok(Some(info))) => {
                    let lookup = GeoLookup::Found {
                        provider: provider.name().to_string(),
                        info,
                    };
                    self.store(ip, lookup.clone());
                    return lookup;
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => log::warn!("Geo provider {} failed for {}: {}", provider.name(), ip, e),
                Err(_) => {
                    timed_out = true;
                    log::warn!(
                        "Geo provider {} failed for {}: {}",
                        provider.name(),
                        ip,
                        GeoError::Timeout(self.timeout.as_millis() as u64)
                    );
                }
            }
        }
        if timed_out {
            GeoLookup::TimedOut
        } else {
            GeoLookup::Unknown
        }
    }

    // ========================================================================
    // CACHE
    // ========================================================================

    fn cached(&self, ip: IpAddr) -> Option<GeoLookup> {
        let mut cache = self.cache.lock();
        match cache.get(&ip) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.lookup.clone()),
            Some(_) => {
                cache.remove(&ip);
                None
            }
            None => None,
        }
    }

    fn store(&self, ip: IpAddr, lookup: GeoLookup) {
        if self.capacity == 0 || self.ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.lock();
        if cache.len() >= self.capacity && !cache.contains_key(&ip) {
            let ttl = self.ttl;
            cache.retain(|_, e| e.inserted.elapsed() < ttl);
        }
        if cache.len() >= self.capacity && !cache.contains_key(&ip) {
            let oldest = cache.iter().min_by_key(|(_, e)| e.inserted).map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            ip,
            CacheEntry {
                lookup,
                inserted: Instant::now(),
            },
        );
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Private, loopback, link-local and unspecified addresses have no location
pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // carrier-grade NAT 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64))
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_public(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}
