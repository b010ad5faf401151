//! HTTP Header Signals
//!
//! Header order is stable per client stack and survives cookie clearing,
//! so its hash joins the signal bag. Proxy headers are a risk input only.
//!
//! Forwarding added by the deployment's own reverse proxies is stripped
//! with `trust_forwarding_hops` before either is computed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Headers that reveal an intermediary
pub const PROXY_HEADERS: &[&str] = &[
    "via",
    "forwarded",
    "x-forwarded-for",
    "x-real-ip",
    "client-ip",
    "true-client-ip",
    "x-proxy-id",
    "proxy-connection",
];

/// Request headers in received order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSnapshot {
    pub headers: Vec<(String, String)>,
}

impl HeaderSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// First value of `name` (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Lower-cased names in received order
    pub fn names(&self) -> Vec<String> {
        self.headers.iter().map(|(n, _)| n.trim().to_ascii_lowercase()).collect()
    }

    /// SHA-256 of the lower-cased names joined by `,`; `None` without headers
    pub fn order_hash(&self) -> Option<String> {
        if self.headers.is_empty() {
            return None;
        }
        let joined = self.names().join(",");
        Some(hex::encode(Sha256::digest(joined.as_bytes())))
    }

    pub fn accept_language(&self) -> Option<&str> {
        self.get("accept-language")
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Proxy headers present, lower-cased, in received order
    pub fn proxy_headers(&self) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for name in self.names() {
            if PROXY_HEADERS.contains(&name.as_str()) && !found.contains(&name) {
                found.push(name);
            }
        }
        found
    }

    pub fn has_proxy_headers(&self) -> bool {
        !self.proxy_headers().is_empty()
    }

    /// Every `X-Forwarded-For` entry, oldest hop first
    pub fn forwarded_for(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(n, _)| n.trim().eq_ignore_ascii_case(FORWARDED_FOR))
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Address the outermost of `trusted_hops` proxies received the request from.
    /// `None` with no trusted hops or when the chain is shorter than claimed.
    pub fn forwarded_client(&self, trusted_hops: usize) -> Option<String> {
        if trusted_hops == 0 {
            return None;
        }
        let entries = self.forwarded_for();
        match entries.len().checked_sub(trusted_hops) {
            Some(i) => entries.into_iter().nth(i),
            None => self
                .get(REAL_IP)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }
    }

    /// Drop what `trusted_hops` own proxies appended: their `X-Forwarded-For`
    /// entries and `X-Real-IP`. Entries left over come from proxies in front.
    pub fn trust_forwarding_hops(mut self, trusted_hops: usize) -> Self {
        if trusted_hops == 0 {
            return self;
        }
        let mut entries = self.forwarded_for();
        entries.truncate(entries.len().saturating_sub(trusted_hops));

        let position = self
            .headers
            .iter()
            .position(|(n, _)| n.trim().eq_ignore_ascii_case(FORWARDED_FOR));
        self.headers.retain(|(n, _)| {
            let n = n.trim();
            !n.eq_ignore_ascii_case(FORWARDED_FOR) && !n.eq_ignore_ascii_case(REAL_IP)
        });
        if let (Some(position), false) = (position, entries.is_empty()) {
            let position = position.min(self.headers.len());
            self.headers.insert(position, (FORWARDED_FOR.to_string(), entries.join(", ")));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chrome_like() -> HeaderSnapshot {
        HeaderSnapshot::new()
            .with("Host", "example.com")
            .with("Connection", "keep-alive")
            .with("User-Agent", "Mozilla/5.0")
            .with("Accept-Language", " en-US,en;q=0.9 ")
    }

    #[test]
    fn test_order_hash_is_case_insensitive_but_order_sensitive() {
        let lower = HeaderSnapshot::new()
            .with("host", "a")
            .with("connection", "b")
            .with("user-agent", "c")
            .with("accept-language", "d");
        assert_eq!(chrome_like().order_hash(), lower.order_hash());

        let reordered = HeaderSnapshot::new()
            .with("User-Agent", "Mozilla/5.0")
            .with("Host", "example.com")
            .with("Connection", "keep-alive")
            .with("Accept-Language", "en-US");
        assert_ne!(chrome_like().order_hash(), reordered.order_hash());

        let expected = hex::encode(Sha256::digest(b"host,connection,user-agent,accept-language"));
        assert_eq!(chrome_like().order_hash().unwrap(), expected);
    }

    #[test]
    fn test_empty_snapshot_has_no_hash() {
        assert_eq!(HeaderSnapshot::new().order_hash(), None);
        assert_eq!(HeaderSnapshot::new().accept_language(), None);
    }

    #[test]
    fn test_accept_language_trimmed() {
        assert_eq!(chrome_like().accept_language(), Some("en-US,en;q=0.9"));
    }

    #[test]
    fn test_proxy_headers_detected() {
        assert!(!chrome_like().has_proxy_headers());

        let proxied = chrome_like()
            .with("Via", "1.1 squid")
            .with("X-Forwarded-For", "198.51.100.7")
            .with("via", "1.1 other");
        assert_eq!(proxied.proxy_headers(), vec!["via", "x-forwarded-for"]);
    }

    fn behind_load_balancer(forwarded_for: &str) -> HeaderSnapshot {
        chrome_like()
            .with("X-Forwarded-For", forwarded_for)
            .with("X-Real-IP", "203.0.113.50")
    }

    #[test]
    fn test_one_trusted_hop_is_not_a_proxy() {
        let direct = behind_load_balancer("203.0.113.50");
        assert!(direct.has_proxy_headers());
        assert_eq!(direct.forwarded_client(1).as_deref(), Some("203.0.113.50"));

        let trusted = direct.trust_forwarding_hops(1);
        assert!(!trusted.has_proxy_headers());
        assert_eq!(trusted.order_hash(), chrome_like().order_hash());
    }

    #[test]
    fn test_hops_beyond_trusted_chain_are_a_proxy() {
        let chained = behind_load_balancer("198.51.100.7, 203.0.113.50");
        assert_eq!(chained.forwarded_client(1).as_deref(), Some("203.0.113.50"));

        let trusted = chained.trust_forwarding_hops(1);
        assert_eq!(trusted.proxy_headers(), vec!["x-forwarded-for"]);
        assert_eq!(trusted.get("x-forwarded-for"), Some("198.51.100.7"));
    }

    #[test]
    fn test_forwarded_client_edge_cases() {
        let snapshot = behind_load_balancer("203.0.113.50");
        assert_eq!(snapshot.forwarded_client(0), None);
        // Chain shorter than configured falls back to X-Real-IP
        assert_eq!(snapshot.forwarded_client(3).as_deref(), Some("203.0.113.50"));
        assert_eq!(chrome_like().forwarded_client(1), None);

        let split = chrome_like()
            .with("X-Forwarded-For", "198.51.100.1")
            .with("X-Forwarded-For", "198.51.100.2, 198.51.100.3");
        assert_eq!(split.forwarded_for(), vec!["198.51.100.1", "198.51.100.2", "198.51.100.3"]);
        assert_eq!(split.forwarded_client(2).as_deref(), Some("198.51.100.2"));
        assert_eq!(split.clone().trust_forwarding_hops(0), split);
    }
}
