//! Network Module - Server-observed request signals
//!
//! ## Structure
//! - `headers.rs` - Header order hash, accept-language, proxy headers
//! - `client_hello.rs` - JA3-style TLS ClientHello hash
//!
//! Values observed by the server overwrite client-reported values of the
//! same key in the bag.

pub mod client_hello;
pub mod headers;

use serde::{Deserialize, Serialize};

use crate::logic::canonical::SignalBag;
use crate::logic::risk::ExternalSignals;

pub use client_hello::{is_grease, ClientHelloRecord};
pub use headers::{HeaderSnapshot, PROXY_HEADERS};

pub const HEADER_ORDER_KEY: &str = "http_header_order_hash";
pub const ACCEPT_LANGUAGE_KEY: &str = "accept_language";
pub const CLIENT_HELLO_KEY: &str = "tls_client_hello_hash";

/// Everything the network collector captured for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSignals {
    pub headers: Option<HeaderSnapshot>,
    pub client_hello: Option<ClientHelloRecord>,
}

impl NetworkSignals {
    /// Merge identity fields into `bag`; returns the risk flags observed
    pub fn apply(&self, bag: &mut SignalBag) -> ExternalSignals {
        let mut flags = ExternalSignals::default();

        if let Some(headers) = &self.headers {
            if let Some(hash) = headers.order_hash() {
                bag.insert(HEADER_ORDER_KEY, hash);
            }
            if let Some(language) = headers.accept_language() {
                bag.insert(ACCEPT_LANGUAGE_KEY, language);
            }
            let proxies = headers.proxy_headers();
            if !proxies.is_empty() {
                log::debug!("Proxy headers present: {}", proxies.join(", "));
                flags.proxy = true;
            }
        }

        if let Some(hello) = &self.client_hello {
            bag.insert(CLIENT_HELLO_KEY, hello.ja3_hash());
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::canonical::SignalValue;

    #[test]
    fn test_apply_merges_into_bag() {
        let network = NetworkSignals {
            headers: Some(
                HeaderSnapshot::new()
                    .with("Host", "example.com")
                    .with("Accept-Language", "de-DE"),
            ),
            client_hello: Some(ClientHelloRecord {
                version: 771,
                ciphers: vec![4865],
                ..Default::default()
            }),
        };
        let mut bag = SignalBag::new().with(ACCEPT_LANGUAGE_KEY, "fr-FR");

        let flags = network.apply(&mut bag);

        assert!(!flags.proxy);
        assert_eq!(bag.get(ACCEPT_LANGUAGE_KEY), Some(&SignalValue::Text("de-DE".to_string())));
        assert!(bag.contains_key(HEADER_ORDER_KEY));
        assert!(bag.contains_key(CLIENT_HELLO_KEY));
    }

    #[test]
    fn test_proxy_header_sets_flag_not_identity() {
        let network = NetworkSignals {
            headers: Some(HeaderSnapshot::new().with("X-Forwarded-For", "10.0.0.1")),
            client_hello: None,
        };
        let mut bag = SignalBag::new();
        let flags = network.apply(&mut bag);

        assert!(flags.proxy);
        assert_eq!(bag.keys().collect::<Vec<_>>(), vec![HEADER_ORDER_KEY]);
    }

    #[test]
    fn test_nothing_captured_leaves_bag_alone() {
        let mut bag = SignalBag::new();
        let flags = NetworkSignals::default().apply(&mut bag);
        assert!(bag.is_empty());
        assert_eq!(flags, ExternalSignals::default());
    }
}
