//! Identify request model

use chrono::{DateTime, Utc};
use device_fingerprint_core::logic::canonical::SignalBag;
use device_fingerprint_core::logic::network::{ClientHelloRecord, HeaderSnapshot, NetworkSignals};
use device_fingerprint_core::logic::risk::{ExternalSignals, InteractionCounters};
use device_fingerprint_core::IdentifyRequest;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct IdentifyBody {
    /// Collector output, signal key → value
    pub signals: serde_json::Map<String, serde_json::Value>,

    /// Overrides the address taken from the connection headers
    #[validate(ip)]
    pub ip: Option<String>,

    #[validate(length(min = 1, max = 256))]
    pub linked_id: Option<String>,

    #[validate(url)]
    pub url: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub event_type: Option<String>,

    pub external: ExternalSignals,

    pub behavior: Option<InteractionCounters>,

    /// TLS ClientHello captured by the terminating proxy
    pub client_hello: Option<ClientHelloRecord>,

    pub timestamp: Option<DateTime<Utc>>,
}

impl IdentifyBody {
    /// Engine request; `headers` and `client_ip` come from the HTTP request itself
    pub fn into_request(self, headers: HeaderSnapshot, client_ip: Option<String>) -> IdentifyRequest {
        IdentifyRequest {
            signals: SignalBag::from(self.signals),
            network: NetworkSignals {
                headers: Some(headers),
                client_hello: self.client_hello,
            },
            ip: self.ip.or(client_ip),
            linked_id: self.linked_id,
            url: self.url,
            event_type: self.event_type,
            external: self.external,
            behavior: self.behavior,
            timestamp: self.timestamp,
        }
    }
}
