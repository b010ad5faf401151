//! Geo Module - IP geolocation
//!
//! ## Structure
//! - `types.rs` - GeoInfo, GeoLookup, GeoConfig, GeoError
//! - `provider.rs` - GeoProvider trait, static and HTTP providers
//! - `resolver.rs` - Provider chain with timeouts and TTL cache
//!
//! Results feed the visitor event country and the `datacenter_ip` risk
//! flag. They never enter the identity vector.

pub mod provider;
pub mod resolver;
pub mod types;

pub use provider::{GeoFuture, GeoProvider, HttpGeoProvider, StaticGeoProvider};
pub use resolver::{is_public, GeoResolver};
pub use types::{GeoConfig, GeoError, GeoInfo, GeoLookup, GeoProviderConfig};
