//! Geolocation Providers

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use super::types::{GeoError, GeoInfo};

pub type GeoFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<GeoInfo>, GeoError>> + Send + 'a>>;

/// A source of IP geolocation. `Ok(None)` means the provider has no data
/// for the address; errors make the resolver fall through to the next one.
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &str;

    fn lookup(&self, ip: IpAddr) -> GeoFuture<'_>;
}

// ============================================================================
// STATIC PROVIDER
// ============================================================================

/// Fixed table, for tests and operator overrides
#[derive(Debug, Clone, Default)]
pub struct StaticGeoProvider {
    name: String,
    entries: HashMap<IpAddr, GeoInfo>,
}

impl StaticGeoProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, ip: IpAddr, info: GeoInfo) -> Self {
        self.entries.insert(ip, info.normalized());
        self
    }

    /// Unparseable keys are skipped (config validation rejects them first)
    pub fn from_entries<'a>(name: impl Into<String>, entries: impl IntoIterator<Item = (&'a String, &'a GeoInfo)>) -> Self {
        let mut provider = Self::new(name);
        for (ip, info) in entries {
            match ip.parse::<IpAddr>() {
                Ok(addr) => provider = provider.with_entry(addr, info.clone()),
                Err(_) => log::warn!("Skipping static geo entry with invalid IP '{}'", ip),
            }
        }
        provider
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoProvider for StaticGeoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, ip: IpAddr) -> GeoFuture<'_> {
        let found = self.entries.get(&ip).cloned();
        Box::pin(async move { Ok(found) })
    }
}

// ============================================================================
// HTTP PROVIDER
// ============================================================================

/// Common field spellings of JSON geolocation APIs.
///
/// ip-api.com sends `country` (full name) next to `countryCode`, ipapi.co
/// sends `country` next to `country_code`; each spelling is its own field.
#[derive(Debug, Deserialize)]
struct HttpGeoResponse {
    #[serde(default)]
    country: Option<String>,
    #[serde(default, alias = "countryCode")]
    country_code: Option<String>,
    #[serde(default, alias = "lat")]
    latitude: Option<f64>,
    #[serde(default, alias = "lon", alias = "lng")]
    longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_asn")]
    asn: Option<u32>,
    /// ip-api.com: `"AS15169 Google LLC"`
    #[serde(default, rename = "as", deserialize_with = "lenient_asn")]
    as_name: Option<u32>,
    #[serde(default, alias = "hosting")]
    datacenter: Option<bool>,
}

impl HttpGeoResponse {
    /// ISO code field first; a bare `country` only counts when it is a code
    fn country_code(&self) -> Option<String> {
        self.country_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or_else(|| {
                self.country
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
            })
            .map(str::to_string)
    }
}

/// Accepts `15169`, `"15169"`, `"AS15169"` and `"AS15169 Google LLC"`
fn lenient_asn<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| parse_asn(&v)))
}

fn parse_asn(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => {
            let token = s.split_whitespace().next()?;
            let digits = token
                .strip_prefix("AS")
                .or_else(|| token.strip_prefix("as"))
                .unwrap_or(token);
            digits.parse().ok()
        }
        _ => None,
    }
}

impl From<HttpGeoResponse> for GeoInfo {
    fn from(r: HttpGeoResponse) -> Self {
        GeoInfo {
            country: r.country_code(),
            latitude: r.latitude,
            longitude: r.longitude,
            asn: r.asn.or(r.as_name),
            datacenter: r.datacenter.unwrap_or(false),
        }
        .normalized()
    }
}

/// JSON endpoint; `{ip}` in the URL template is replaced with the address
pub struct HttpGeoProvider {
    name: String,
    url_template: String,
    http_client: reqwest::Client,
}

impl HttpGeoProvider {
    /// `timeout` bounds the HTTP request itself; the resolver adds its own
    pub fn new(name: impl Into<String>, url_template: impl Into<String>, timeout: Duration) -> Result<Self, GeoError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeoError::NetworkError(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            url_template: url_template.into(),
            http_client,
        })
    }

    pub fn url_for(&self, ip: IpAddr) -> String {
        self.url_template.replace("{ip}", &ip.to_string())
    }
}

impl GeoProvider for HttpGeoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, ip: IpAddr) -> GeoFuture<'_> {
        let url = self.url_for(ip);
        Box::pin(async move {
            let response = self
                .http_client
                .get(&url)
                .send()
                .await
                .map_err(|e| GeoError::NetworkError(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(GeoError::ServerError(status.as_u16()));
            }

            let body: HttpGeoResponse = response
                .json()
                .await
                .map_err(|e| GeoError::ParseError(e.to_string()))?;
            let info = GeoInfo::from(body);
            Ok(if info == GeoInfo::default() { None } else { Some(info) })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template() {
        let provider =
            HttpGeoProvider::new("ipapi", "https://geo.example/json/{ip}?fields=all", Duration::from_millis(100)).unwrap();
        assert_eq!(
            provider.url_for("203.0.113.9".parse().unwrap()),
            "https://geo.example/json/203.0.113.9?fields=all"
        );
    }

    #[test]
    fn test_http_response_aliases() {
        let body: HttpGeoResponse =
            serde_json::from_str(r#"{ "countryCode": "de", "lat": 52.5, "lon": 13.4, "hosting": true, "extra": 1 }"#)
                .unwrap();
        let info = GeoInfo::from(body);
        assert_eq!(info.country.as_deref(), Some("DE"));
        assert_eq!(info.latitude, Some(52.5));
        assert!(info.datacenter);
    }

    #[test]
    fn test_ip_api_body() {
        let body = r#"{
            "status": "success", "country": "Germany", "countryCode": "DE", "region": "BE",
            "regionName": "Berlin", "city": "Berlin", "lat": 52.5196, "lon": 13.4069,
            "timezone": "Europe/Berlin", "isp": "Hetzner Online GmbH",
            "as": "AS24940 Hetzner Online GmbH", "hosting": true, "query": "203.0.113.9"
        }"#;
        let info = GeoInfo::from(serde_json::from_str::<HttpGeoResponse>(body).unwrap());

        assert_eq!(info.country.as_deref(), Some("DE"));
        assert_eq!(info.asn, Some(24940));
        assert_eq!(info.longitude, Some(13.4069));
        assert!(info.datacenter);
    }

    #[test]
    fn test_ipapi_co_body() {
        let body = r#"{
            "ip": "8.8.8.8", "city": "Mountain View", "region": "California", "country": "US",
            "country_name": "United States", "country_code": "US", "country_code_iso3": "USA",
            "latitude": 37.42301, "longitude": -122.083352, "asn": "AS15169", "org": "GOOGLE"
        }"#;
        let info = GeoInfo::from(serde_json::from_str::<HttpGeoResponse>(body).unwrap());

        assert_eq!(info.country.as_deref(), Some("US"));
        assert_eq!(info.asn, Some(15169));
        assert_eq!(info.latitude, Some(37.42301));
        assert!(!info.datacenter);
    }

    #[test]
    fn test_country_name_alone_is_not_a_code() {
        let info = GeoInfo::from(serde_json::from_str::<HttpGeoResponse>(r#"{ "country": "Germany", "asn": 3320 }"#).unwrap());
        assert_eq!(info.country, None);
        assert_eq!(info.asn, Some(3320));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let ip: IpAddr = "198.51.100.1".parse().unwrap();
        let provider = StaticGeoProvider::new("table").with_entry(ip, GeoInfo::country(" fr "));

        let info = provider.lookup(ip).await.unwrap().unwrap();
        assert_eq!(info.country.as_deref(), Some("FR"));
        assert_eq!(provider.lookup("198.51.100.2".parse().unwrap()).await.unwrap(), None);
    }
}
