//! Velocity Types
//!
//! Events, window configuration and aggregate results.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMPACTION_INTERVAL_SECS, DEFAULT_MAX_EVENTS, DEFAULT_RETENTION_SECS, DEFAULT_SEGMENT_SIZE,
    DEFAULT_VELOCITY_WINDOWS,
};
use crate::logic::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VelocityError {
    #[error("malformed event: {0}")]
    MalformedEvent(&'static str),
}

// ============================================================================
// EVENTS
// ============================================================================

/// Event as received; every field optional until validated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub visitor_id: Option<String>,
    pub ip: Option<String>,
    pub linked_id: Option<String>,
    pub country: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub event_type: Option<String>,
}

/// Validated, immutable event owned by the velocity index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorEvent {
    pub visitor_id: String,
    pub ip: Option<String>,
    pub linked_id: Option<String>,
    pub country: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub url: Option<String>,
    pub event_type: Option<String>,
}

impl VisitorEvent {
    pub fn new(visitor_id: impl Into<String>, ip: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            visitor_id: visitor_id.into(),
            ip: Some(ip.into()),
            linked_id: None,
            country: None,
            timestamp,
            url: None,
            event_type: None,
        }
    }

    pub fn with_linked_id(mut self, linked_id: impl Into<String>) -> Self {
        self.linked_id = Some(linked_id.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Blank optional fields are treated as absent
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl TryFrom<IncomingEvent> for VisitorEvent {
    type Error = VelocityError;

    fn try_from(event: IncomingEvent) -> Result<Self, Self::Error> {
        let visitor_id = non_blank(event.visitor_id).ok_or(VelocityError::MalformedEvent("missing visitor_id"))?;
        let timestamp = event.timestamp.ok_or(VelocityError::MalformedEvent("missing timestamp"))?;

        Ok(Self {
            visitor_id,
            ip: non_blank(event.ip),
            linked_id: non_blank(event.linked_id),
            country: non_blank(event.country).map(|c| c.to_ascii_uppercase()),
            timestamp,
            url: non_blank(event.url),
            event_type: non_blank(event.event_type),
        })
    }
}

impl From<VisitorEvent> for IncomingEvent {
    fn from(event: VisitorEvent) -> Self {
        Self {
            visitor_id: Some(event.visitor_id),
            ip: event.ip,
            linked_id: event.linked_id,
            country: event.country,
            timestamp: Some(event.timestamp),
            url: event.url,
            event_type: event.event_type,
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Named trailing window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub name: String,
    pub secs: i64,
}

impl WindowSpec {
    pub fn new(name: impl Into<String>, secs: i64) -> Self {
        Self {
            name: name.into(),
            secs,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Shortest first; strictly increasing
    pub windows: Vec<WindowSpec>,
    /// Scheduled compaction drops events older than this
    pub retention_secs: i64,
    /// Live events that trigger an eager inline compaction
    pub max_events: usize,
    /// Events per sealed segment
    pub segment_size: usize,
    pub compaction_interval_secs: u64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_VELOCITY_WINDOWS
                .iter()
                .map(|(name, secs)| WindowSpec::new(*name, *secs))
                .collect(),
            retention_secs: DEFAULT_RETENTION_SECS,
            max_events: DEFAULT_MAX_EVENTS,
            segment_size: DEFAULT_SEGMENT_SIZE,
            compaction_interval_secs: DEFAULT_COMPACTION_INTERVAL_SECS,
        }
    }
}

impl VelocityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidVelocity(msg));

        if self.windows.is_empty() {
            return invalid("at least one window is required".to_string());
        }
        let mut previous = 0;
        for window in &self.windows {
            if window.name.trim().is_empty() {
                return invalid("window name must not be empty".to_string());
            }
            if window.secs <= previous {
                return invalid(format!(
                    "window '{}' ({}s) must be positive and longer than the previous window",
                    window.name, window.secs
                ));
            }
            previous = window.secs;
        }
        if self.retention_secs < self.longest_window_secs() {
            return invalid(format!(
                "retention {}s is shorter than the longest window {}s",
                self.retention_secs,
                self.longest_window_secs()
            ));
        }
        if self.max_events == 0 || self.segment_size == 0 {
            return invalid("max_events and segment_size must be positive".to_string());
        }
        if self.compaction_interval_secs == 0 {
            return invalid("compaction_interval_secs must be positive".to_string());
        }
        Ok(())
    }

    pub fn longest_window_secs(&self) -> i64 {
        self.windows.iter().map(|w| w.secs).max().unwrap_or(0)
    }
}

// ============================================================================
// AGGREGATES
// ============================================================================

/// Per-dimension counts for one window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub name: String,
    pub duration_secs: i64,
    pub distinct_ip: usize,
    pub distinct_linked_id: usize,
    pub distinct_country: usize,
    /// Raw event count of the visitor
    pub events: usize,
    /// Events from any visitor on an IP this visitor used
    pub ip_events: usize,
    /// Distinct IPs across every visitor sharing one of this visitor's linked ids
    pub distinct_ip_by_linked_id: usize,
    /// Distinct visitors sharing one of this visitor's linked ids
    pub distinct_visitor_by_linked_id: usize,
}

/// Counts for every requested window, in request order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityWindowSet {
    pub visitor_id: String,
    pub now: DateTime<Utc>,
    pub windows: Vec<WindowCounts>,
}

impl VelocityWindowSet {
    pub fn empty(visitor_id: impl Into<String>, now: DateTime<Utc>, windows: &[WindowSpec]) -> Self {
        Self {
            visitor_id: visitor_id.into(),
            now,
            windows: windows
                .iter()
                .map(|w| WindowCounts {
                    name: w.name.clone(),
                    duration_secs: w.secs,
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&WindowCounts> {
        self.windows.iter().find(|w| w.name == name)
    }

    /// First (shortest) window
    pub fn shortest(&self) -> Option<&WindowCounts> {
        self.windows.first()
    }

    /// Second window, or the only one when a single window is configured
    pub fn mid(&self) -> Option<&WindowCounts> {
        self.windows.get(1).or_else(|| self.windows.last())
    }

    pub fn longest(&self) -> Option<&WindowCounts> {
        self.windows.last()
    }
}

/// Snapshot of index internals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityStats {
    pub live_events: usize,
    pub sealed_segments: usize,
    pub active_events: usize,
    /// Events at or before this instant are compacted away
    pub horizon: Option<DateTime<Utc>>,
}
