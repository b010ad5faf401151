//! Sealed Log Segments
//!
//! A segment is immutable once sealed. Compaction either keeps it, drops
//! it whole, or replaces it with a filtered copy.

use std::sync::Arc;

use super::types::VisitorEvent;

#[derive(Debug)]
pub struct Segment {
    pub events: Vec<Arc<VisitorEvent>>,
    /// Oldest event timestamp (ms)
    pub min_ts: i64,
    /// Newest event timestamp (ms)
    pub max_ts: i64,
}

impl Segment {
    /// `None` for an empty event list
    pub fn seal(events: Vec<Arc<VisitorEvent>>) -> Option<Self> {
        let min_ts = events.iter().map(|e| e.timestamp_millis()).min()?;
        let max_ts = events.iter().map(|e| e.timestamp_millis()).max()?;
        Some(Self { events, min_ts, max_ts })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Every event is at or before `cutoff`
    pub fn fully_expired(&self, cutoff: i64) -> bool {
        self.max_ts <= cutoff
    }

    /// Some, but not all, events are at or before `cutoff`
    pub fn straddles(&self, cutoff: i64) -> bool {
        self.min_ts <= cutoff && self.max_ts > cutoff
    }

    /// Copy without events at or before `cutoff`
    pub fn retain_after(&self, cutoff: i64) -> Option<Self> {
        let kept = self
            .events
            .iter()
            .filter(|e| e.timestamp_millis() > cutoff)
            .cloned()
            .collect();
        Self::seal(kept)
    }

    /// May hold events in `(lower, upper]`
    pub fn overlaps(&self, lower: i64, upper: i64) -> bool {
        self.max_ts > lower && self.min_ts <= upper
    }
}
