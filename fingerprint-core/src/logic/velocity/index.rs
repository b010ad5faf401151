//! Velocity Index
//!
//! Segmented append-only event log.
//! - `record` appends to the active segment under one short lock and seals
//!   it when full; it never waits on aggregation
//! - `query` snapshots segment handles, then aggregates without any lock
//! - `compact` raises the horizon first (old events become invisible at
//!   once), then removes them by snapshot-then-filter
//!
//! Lock order: active → sealed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};

use super::aggregate::aggregate;
use super::segment::Segment;
use super::types::{
    IncomingEvent, VelocityConfig, VelocityError, VelocityStats, VelocityWindowSet, VisitorEvent, WindowSpec,
};

/// No horizon yet
const NO_HORIZON: i64 = i64::MIN;

pub struct VelocityIndex {
    config: VelocityConfig,
    active: Mutex<Vec<Arc<VisitorEvent>>>,
    sealed: RwLock<VecDeque<Arc<Segment>>>,
    /// Events with `ts <= horizon` (ms) are never visible
    horizon: AtomicI64,
    /// Newest timestamp ever recorded (ms)
    newest: AtomicI64,
    /// Events held in sealed + active segments
    live: AtomicUsize,
    /// One compaction at a time
    compaction: Mutex<()>,
}

impl VelocityIndex {
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            active: Mutex::new(Vec::with_capacity(config.segment_size)),
            sealed: RwLock::new(VecDeque::new()),
            horizon: AtomicI64::new(NO_HORIZON),
            newest: AtomicI64::new(NO_HORIZON),
            live: AtomicUsize::new(0),
            compaction: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    pub fn windows(&self) -> &[WindowSpec] {
        &self.config.windows
    }

    // ========================================================================
    // RECORD
    // ========================================================================

    /// Validate and append; a malformed event is rejected and never stored
    pub fn record(&self, event: IncomingEvent) -> Result<(), VelocityError> {
        let event = VisitorEvent::try_from(event)?;
        self.append(event);
        Ok(())
    }

    /// Append an already validated event
    pub fn append(&self, event: VisitorEvent) {
        let ts = event.timestamp_millis();
        if ts <= self.horizon.load(Ordering::Acquire) {
            log::debug!("Dropping event for {} behind compaction horizon", event.visitor_id);
            return;
        }
        self.newest.fetch_max(ts, Ordering::AcqRel);

        let live = {
            let mut active = self.active.lock();
            active.push(Arc::new(event));
            // Counted under the lock so a compaction never removes an uncounted event
            let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
            if active.len() >= self.config.segment_size {
                let full = std::mem::replace(&mut *active, Vec::with_capacity(self.config.segment_size));
                if let Some(segment) = Segment::seal(full) {
                    self.sealed.write().push_back(Arc::new(segment));
                }
            }
            live
        };

        if live > self.config.max_events {
            self.enforce_bound();
        }
    }

    // ========================================================================
    // QUERY
    // ========================================================================

    /// Aggregate `windows` for `visitor_id` as of `now`
    pub fn query(&self, visitor_id: &str, windows: &[WindowSpec], now: DateTime<Utc>) -> VelocityWindowSet {
        let Some(longest) = windows.iter().map(|w| w.secs).max() else {
            return VelocityWindowSet::empty(visitor_id, now, windows);
        };

        let now_ms = now.timestamp_millis();
        let horizon = self.horizon.load(Ordering::Acquire);
        let lower = (now_ms - longest * 1000).max(horizon);

        let events = self.snapshot(lower, now_ms);
        aggregate(&events, visitor_id, windows, now)
    }

    /// Query the configured windows
    pub fn query_default(&self, visitor_id: &str, now: DateTime<Utc>) -> VelocityWindowSet {
        self.query(visitor_id, &self.config.windows, now)
    }

    /// Events in `(lower, upper]` (ms)
    fn snapshot(&self, lower: i64, upper: i64) -> Vec<Arc<VisitorEvent>> {
        let (segments, active) = {
            let active = self.active.lock();
            let segments: Vec<Arc<Segment>> = self
                .sealed
                .read()
                .iter()
                .filter(|s| s.overlaps(lower, upper))
                .cloned()
                .collect();
            (segments, active.clone())
        };

        let in_range = |e: &&Arc<VisitorEvent>| {
            let ts = e.timestamp_millis();
            ts > lower && ts <= upper
        };

        segments
            .iter()
            .flat_map(|s| s.events.iter())
            .chain(active.iter())
            .filter(in_range)
            .cloned()
            .collect()
    }

    // ========================================================================
    // COMPACTION
    // ========================================================================

    /// Drop events older than `retention` before `now`
    pub fn compact(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let _guard = self.compaction.lock();
        self.compact_locked((now - retention).timestamp_millis())
    }

    /// Scheduled compaction with the configured retention
    pub fn compact_default(&self, now: DateTime<Utc>) -> usize {
        self.compact(now, Duration::seconds(self.config.retention_secs))
    }

    fn compact_locked(&self, cutoff: i64) -> usize {
        // Visible effect is immediate; removal below is bookkeeping
        self.horizon.fetch_max(cutoff, Ordering::AcqRel);
        let cutoff = self.horizon.load(Ordering::Acquire);

        let snapshot: Vec<Arc<Segment>> = self.sealed.read().iter().cloned().collect();

        // Filter outside any lock
        let mut replacements: HashMap<*const Segment, Option<Arc<Segment>>> = HashMap::new();
        let mut removed = 0;
        for segment in &snapshot {
            if segment.fully_expired(cutoff) {
                removed += segment.len();
                replacements.insert(Arc::as_ptr(segment), None);
            } else if segment.straddles(cutoff) {
                let kept = segment.retain_after(cutoff);
                removed += segment.len() - kept.as_ref().map_or(0, |k| k.len());
                replacements.insert(Arc::as_ptr(segment), kept.map(Arc::new));
            }
        }

        if !replacements.is_empty() {
            let mut sealed = self.sealed.write();
            let current = std::mem::take(&mut *sealed);
            for segment in current {
                match replacements.remove(&Arc::as_ptr(&segment)) {
                    Some(Some(kept)) => sealed.push_back(kept),
                    Some(None) => {}
                    None => sealed.push_back(segment),
                }
            }
        }

        {
            let mut active = self.active.lock();
            let before = active.len();
            active.retain(|e| e.timestamp_millis() > cutoff);
            removed += before - active.len();
        }

        self.live.fetch_sub(removed, Ordering::AcqRel);
        if removed > 0 {
            log::debug!("Velocity compaction removed {} events", removed);
        }
        removed
    }

    /// Backpressure when the log outgrows `max_events`
    fn enforce_bound(&self) {
        // Another caller is already compacting
        let Some(_guard) = self.compaction.try_lock() else {
            return;
        };

        // A client clock far in the future must not push the horizon past real time
        let newest = self
            .newest
            .load(Ordering::Acquire)
            .min(Utc::now().timestamp_millis());
        let cutoff = newest.saturating_sub(self.config.longest_window_secs() * 1000);
        let removed = self.compact_locked(cutoff);
        log::debug!("Eager velocity compaction removed {} events", removed);

        if self.live.load(Ordering::Acquire) <= self.config.max_events {
            return;
        }

        // Still over: drop whole segments, oldest first
        let mut dropped_events = 0;
        {
            let mut sealed = self.sealed.write();
            while self.live.load(Ordering::Acquire).saturating_sub(dropped_events) > self.config.max_events {
                let Some(segment) = sealed.pop_front() else {
                    break;
                };
                dropped_events += segment.len();
            }
        }

        if dropped_events > 0 {
            self.live.fetch_sub(dropped_events, Ordering::AcqRel);
            log::warn!(
                "Velocity log over capacity: dropped {} in-window events (max_events = {})",
                dropped_events,
                self.config.max_events
            );
        }
    }

    // ========================================================================
    // STATS
    // ========================================================================

    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> VelocityStats {
        let active_events = self.active.lock().len();
        let sealed_segments = self.sealed.read().len();
        let horizon = self.horizon.load(Ordering::Acquire);

        VelocityStats {
            live_events: self.len(),
            sealed_segments,
            active_events,
            horizon: if horizon == NO_HORIZON {
                None
            } else {
                Utc.timestamp_millis_opt(horizon).single()
            },
        }
    }
}

impl Default for VelocityIndex {
    fn default() -> Self {
        Self::new(VelocityConfig::default())
    }
}
