//! Window Aggregation
//!
//! Recompute-on-read over an event snapshot. For each window:
//! 1. the visitor's own events give the distinct IP / linked id / country
//!    sets and the raw count
//! 2. a second pass over every in-window event, restricted to the
//!    visitor's IPs and linked ids, gives the cross-dimension counts

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::types::{VelocityWindowSet, VisitorEvent, WindowCounts, WindowSpec};

/// Aggregate `events` (any order, already horizon-filtered) for one visitor
pub fn aggregate(
    events: &[Arc<VisitorEvent>],
    visitor_id: &str,
    windows: &[WindowSpec],
    now: DateTime<Utc>,
) -> VelocityWindowSet {
    let now_ms = now.timestamp_millis();

    let counts = windows
        .iter()
        .map(|window| {
            let lower = now_ms - window.secs * 1000;
            let in_window: Vec<&VisitorEvent> = events
                .iter()
                .map(|e| e.as_ref())
                .filter(|e| {
                    let ts = e.timestamp_millis();
                    ts > lower && ts <= now_ms
                })
                .collect();
            count_window(&in_window, visitor_id, window)
        })
        .collect();

    VelocityWindowSet {
        visitor_id: visitor_id.to_string(),
        now,
        windows: counts,
    }
}

fn count_window(in_window: &[&VisitorEvent], visitor_id: &str, window: &WindowSpec) -> WindowCounts {
    let mut ips = HashSet::new();
    let mut linked_ids = HashSet::new();
    let mut countries = HashSet::new();
    let mut events = 0;

    for event in in_window.iter().filter(|e| e.visitor_id == visitor_id) {
        events += 1;
        if let Some(ip) = &event.ip {
            ips.insert(ip.as_str());
        }
        if let Some(linked_id) = &event.linked_id {
            linked_ids.insert(linked_id.as_str());
        }
        if let Some(country) = &event.country {
            countries.insert(country.as_str());
        }
    }

    let mut ip_events = 0;
    let mut ips_by_linked = HashSet::new();
    let mut visitors_by_linked = HashSet::new();

    if !ips.is_empty() || !linked_ids.is_empty() {
        for event in in_window {
            if event.ip.as_deref().is_some_and(|ip| ips.contains(ip)) {
                ip_events += 1;
            }
            if event
                .linked_id
                .as_deref()
                .is_some_and(|id| linked_ids.contains(id))
            {
                if let Some(ip) = &event.ip {
                    ips_by_linked.insert(ip.as_str());
                }
                visitors_by_linked.insert(event.visitor_id.as_str());
            }
        }
    }

    WindowCounts {
        name: window.name.clone(),
        duration_secs: window.secs,
        distinct_ip: ips.len(),
        distinct_linked_id: linked_ids.len(),
        distinct_country: countries.len(),
        events,
        ip_events,
        distinct_ip_by_linked_id: ips_by_linked.len(),
        distinct_visitor_by_linked_id: visitors_by_linked.len(),
    }
}
