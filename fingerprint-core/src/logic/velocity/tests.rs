//! Velocity index tests

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;

use super::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
}

fn ago(secs: i64) -> DateTime<Utc> {
    now() - Duration::seconds(secs)
}

fn index() -> VelocityIndex {
    VelocityIndex::new(VelocityConfig {
        segment_size: 4,
        ..Default::default()
    })
}

fn windows() -> Vec<WindowSpec> {
    VelocityConfig::default().windows
}

fn counts<'a>(set: &'a VelocityWindowSet, name: &str) -> &'a WindowCounts {
    set.get(name).unwrap()
}

#[test]
fn test_five_distinct_ips_in_five_minutes() {
    let index = index();
    for i in 0..5 {
        index.append(VisitorEvent::new("v1", format!("10.0.0.{}", i), ago(30 + i)));
    }

    let set = index.query("v1", &windows(), now());
    assert_eq!(counts(&set, "5m").distinct_ip, 5);
    assert_eq!(counts(&set, "5m").events, 5);
}

#[test]
fn test_window_edges() {
    let index = index();
    // Exactly 5 minutes old: outside (ts > now - w); at now: inside
    index.append(VisitorEvent::new("v", "1.1.1.1", ago(300)));
    index.append(VisitorEvent::new("v", "2.2.2.2", now()));
    // Future events are not counted
    index.append(VisitorEvent::new("v", "3.3.3.3", now() + Duration::seconds(5)));

    let set = index.query("v", &windows(), now());
    assert_eq!(counts(&set, "5m").distinct_ip, 1);
    assert_eq!(counts(&set, "1h").distinct_ip, 2);
}

#[test]
fn test_malformed_events_rejected() {
    let index = index();

    let missing_ts = IncomingEvent {
        visitor_id: Some("v".into()),
        ip: Some("1.2.3.4".into()),
        ..Default::default()
    };
    assert_eq!(
        index.record(missing_ts),
        Err(VelocityError::MalformedEvent("missing timestamp"))
    );

    let blank_visitor = IncomingEvent {
        visitor_id: Some("   ".into()),
        timestamp: Some(ago(1)),
        ..Default::default()
    };
    assert!(index.record(blank_visitor).is_err());

    assert_eq!(index.len(), 0);
    let set = index.query("v", &windows(), now());
    assert_eq!(counts(&set, "24h").events, 0);
}

#[test]
fn test_incoming_event_normalization() {
    let event = VisitorEvent::try_from(IncomingEvent {
        visitor_id: Some(" v ".into()),
        ip: Some("".into()),
        country: Some("de".into()),
        timestamp: Some(now()),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(event.visitor_id, "v");
    assert_eq!(event.ip, None);
    assert_eq!(event.country.as_deref(), Some("DE"));
}

#[test]
fn test_zero_linked_ids_give_zero() {
    let index = index();
    index.append(VisitorEvent::new("v", "1.1.1.1", ago(10)));
    index.append(VisitorEvent::new("other", "9.9.9.9", ago(10)).with_linked_id("acct"));

    let set = index.query("v", &windows(), now());
    for window in &set.windows {
        assert_eq!(window.distinct_linked_id, 0);
        assert_eq!(window.distinct_ip_by_linked_id, 0);
        assert_eq!(window.distinct_visitor_by_linked_id, 0);
    }
}

#[test]
fn test_cross_dimension_aggregates() {
    let index = index();

    // Six visitors share one account
    for i in 0..6 {
        index.append(
            VisitorEvent::new(format!("v{}", i), format!("10.1.0.{}", i), ago(600)).with_linked_id("acct-1"),
        );
    }
    // Busy shared IP used by v0 and strangers
    for i in 0..25 {
        index.append(VisitorEvent::new(format!("x{}", i), "10.1.0.0", ago(700)));
    }
    index.append(VisitorEvent::new("v0", "10.1.0.0", ago(100)).with_country("FR"));

    let set = index.query("v0", &windows(), now());
    let hour = counts(&set, "1h");
    assert_eq!(hour.distinct_visitor_by_linked_id, 6);
    assert_eq!(hour.distinct_ip_by_linked_id, 6);
    assert_eq!(hour.distinct_linked_id, 1);
    assert_eq!(hour.distinct_country, 1);
    // 2 own events + 25 strangers on the same IP
    assert_eq!(hour.ip_events, 27);

    let five = counts(&set, "5m");
    assert_eq!(five.events, 1);
    assert_eq!(five.ip_events, 1);
    assert_eq!(five.distinct_visitor_by_linked_id, 0);
}

#[test]
fn test_unknown_visitor_is_empty_not_error() {
    let set = index().query("nobody", &windows(), now());
    assert_eq!(set.windows.len(), 3);
    assert!(set.windows.iter().all(|w| *w == WindowCounts {
        name: w.name.clone(),
        duration_secs: w.duration_secs,
        ..Default::default()
    }));
}

#[test]
fn test_window_monotonicity_random() {
    let mut rng = rand::thread_rng();
    let index = index();
    let visitors = ["a", "b", "c"];

    for _ in 0..2_000 {
        let mut event = VisitorEvent::new(
            visitors[rng.gen_range(0..visitors.len())],
            format!("10.0.{}.{}", rng.gen_range(0..4), rng.gen_range(0..8)),
            ago(rng.gen_range(0..2 * 86_400)),
        );
        if rng.gen_bool(0.5) {
            event = event.with_linked_id(format!("acct-{}", rng.gen_range(0..5)));
        }
        if rng.gen_bool(0.7) {
            event = event.with_country(["US", "DE", "VN"][rng.gen_range(0..3)]);
        }
        index.append(event);
    }

    for visitor in visitors {
        let set = index.query(visitor, &windows(), now());
        for pair in set.windows.windows(2) {
            let (narrow, wide) = (&pair[0], &pair[1]);
            assert!(wide.distinct_ip >= narrow.distinct_ip);
            assert!(wide.distinct_linked_id >= narrow.distinct_linked_id);
            assert!(wide.distinct_country >= narrow.distinct_country);
            assert!(wide.events >= narrow.events);
            assert!(wide.ip_events >= narrow.ip_events);
            assert!(wide.distinct_ip_by_linked_id >= narrow.distinct_ip_by_linked_id);
            assert!(wide.distinct_visitor_by_linked_id >= narrow.distinct_visitor_by_linked_id);
        }
    }
}

#[test]
fn test_compaction_preserves_queries_within_retention() {
    let index = index();
    for i in 0..200 {
        let event = VisitorEvent::new(format!("v{}", i % 3), format!("10.0.0.{}", i % 17), ago(i * 900))
            .with_linked_id(format!("acct-{}", i % 4));
        index.append(event);
    }

    let before: Vec<_> = ["v0", "v1", "v2"]
        .iter()
        .map(|v| index.query(v, &windows(), now()))
        .collect();

    let removed = index.compact(now(), Duration::hours(24));
    assert!(removed > 0);

    let after: Vec<_> = ["v0", "v1", "v2"]
        .iter()
        .map(|v| index.query(v, &windows(), now()))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_compacted_events_never_reappear() {
    let index = index();
    index.append(VisitorEvent::new("v", "1.1.1.1", ago(7200)));
    index.append(VisitorEvent::new("v", "2.2.2.2", ago(60)));

    index.compact(now(), Duration::hours(1));
    assert_eq!(index.len(), 1);

    // Late arrival behind the horizon is dropped
    index.append(VisitorEvent::new("v", "3.3.3.3", ago(7000)));

    // Even a query with a wide window and an earlier `now` cannot see them
    let wide = vec![WindowSpec::new("48h", 48 * 3600)];
    let set = index.query("v", &wide, now());
    assert_eq!(set.windows[0].distinct_ip, 1);
    let set = index.query("v", &wide, ago(3600));
    assert_eq!(set.windows[0].events, 0);

    assert!(index.stats().horizon.is_some());
}

#[test]
fn test_eager_compaction_bounds_memory() {
    let index = VelocityIndex::new(VelocityConfig {
        max_events: 100,
        segment_size: 10,
        ..Default::default()
    });

    // Old events are eagerly compacted as soon as the bound is crossed
    for i in 0..150 {
        index.append(VisitorEvent::new("old", "1.1.1.1", ago(10 * 86_400 + i)));
    }
    for i in 0..50 {
        index.append(VisitorEvent::new("new", "2.2.2.2", ago(i)));
    }
    assert!(index.len() <= 100, "live = {}", index.len());

    // All in-window: oldest segments are dropped to stay bounded
    for i in 0..500 {
        index.append(VisitorEvent::new("burst", format!("3.3.{}.{}", i / 256, i % 256), ago(10)));
        assert!(index.len() <= 100, "live = {}", index.len());
    }
}

#[test]
fn test_concurrent_record_query_compact() {
    let index = Arc::new(VelocityIndex::new(VelocityConfig {
        segment_size: 16,
        ..Default::default()
    }));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let index = index.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    index.append(VisitorEvent::new(format!("v{}", w), format!("10.0.{}.{}", w, i % 50), ago(i % 7200)));
                }
            })
        })
        .collect();

    let compactor = {
        let index = index.clone();
        std::thread::spawn(move || {
            for _ in 0..50 {
                index.compact(now(), Duration::hours(1));
            }
        })
    };

    let reader = {
        let index = index.clone();
        std::thread::spawn(move || {
            for _ in 0..200 {
                let set = index.query("v0", &windows(), now());
                assert!(counts(&set, "24h").events >= counts(&set, "5m").events);
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    compactor.join().unwrap();
    reader.join().unwrap();

    index.compact(now(), Duration::hours(1));
    let set = index.query("v0", &windows(), now());
    // v0 wrote every timestamp in the last hour at least once
    assert!(counts(&set, "1h").events > 0);
    assert_eq!(counts(&set, "24h").events, counts(&set, "1h").events);

    // Live count matches what is actually stored
    let visible: usize = (0..4)
        .map(|w| counts(&index.query(&format!("v{}", w), &windows(), now()), "24h").events)
        .sum();
    assert_eq!(index.len(), visible);
    assert_eq!(index.stats().live_events, visible);
}

#[test]
fn test_config_validation() {
    assert!(VelocityConfig::default().validate().is_ok());

    let unordered = VelocityConfig {
        windows: vec![WindowSpec::new("1h", 3600), WindowSpec::new("5m", 300)],
        ..Default::default()
    };
    assert!(unordered.validate().is_err());

    let short_retention = VelocityConfig {
        retention_secs: 60,
        ..Default::default()
    };
    assert!(short_retention.validate().is_err());

    let empty = VelocityConfig {
        windows: vec![],
        ..Default::default()
    };
    assert!(empty.validate().is_err());
}

#[test]
fn test_window_set_accessors() {
    let set = index().query("v", &windows(), now());
    assert_eq!(set.shortest().unwrap().name, "5m");
    assert_eq!(set.mid().unwrap().name, "1h");
    assert_eq!(set.longest().unwrap().name, "24h");

    let single = index().query("v", &[WindowSpec::new("10m", 600)], now());
    assert_eq!(single.mid().unwrap().name, "10m");
}

#[tokio::test]
async fn test_background_compactor() {
    let index = Arc::new(VelocityIndex::default());
    let stale = Utc::now() - Duration::days(3);
    index.append(VisitorEvent::new("v", "1.1.1.1", stale));
    index.append(VisitorEvent::new("v", "2.2.2.2", Utc::now()));

    let handle = spawn_compactor(index.clone(), std::time::Duration::from_millis(10), Duration::hours(24));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    handle.abort();

    assert_eq!(index.len(), 1);
}
