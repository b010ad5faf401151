//! Risk combiner tests

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;

use super::*;
use crate::logic::velocity::{VelocityConfig, VelocityIndex, VelocityWindowSet, VisitorEvent, WindowCounts};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0).unwrap()
}

fn quiet(visitor: &str) -> VelocityWindowSet {
    VelocityWindowSet::empty(visitor, now(), &VelocityConfig::default().windows)
}

fn set_window(set: &mut VelocityWindowSet, name: &str, edit: impl FnOnce(&mut WindowCounts)) {
    let window = set.windows.iter_mut().find(|w| w.name == name).unwrap();
    edit(window);
}

#[test]
fn test_quiet_visitor_has_no_risk() {
    let risk = combine(&quiet("v"), 0.95, &ExternalSignals::default(), None, &RiskRules::default());
    assert_eq!(risk.risk_score, 0.0);
    assert!(risk.signals.is_empty());
}

#[test]
fn test_rapid_ip_changes_from_index() {
    let index = VelocityIndex::default();
    for i in 0..5 {
        index.append(VisitorEvent::new("v1", format!("203.0.113.{}", i), now() - Duration::seconds(20 + i)));
    }
    let velocity = index.query_default("v1", now());

    let risk = combine(&velocity, 1.0, &ExternalSignals::default(), None, &RiskRules::default());
    assert!(risk.has_signal("rapid_ip_changes"));
    assert!(risk.risk_score >= 0.3);
}

#[test]
fn test_threshold_is_strict() {
    let mut velocity = quiet("v");
    set_window(&mut velocity, "5m", |w| {
        w.distinct_ip = 3;
        w.events = 50;
    });
    let risk = combine(&velocity, 1.0, &ExternalSignals::default(), None, &RiskRules::default());
    assert!(risk.signals.is_empty(), "{:?}", risk.signals);

    set_window(&mut velocity, "5m", |w| {
        w.distinct_ip = 4;
        w.events = 51;
    });
    let risk = combine(&velocity, 1.0, &ExternalSignals::default(), None, &RiskRules::default());
    assert_eq!(risk.signals, vec!["rapid_ip_changes", "high_activity"]);
    assert!((risk.risk_score - 0.5).abs() < 1e-9);
}

#[test]
fn test_mid_window_rules() {
    let mut velocity = quiet("v");
    set_window(&mut velocity, "1h", |w| {
        w.distinct_ip = 11;
        w.distinct_visitor_by_linked_id = 6;
        w.ip_events = 11 * 21;
    });

    let risk = combine(&velocity, 1.0, &ExternalSignals::default(), None, &RiskRules::default());
    assert_eq!(risk.signals, vec!["distributed_activity", "account_sharing", "ip_sharing"]);
    assert!((risk.risk_score - 0.9).abs() < 1e-9);
}

#[test]
fn test_ip_sharing_with_zero_ips_does_not_divide_by_zero() {
    let mut velocity = quiet("v");
    set_window(&mut velocity, "1h", |w| w.ip_events = 21);
    let risk = combine(&velocity, 1.0, &ExternalSignals::default(), None, &RiskRules::default());
    assert_eq!(risk.signals, vec!["ip_sharing"]);
}

#[test]
fn test_score_is_clamped() {
    let mut velocity = quiet("v");
    set_window(&mut velocity, "5m", |w| {
        w.distinct_ip = 100;
        w.events = 1000;
    });
    set_window(&mut velocity, "1h", |w| {
        w.distinct_ip = 100;
        w.distinct_visitor_by_linked_id = 100;
        w.ip_events = 100_000;
    });
    let external = ExternalSignals {
        vpn: true,
        proxy: true,
        tampering: true,
        bot: BotVerdict::Bad,
        virtual_machine: true,
        incognito: true,
        datacenter_ip: true,
    };

    let risk = combine(&velocity, 0.3, &external, None, &RiskRules::default());
    assert_eq!(risk.risk_score, 1.0);
    assert_eq!(risk.signals.len(), 13);
}

#[test]
fn test_risk_bound_random() {
    let mut rng = rand::thread_rng();
    let rules = RiskRules::default();

    for _ in 0..500 {
        let mut velocity = quiet("v");
        for window in velocity.windows.iter_mut() {
            window.distinct_ip = rng.gen_range(0..30);
            window.events = rng.gen_range(0..200);
            window.ip_events = rng.gen_range(0..2000);
            window.distinct_visitor_by_linked_id = rng.gen_range(0..20);
        }
        let external = ExternalSignals {
            vpn: rng.gen(),
            proxy: rng.gen(),
            tampering: rng.gen(),
            bot: BotVerdict::from(rng.gen::<bool>()),
            virtual_machine: rng.gen(),
            incognito: rng.gen(),
            datacenter_ip: rng.gen(),
        };

        let risk = combine(&velocity, rng.gen_range(0.0..=1.0), &external, None, &rules);
        assert!((0.0..=1.0).contains(&risk.risk_score));
    }
}

#[test]
fn test_good_bot_is_not_flagged() {
    let external = ExternalSignals {
        bot: BotVerdict::Good,
        ..Default::default()
    };
    let risk = combine(&quiet("v"), 1.0, &external, None, &RiskRules::default());
    assert!(!risk.has_signal("bot"));
}

#[test]
fn test_fingerprint_drift() {
    let rules = RiskRules::default();
    let external = ExternalSignals::default();

    assert!(combine(&quiet("v"), 0.45, &external, None, &rules).has_signal("fingerprint_drift"));
    // New device (score 0) and confident matches do not drift
    assert!(!combine(&quiet("v"), 0.0, &external, None, &rules).has_signal("fingerprint_drift"));
    assert!(!combine(&quiet("v"), 0.6, &external, None, &rules).has_signal("fingerprint_drift"));
}

#[test]
fn test_no_human_interaction() {
    let rules = RiskRules::default();
    let external = ExternalSignals::default();

    // Twelve seconds, only scrolling
    let mut idle = InteractionCounters::new(now() - Duration::seconds(12));
    idle.record(InteractionKind::Scroll, now() - Duration::seconds(3));
    let risk = combine(&quiet("v"), 1.0, &external, Some(&idle), &rules);
    assert_eq!(risk.signals, vec!["no_human_interaction"]);

    let mut active = InteractionCounters::new(now() - Duration::seconds(12));
    active.record(InteractionKind::KeyPress, now() - Duration::seconds(2));
    assert!(combine(&quiet("v"), 1.0, &external, Some(&active), &rules).signals.is_empty());

    // Session too short to judge
    let fresh = InteractionCounters::new(now() - Duration::seconds(4));
    assert!(combine(&quiet("v"), 1.0, &external, Some(&fresh), &rules).signals.is_empty());
}

#[test]
fn test_single_window_uses_it_for_both_rule_groups() {
    let mut velocity = VelocityWindowSet::empty("v", now(), &[crate::logic::velocity::WindowSpec::new("10m", 600)]);
    velocity.windows[0].distinct_ip = 12;

    let risk = combine(&velocity, 1.0, &ExternalSignals::default(), None, &RiskRules::default());
    assert_eq!(risk.signals, vec!["rapid_ip_changes", "distributed_activity"]);
}

#[test]
fn test_external_signals_from_flags() {
    let mut flags = BTreeMap::new();
    flags.insert("vpn".to_string(), SignalFlag::Bool(true));
    flags.insert("bot".to_string(), SignalFlag::Label("bad".to_string()));
    flags.insert("incognito".to_string(), SignalFlag::Label("no".to_string()));
    flags.insert("unknown_detector".to_string(), SignalFlag::Bool(true));

    let signals = ExternalSignals::from_flags(&flags);
    assert!(signals.vpn);
    assert_eq!(signals.bot, BotVerdict::Bad);
    assert!(!signals.incognito);

    let json: BTreeMap<String, SignalFlag> = serde_json::from_str(r#"{ "bot": true, "proxy": false }"#).unwrap();
    let signals = ExternalSignals::from_flags(&json);
    assert_eq!(signals.bot, BotVerdict::Bad);
    assert!(!signals.proxy);
}

#[test]
fn test_merge_keeps_set_flags() {
    let network = ExternalSignals {
        proxy: true,
        ..Default::default()
    };
    let client = ExternalSignals {
        vpn: true,
        bot: BotVerdict::Good,
        ..Default::default()
    };
    let merged = client.merge(&network);
    assert!(merged.proxy && merged.vpn);
    assert_eq!(merged.bot, BotVerdict::Good);
}

#[test]
fn test_rules_validation_and_presets() {
    assert!(RiskRules::default().validate().is_ok());
    assert!(RiskRules::high_sensitivity().validate().is_ok());
    assert!(RiskRules::low_sensitivity().validate().is_ok());
    assert!(RiskRules::high_sensitivity().rapid_ip_changes.threshold < RiskRules::default().rapid_ip_changes.threshold);

    let mut rules = RiskRules::default();
    rules.detectors.vpn = 1.5;
    assert!(rules.validate().is_err());

    let mut rules = RiskRules::default();
    rules.ip_sharing.threshold = -1.0;
    assert!(rules.validate().is_err());

    let partial: RiskRules = serde_json::from_str(r#"{ "rapid_ip_changes": { "threshold": 5, "weight": 0.5 } }"#).unwrap();
    assert_eq!(partial.rapid_ip_changes, ThresholdRule::new(5.0, 0.5));
    assert_eq!(partial.high_activity, RiskRules::default().high_activity);
}
