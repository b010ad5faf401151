//! Risk Combiner
//!
//! Pure function: velocity aggregates + match score + external flags +
//! session behavior → risk score in [0, 1] and the fired rule names.

use super::behavior::InteractionCounters;
use super::rules::RiskRules;
use super::types::{BotVerdict, ExternalSignals, RiskAssessment};
use crate::logic::velocity::VelocityWindowSet;

// ============================================================================
// MAIN COMBINE FUNCTION
// ============================================================================

/// Evaluate every rule; `risk_score = min(1, sum of fired weights)`.
///
/// Velocity rules read the shortest window and the mid window of `velocity`.
/// `behavior` is optional; without it the interaction rule never fires.
pub fn combine(
    velocity: &VelocityWindowSet,
    match_score: f64,
    external: &ExternalSignals,
    behavior: Option<&InteractionCounters>,
    rules: &RiskRules,
) -> RiskAssessment {
    let mut acc = Accumulator::default();

    // Velocity
    if let Some(short) = velocity.shortest() {
        acc.check("rapid_ip_changes", rules.rapid_ip_changes.fires(short.distinct_ip as f64), rules.rapid_ip_changes.weight);
        acc.check("high_activity", rules.high_activity.fires(short.events as f64), rules.high_activity.weight);
    }
    if let Some(mid) = velocity.mid() {
        acc.check(
            "distributed_activity",
            rules.distributed_activity.fires(mid.distinct_ip as f64),
            rules.distributed_activity.weight,
        );
        acc.check(
            "account_sharing",
            rules.account_sharing.fires(mid.distinct_visitor_by_linked_id as f64),
            rules.account_sharing.weight,
        );
        let per_ip = mid.ip_events as f64 / mid.distinct_ip.max(1) as f64;
        acc.check("ip_sharing", rules.ip_sharing.fires(per_ip), rules.ip_sharing.weight);
    }

    // External detectors
    let weights = &rules.detectors;
    acc.check("vpn", external.vpn, weights.vpn);
    acc.check("proxy", external.proxy, weights.proxy);
    acc.check("tampering", external.tampering, weights.tampering);
    acc.check("bot", external.bot == BotVerdict::Bad, weights.bot);
    acc.check("virtual_machine", external.virtual_machine, weights.virtual_machine);
    acc.check("incognito", external.incognito, weights.incognito);
    acc.check("datacenter_ip", external.datacenter_ip, weights.datacenter_ip);

    // Match drift
    let drift = &rules.fingerprint_drift;
    acc.check(
        "fingerprint_drift",
        match_score > 0.0 && match_score < drift.ceiling,
        drift.weight,
    );

    // Behavior
    if let Some(counters) = behavior {
        let rule = &rules.no_human_interaction;
        let idle = counters.session_secs(velocity.now) >= rule.min_session_secs && counters.human_interactions() == 0;
        acc.check("no_human_interaction", idle, rule.weight);
    }

    acc.finish()
}

// ============================================================================
// HELPERS
// ============================================================================

#[derive(Default)]
struct Accumulator {
    sum: f64,
    signals: Vec<String>,
}

impl Accumulator {
    fn check(&mut self, name: &str, fired: bool, weight: f64) {
        if fired {
            self.sum += weight;
            self.signals.push(name.to_string());
        }
    }

    fn finish(self) -> RiskAssessment {
        RiskAssessment {
            risk_score: self.sum.clamp(0.0, 1.0),
            signals: self.signals,
        }
    }
}
