//! Risk Rules & Weights
//!
//! Thresholds and weights for the risk combiner.
//! Configuration only; evaluation lives in `combiner.rs`.

use serde::{Deserialize, Serialize};

use crate::logic::config::ConfigError;

// ============================================================================
// VELOCITY RULES
// ============================================================================

/// Distinct IPs in the shortest window
pub const RAPID_IP_CHANGES_THRESHOLD: f64 = 3.0;
pub const RAPID_IP_CHANGES_WEIGHT: f64 = 0.3;

/// Events in the shortest window
pub const HIGH_ACTIVITY_THRESHOLD: f64 = 50.0;
pub const HIGH_ACTIVITY_WEIGHT: f64 = 0.2;

/// Distinct IPs in the mid window
pub const DISTRIBUTED_ACTIVITY_THRESHOLD: f64 = 10.0;
pub const DISTRIBUTED_ACTIVITY_WEIGHT: f64 = 0.4;

/// Distinct visitors per linked id in the mid window
pub const ACCOUNT_SHARING_THRESHOLD: f64 = 5.0;
pub const ACCOUNT_SHARING_WEIGHT: f64 = 0.3;

/// Events per IP in the mid window
pub const IP_SHARING_THRESHOLD: f64 = 20.0;
pub const IP_SHARING_WEIGHT: f64 = 0.2;

// ============================================================================
// EXTERNAL DETECTORS
// ============================================================================

pub const VPN_WEIGHT: f64 = 0.2;
pub const PROXY_WEIGHT: f64 = 0.2;
pub const TAMPERING_WEIGHT: f64 = 0.3;
pub const BOT_WEIGHT: f64 = 0.4;
pub const VIRTUAL_MACHINE_WEIGHT: f64 = 0.1;
pub const INCOGNITO_WEIGHT: f64 = 0.1;
pub const DATACENTER_IP_WEIGHT: f64 = 0.2;

// ============================================================================
// MATCH & BEHAVIOR
// ============================================================================

/// A returning device that matched below this score has drifted
pub const FINGERPRINT_DRIFT_CEILING: f64 = 0.6;
pub const FINGERPRINT_DRIFT_WEIGHT: f64 = 0.1;

/// Sessions at least this long with no pointer/key input look scripted
pub const NO_INTERACTION_MIN_SESSION_SECS: i64 = 10;
pub const NO_INTERACTION_WEIGHT: f64 = 0.2;

// ============================================================================
// CONFIGURABLE RULES
// ============================================================================

/// Fires when the observed value is strictly above `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub threshold: f64,
    pub weight: f64,
}

impl ThresholdRule {
    pub const fn new(threshold: f64, weight: f64) -> Self {
        Self { threshold, weight }
    }

    pub fn fires(&self, value: f64) -> bool {
        value > self.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftRule {
    /// Exclusive upper bound on the match score
    pub ceiling: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    pub min_session_secs: i64,
    pub weight: f64,
}

/// Weights of the boolean external detectors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorWeights {
    pub vpn: f64,
    pub proxy: f64,
    pub tampering: f64,
    pub bot: f64,
    pub virtual_machine: f64,
    pub incognito: f64,
    pub datacenter_ip: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            vpn: VPN_WEIGHT,
            proxy: PROXY_WEIGHT,
            tampering: TAMPERING_WEIGHT,
            bot: BOT_WEIGHT,
            virtual_machine: VIRTUAL_MACHINE_WEIGHT,
            incognito: INCOGNITO_WEIGHT,
            datacenter_ip: DATACENTER_IP_WEIGHT,
        }
    }
}

impl DetectorWeights {
    fn entries(&self) -> [(&'static str, f64); 7] {
        [
            ("vpn", self.vpn),
            ("proxy", self.proxy),
            ("tampering", self.tampering),
            ("bot", self.bot),
            ("virtual_machine", self.virtual_machine),
            ("incognito", self.incognito),
            ("datacenter_ip", self.datacenter_ip),
        ]
    }
}

/// Every rule of the combiner (runtime adjustable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRules {
    pub rapid_ip_changes: ThresholdRule,
    pub high_activity: ThresholdRule,
    pub distributed_activity: ThresholdRule,
    pub account_sharing: ThresholdRule,
    pub ip_sharing: ThresholdRule,
    pub detectors: DetectorWeights,
    pub fingerprint_drift: DriftRule,
    pub no_human_interaction: InteractionRule,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            rapid_ip_changes: ThresholdRule::new(RAPID_IP_CHANGES_THRESHOLD, RAPID_IP_CHANGES_WEIGHT),
            high_activity: ThresholdRule::new(HIGH_ACTIVITY_THRESHOLD, HIGH_ACTIVITY_WEIGHT),
            distributed_activity: ThresholdRule::new(DISTRIBUTED_ACTIVITY_THRESHOLD, DISTRIBUTED_ACTIVITY_WEIGHT),
            account_sharing: ThresholdRule::new(ACCOUNT_SHARING_THRESHOLD, ACCOUNT_SHARING_WEIGHT),
            ip_sharing: ThresholdRule::new(IP_SHARING_THRESHOLD, IP_SHARING_WEIGHT),
            detectors: DetectorWeights::default(),
            fingerprint_drift: DriftRule {
                ceiling: FINGERPRINT_DRIFT_CEILING,
                weight: FINGERPRINT_DRIFT_WEIGHT,
            },
            no_human_interaction: InteractionRule {
                min_session_secs: NO_INTERACTION_MIN_SESSION_SECS,
                weight: NO_INTERACTION_WEIGHT,
            },
        }
    }
}

impl RiskRules {
    /// High sensitivity: fires earlier on velocity
    pub fn high_sensitivity() -> Self {
        let defaults = Self::default();
        Self {
            rapid_ip_changes: ThresholdRule::new(2.0, defaults.rapid_ip_changes.weight),
            high_activity: ThresholdRule::new(30.0, defaults.high_activity.weight),
            distributed_activity: ThresholdRule::new(6.0, defaults.distributed_activity.weight),
            account_sharing: ThresholdRule::new(3.0, defaults.account_sharing.weight),
            ip_sharing: ThresholdRule::new(10.0, defaults.ip_sharing.weight),
            ..defaults
        }
    }

    /// Low sensitivity: tolerant of shared networks (campus, carrier NAT)
    pub fn low_sensitivity() -> Self {
        let defaults = Self::default();
        Self {
            rapid_ip_changes: ThresholdRule::new(5.0, defaults.rapid_ip_changes.weight),
            high_activity: ThresholdRule::new(100.0, defaults.high_activity.weight),
            distributed_activity: ThresholdRule::new(20.0, defaults.distributed_activity.weight),
            account_sharing: ThresholdRule::new(10.0, defaults.account_sharing.weight),
            ip_sharing: ThresholdRule::new(50.0, defaults.ip_sharing.weight),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |rule: &str, reason: String| {
            Err(ConfigError::InvalidRiskRule {
                rule: rule.to_string(),
                reason,
            })
        };
        let weight_ok = |w: f64| w.is_finite() && (0.0..=1.0).contains(&w);

        let velocity = [
            ("rapid_ip_changes", &self.rapid_ip_changes),
            ("high_activity", &self.high_activity),
            ("distributed_activity", &self.distributed_activity),
            ("account_sharing", &self.account_sharing),
            ("ip_sharing", &self.ip_sharing),
        ];
        for (name, rule) in velocity {
            if !rule.threshold.is_finite() || rule.threshold < 0.0 {
                return invalid(name, format!("threshold must be non-negative, got {}", rule.threshold));
            }
            if !weight_ok(rule.weight) {
                return invalid(name, format!("weight must be within [0, 1], got {}", rule.weight));
            }
        }

        for (name, weight) in self.detectors.entries() {
            if !weight_ok(weight) {
                return invalid(name, format!("weight must be within [0, 1], got {}", weight));
            }
        }

        let drift = &self.fingerprint_drift;
        if !weight_ok(drift.ceiling) {
            return invalid("fingerprint_drift", format!("ceiling must be within [0, 1], got {}", drift.ceiling));
        }
        if !weight_ok(drift.weight) {
            return invalid("fingerprint_drift", format!("weight must be within [0, 1], got {}", drift.weight));
        }

        let interaction = &self.no_human_interaction;
        if interaction.min_session_secs <= 0 {
            return invalid(
                "no_human_interaction",
                format!("min_session_secs must be positive, got {}", interaction.min_session_secs),
            );
        }
        if !weight_ok(interaction.weight) {
            return invalid(
                "no_human_interaction",
                format!("weight must be within [0, 1], got {}", interaction.weight),
            );
        }
        Ok(())
    }
}
