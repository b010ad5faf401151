//! Risk Types
//!
//! External detector flags and the combined assessment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// EXTERNAL SIGNALS
// ============================================================================

/// Bot detector verdict; accepts a label or a boolean (`true` = bad)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "SignalFlag")]
pub enum BotVerdict {
    #[default]
    NotDetected,
    /// Known good crawler
    Good,
    Bad,
}

impl From<bool> for BotVerdict {
    fn from(detected: bool) -> Self {
        if detected {
            BotVerdict::Bad
        } else {
            BotVerdict::NotDetected
        }
    }
}

impl From<SignalFlag> for BotVerdict {
    fn from(flag: SignalFlag) -> Self {
        flag.bot_verdict()
    }
}

/// Raw detector output: a boolean or a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalFlag {
    Bool(bool),
    Label(String),
}

impl SignalFlag {
    fn is_set(&self) -> bool {
        match self {
            SignalFlag::Bool(b) => *b,
            SignalFlag::Label(label) => matches!(label.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        }
    }

    fn bot_verdict(&self) -> BotVerdict {
        match self {
            SignalFlag::Bool(b) => BotVerdict::from(*b),
            SignalFlag::Label(label) => match label.trim().to_ascii_lowercase().as_str() {
                "bad" | "true" => BotVerdict::Bad,
                "good" => BotVerdict::Good,
                _ => BotVerdict::NotDetected,
            },
        }
    }
}

/// Flags from detectors outside the engine (VPN lists, bot detection, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalSignals {
    pub vpn: bool,
    pub proxy: bool,
    pub tampering: bool,
    pub bot: BotVerdict,
    pub virtual_machine: bool,
    pub incognito: bool,
    pub datacenter_ip: bool,
}

impl ExternalSignals {
    /// Build from a loose name → flag map; unknown names are ignored
    pub fn from_flags(flags: &BTreeMap<String, SignalFlag>) -> Self {
        let mut signals = Self::default();
        for (name, flag) in flags {
            match name.as_str() {
                "vpn" => signals.vpn = flag.is_set(),
                "proxy" => signals.proxy = flag.is_set(),
                "tampering" => signals.tampering = flag.is_set(),
                "bot" => signals.bot = flag.bot_verdict(),
                "virtual_machine" => signals.virtual_machine = flag.is_set(),
                "incognito" => signals.incognito = flag.is_set(),
                "datacenter_ip" => signals.datacenter_ip = flag.is_set(),
                other => log::debug!("Ignoring unknown external signal '{}'", other),
            }
        }
        signals
    }

    /// Flags set by either side stay set
    pub fn merge(mut self, other: &ExternalSignals) -> Self {
        self.vpn |= other.vpn;
        self.proxy |= other.proxy;
        self.tampering |= other.tampering;
        self.bot = self.bot.max_severity(other.bot);
        self.virtual_machine |= other.virtual_machine;
        self.incognito |= other.incognito;
        self.datacenter_ip |= other.datacenter_ip;
        self
    }
}

impl BotVerdict {
    fn severity(self) -> u8 {
        match self {
            BotVerdict::NotDetected => 0,
            BotVerdict::Good => 1,
            BotVerdict::Bad => 2,
        }
    }

    fn max_severity(self, other: BotVerdict) -> BotVerdict {
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }
}

// ============================================================================
// ASSESSMENT
// ============================================================================

/// Combined risk, with the names of every rule that fired in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// `min(1, sum of fired weights)`
    pub risk_score: f64,
    pub signals: Vec<String>,
}

impl RiskAssessment {
    pub fn has_signal(&self, name: &str) -> bool {
        self.signals.iter().any(|s| s == name)
    }
}
