//! Session and hazard profiles
//!
//! The hazard profile is swapped by replacement at runtime when the
//! expert team refreshes speech variants; the monitor reads the active
//! profile at the start of each evaluation and never mutates it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// The six urgent hazard rules, in dispatch order.
pub const HAZARD_RULE_IDS: [&str; 6] = [
    "stall_or_low_speed",
    "excessive_sink_low_alt",
    "high_bank_low_alt",
    "pull_up_now",
    "unstable_approach_fast_or_sink",
    "excessive_taxi_speed",
];

/// Hazard-rule configuration: which rules run, numeric thresholds, and
/// per-rule spoken phrase variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardProfile {
    /// Rules allowed to fire. Defaults to all known rules.
    #[serde(default = "default_enabled_rules")]
    pub enabled_rules: HashSet<String>,
    /// Named threshold overrides; missing keys fall back to the rule's
    /// literal default.
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    /// Spoken phrase variants per rule id, rotated so no two adjacent
    /// utterances of the same rule are identical.
    #[serde(default)]
    pub speech_variants: BTreeMap<String, Vec<String>>,
}

fn default_enabled_rules() -> HashSet<String> {
    HAZARD_RULE_IDS.iter().map(|s| (*s).to_string()).collect()
}

impl Default for HazardProfile {
    fn default() -> Self {
        Self {
            enabled_rules: default_enabled_rules(),
            thresholds: BTreeMap::new(),
            speech_variants: BTreeMap::new(),
        }
    }
}

impl HazardProfile {
    pub fn is_enabled(&self, rule_id: &str) -> bool {
        self.enabled_rules.contains(rule_id)
    }

    /// Threshold by name, falling back to the caller's literal default.
    pub fn threshold(&self, name: &str, fallback: f64) -> f64 {
        self.thresholds
            .get(name)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(fallback)
    }
}

/// Per-session aircraft context, produced once during bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProfile {
    /// ICAO type designator, e.g. "C172".
    pub aircraft_icao: String,
    /// Coarse category, e.g. "single_engine_piston".
    pub category: String,
    /// Bootstrap confidence in [0, 1].
    pub confidence: f64,
    /// Assumptions the bootstrap made when telemetry was thin.
    pub assumptions: Vec<String>,
    /// Spoken once on the non-urgent channel at startup.
    pub welcome_message: String,
    pub hazard_profile: HazardProfile,
}

impl Default for SessionProfile {
    /// The degraded-bootstrap default: a C172 trainer profile with
    /// baseline thresholds.
    fn default() -> Self {
        Self {
            aircraft_icao: "C172".to_string(),
            category: "single_engine_piston".to_string(),
            confidence: 0.3,
            assumptions: vec![
                "Expert bootstrap unavailable; assuming a primary GA trainer.".to_string(),
            ],
            welcome_message:
                "Your instructor is on board. Fly the aircraft; I will call out what matters."
                    .to_string(),
            hazard_profile: HazardProfile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_enables_all_rules() {
        let profile = HazardProfile::default();
        for rule in HAZARD_RULE_IDS {
            assert!(profile.is_enabled(rule), "{rule} should default enabled");
        }
    }

    #[test]
    fn threshold_falls_back_on_missing_or_nonfinite() {
        let mut profile = HazardProfile::default();
        assert_eq!(profile.threshold("low_airspeed_kt", 50.0), 50.0);

        profile.thresholds.insert("low_airspeed_kt".to_string(), 55.0);
        assert_eq!(profile.threshold("low_airspeed_kt", 50.0), 55.0);

        profile.thresholds.insert("bad".to_string(), f64::NAN);
        assert_eq!(profile.threshold("bad", 1.0), 1.0);
    }
}
