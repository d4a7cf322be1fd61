//! Hazard alerts (urgent channel) and rule findings (P0/P1/P2)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::MonitorPhase;

/// Urgency class of a hazard alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => f.write_str("warning"),
            AlertSeverity::Critical => f.write_str("critical"),
        }
    }
}

/// One urgent hazard callout, produced per tick and consumed immediately
/// by the speech sink. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardAlert {
    /// Stable key; also the per-key cooldown key in the speech sink.
    pub alert_id: String,
    pub severity: AlertSeverity,
    /// Short operational description for the journal.
    pub message: String,
    /// The exact phrase handed to the speech sink.
    pub speak_text: String,
    pub cooldown_sec: f64,
    pub triggered_at_epoch: f64,
}

/// Severity classes for rule findings.
///
/// P0 = immediate danger, P1 = major deviation, P2 = coaching observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    P0,
    P1,
    P2,
}

impl Severity {
    /// Default dispatch cooldown for findings of this severity.
    pub fn default_cooldown_sec(&self) -> f64 {
        match self {
            Severity::P0 => 3.0,
            Severity::P1 => 8.0,
            Severity::P2 => 12.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::P0 => "P0",
            Severity::P1 => "P1",
            Severity::P2 => "P2",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule-engine finding, appended to the session findings list and
/// consumed by the debrief builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFinding {
    pub rule_id: String,
    pub severity: Severity,
    pub phase: MonitorPhase,
    pub message: String,
    /// Free-form supporting values (measured thresholds, deltas).
    /// BTreeMap keeps journal output deterministic.
    pub evidence: BTreeMap<String, Value>,
    pub timestamp_epoch: f64,
    pub cooldown_sec: f64,
}

impl RuleFinding {
    pub fn new(
        rule_id: &str,
        severity: Severity,
        phase: MonitorPhase,
        message: &str,
        timestamp_epoch: f64,
        evidence: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            phase,
            message: message.to_string(),
            evidence,
            timestamp_epoch,
            cooldown_sec: severity.default_cooldown_sec(),
        }
    }
}
