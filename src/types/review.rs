//! Review windows, expert-team decisions, and flight debriefs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::FlightPhase;

/// Aggregate metrics over one review window.
///
/// Absent telemetry contributes nothing; a metric over an empty series
/// reports zero, matching what the expert team expects for early windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewMetrics {
    pub ias_min_kt: f64,
    pub ias_max_kt: f64,
    pub ias_mean_kt: f64,
    pub vs_min_fpm: f64,
    pub vs_max_fpm: f64,
    pub vs_mean_fpm: f64,
    pub roll_abs_max_deg: f64,
    pub agl_min_ft: f64,
    pub agl_max_ft: f64,
}

/// A summarized time slice of flight handed to the expert team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewWindow {
    pub start_epoch: f64,
    pub end_epoch: f64,
    pub phase: FlightPhase,
    pub sample_count: usize,
    pub metrics: ReviewMetrics,
    /// Short deterministic observations to steer the expert team.
    pub event_hints: Vec<String>,
}

/// The expert team's verdict for one review window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDecision {
    pub phase: FlightPhase,
    pub summary: String,
    pub feedback_items: Vec<String>,
    /// Whether the team wants the coaching spoken this tick.
    pub speak_now: bool,
    pub speak_text: String,
    /// Unparsed master output, kept for the transcript journal.
    #[serde(default)]
    pub raw_output: String,
}

/// Post-flight debrief assembled after shutdown confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightDebrief {
    pub total_findings: usize,
    /// Finding counts keyed by severity name ("P0"/"P1"/"P2").
    pub findings_by_severity: BTreeMap<String, usize>,
    pub key_events: Vec<String>,
    pub strengths: Vec<String>,
    pub improvement_items: Vec<String>,
    /// Exactly three spoken segments.
    pub spoken_segments: Vec<String>,
}
