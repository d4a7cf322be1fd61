//! Deterministic fallbacks for expert-team output
//!
//! When the team is unreachable the supervisor still owes the pilot a
//! debrief and still has to make sense of loosely structured replies.
//! These composers produce serviceable results from the deterministic
//! findings alone.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::speech::normalize_phrase;
use crate::types::{FlightDebrief, FlightPhase, RuleFinding, Severity, TeamDecision};

/// Normalize a parsed reply into a [`TeamDecision`].
///
/// Missing or empty fields degrade safely: no summary becomes a stock
/// line, an empty speak text forces `speak_now` off, and feedback is
/// capped at three items.
pub fn decision_from_value(raw_text: &str, phase: FlightPhase) -> TeamDecision {
    let Some(parsed) = extract_json_object(raw_text) else {
        return TeamDecision {
            phase,
            summary: "No structured decision.".to_string(),
            feedback_items: vec![
                "Unable to parse team output; no spoken coaching emitted.".to_string(),
            ],
            speak_now: false,
            speak_text: String::new(),
            raw_output: raw_text.to_string(),
        };
    };

    let summary = parsed
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("No summary provided.")
        .to_string();

    let mut feedback_items: Vec<String> = parsed
        .get("feedback_items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if feedback_items.is_empty() {
        feedback_items.push("No specific feedback items.".to_string());
    }
    feedback_items.truncate(3);

    let speak_text = parsed
        .get("speak_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("")
        .to_string();
    let speak_now =
        parsed.get("speak_now").and_then(Value::as_bool).unwrap_or(false) && !speak_text.is_empty();

    TeamDecision {
        phase,
        summary,
        feedback_items,
        speak_now,
        speak_text,
        raw_output: raw_text.to_string(),
    }
}

/// Pull a JSON object out of a reply that may be bare JSON, fenced in a
/// markdown block, or wrapped in prose around a brace span.
pub fn extract_json_object(raw_text: &str) -> Option<Value> {
    for candidate in json_candidates(raw_text) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

fn json_candidates(raw_text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let stripped = raw_text.trim();
    if !stripped.is_empty() {
        out.push(stripped.to_string());
    }

    // Fenced blocks: ```json ... ``` or plain ``` ... ```
    let mut rest = raw_text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        out.push(body[..close].trim().to_string());
        rest = &body[close + 3..];
    }

    if let (Some(first), Some(last)) = (raw_text.find('{'), raw_text.rfind('}')) {
        if last > first {
            out.push(raw_text[first..=last].to_string());
        }
    }

    out
}

/// Compose a debrief from the deterministic findings alone.
pub fn compose_fallback_debrief(findings: &[RuleFinding]) -> FlightDebrief {
    let findings_by_severity = count_by_severity(findings);
    let total_findings = findings.len();

    let mut key_events: Vec<String> = findings
        .iter()
        .take(3)
        .map(|f| f.message.clone())
        .collect();
    if key_events.is_empty() {
        key_events.push("No major events were captured in the debrief timeline.".to_string());
    }

    let p0 = severity_count(&findings_by_severity, Severity::P0);
    let p1 = severity_count(&findings_by_severity, Severity::P1);
    let p2 = severity_count(&findings_by_severity, Severity::P2);

    let mut strengths = Vec::new();
    if p0 == 0 {
        strengths.push("No immediate-danger events were recorded.".to_string());
    }
    if p1 <= 2 {
        strengths.push("Major deviations stayed relatively limited.".to_string());
    }
    if p2 <= 4 {
        strengths.push("Basic control consistency was generally acceptable.".to_string());
    }
    if strengths.is_empty() {
        strengths.push("Flight completed with data sufficient for targeted retraining.".to_string());
    }

    let mut improvement_items: Vec<String> = findings
        .iter()
        .take(3)
        .map(|f| f.message.clone())
        .collect();
    if improvement_items.is_empty() {
        improvement_items
            .push("Focus on stabilized profiles and smooth energy management.".to_string());
    }

    let spoken_segments = vec![
        normalize_phrase(&format!(
            "Flight complete. Total findings: {total_findings}. Danger: {p0}, major: {p1}, coaching: {p2}."
        )),
        normalize_phrase(&format!("Top issues: {}", key_events[..key_events.len().min(3)].join("; "))),
        normalize_phrase(&format!(
            "Strengths: {}. Next focus: {}",
            strengths[..strengths.len().min(2)].join("; "),
            improvement_items[..improvement_items.len().min(2)].join("; ")
        )),
    ];

    FlightDebrief {
        total_findings,
        findings_by_severity,
        key_events,
        strengths,
        improvement_items,
        spoken_segments,
    }
}

fn count_by_severity(findings: &[RuleFinding]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for severity in [Severity::P0, Severity::P1, Severity::P2] {
        counts.insert(severity.as_str().to_string(), 0);
    }
    for finding in findings {
        *counts.entry(finding.severity.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

fn severity_count(counts: &BTreeMap<String, usize>, severity: Severity) -> usize {
    counts.get(severity.as_str()).copied().unwrap_or(0)
}
