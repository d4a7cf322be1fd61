//! Append-only JSONL journals
//!
//! The event journal is the truth of side effects: every speech decision,
//! suppression, phase change, and shutdown detection produces a record
//! before (or immediately after) any external call. Writes flush per
//! event so a crashed supervisor leaves a complete trail.

use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Journal I/O error for {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Seconds since the Unix epoch, as the journals record time.
pub fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// One append-only JSONL file.
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating parent directories on first write.
    pub fn write(&self, payload: &Value) -> Result<(), JournalError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| JournalError::Io(self.path.clone(), e))?;
            }
        }

        let line = serde_json::to_string(payload)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| JournalError::Io(self.path.clone(), e))?;
        writeln!(file, "{line}").map_err(|e| JournalError::Io(self.path.clone(), e))?;
        file.flush()
            .map_err(|e| JournalError::Io(self.path.clone(), e))
    }

    /// Append an event record `{ts, event, ...fields}`.
    ///
    /// Journal failures are logged, never propagated: a full disk must
    /// not take down the tick loop.
    pub fn event(&self, event: &str, fields: Value) {
        let mut payload = json!({
            "ts": epoch_now(),
            "event": event,
        });
        if let (Some(obj), Some(extra)) = (payload.as_object_mut(), fields.as_object()) {
            for (key, value) in extra {
                obj.insert(key.clone(), value.clone());
            }
        }
        if let Err(e) = self.write(&payload) {
            warn!(error = %e, event = event, "Journal write failed");
        }
    }
}

/// Optional counter journal: `{ts, metric, value, attrs}` records.
pub struct TelemetryCollector {
    enabled: bool,
    journal: JsonlJournal,
}

impl TelemetryCollector {
    pub fn new(enabled: bool, journal: JsonlJournal) -> Self {
        Self { enabled, journal }
    }

    pub fn emit(&self, metric: &str, value: f64, attrs: Value) {
        if !self.enabled {
            return;
        }
        let payload = json!({
            "ts": epoch_now(),
            "metric": metric,
            "value": value,
            "attrs": attrs,
        });
        if let Err(e) = self.journal.write(&payload) {
            warn!(error = %e, metric = metric, "Telemetry journal write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_append_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let journal = JsonlJournal::new(&path);

        journal.event("phase_change", json!({"phase": "takeoff"}));
        journal.event("hazard_alert", json!({"alert_id": "pull_up_now"}));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "phase_change");
        assert_eq!(first["phase"], "takeoff");
        assert!(first["ts"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn disabled_collector_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");

        let collector = TelemetryCollector::new(false, JsonlJournal::new(&path));
        collector.emit("urgent_alert_spoken", 1.0, json!({}));
        assert!(!path.exists());

        let collector = TelemetryCollector::new(true, JsonlJournal::new(&path));
        collector.emit("urgent_alert_spoken", 1.0, json!({"alert_id": "x"}));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
