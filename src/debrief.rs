//! Full-flight debrief assembly helpers
//!
//! The debrief reuses the review-window machinery over the whole session
//! buffer: long sessions are downsampled to a bounded snapshot count and
//! the window hints are augmented with flight-level context (duration,
//! phase path, urgent-alert histogram) before the expert team sees it.

use std::collections::BTreeMap;

use crate::types::{FlightPhase, FlightSnapshot};

/// Downsample to at most `max` snapshots with stride `ceil(n / max)`.
///
/// The final snapshot is always included so the window's end epoch is
/// the actual end of the flight.
pub fn downsample(snapshots: &[FlightSnapshot], max: usize) -> Vec<FlightSnapshot> {
    let n = snapshots.len();
    if max == 0 || n == 0 {
        return Vec::new();
    }
    if n <= max {
        return snapshots.to_vec();
    }

    let stride = n.div_ceil(max);
    let mut sampled: Vec<FlightSnapshot> = snapshots.iter().step_by(stride).cloned().collect();

    if let Some(last) = snapshots.last() {
        let missing_last = sampled
            .last()
            .map_or(true, |s| s.timestamp_sec != last.timestamp_sec);
        if missing_last {
            sampled.push(last.clone());
        }
    }
    sampled
}

/// Flight-level hints appended to the debrief window.
pub fn flight_hints(
    duration_sec: f64,
    phase_history: &[FlightPhase],
    alert_counts: &BTreeMap<String, u64>,
) -> Vec<String> {
    let mut hints = Vec::new();

    hints.push(format!("Flight duration {:.0} seconds.", duration_sec.max(0.0)));

    if !phase_history.is_empty() {
        let path: Vec<&str> = phase_history.iter().map(FlightPhase::as_str).collect();
        hints.push(format!("Phase path: {}.", path.join(" -> ")));
    }

    if !alert_counts.is_empty() {
        let histogram: Vec<String> = alert_counts
            .iter()
            .map(|(alert_id, count)| format!("{alert_id} x{count}"))
            .collect();
        hints.push(format!("Urgent alerts: {}.", histogram.join(", ")));
    } else {
        hints.push("No urgent alerts were raised this flight.".to_string());
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshots(n: usize) -> Vec<FlightSnapshot> {
        (0..n)
            .map(|i| FlightSnapshot {
                timestamp_sec: i as f64,
                ..FlightSnapshot::default()
            })
            .collect()
    }

    #[test]
    fn short_sessions_pass_through() {
        let snaps = snapshots(100);
        assert_eq!(downsample(&snaps, 1_800).len(), 100);
    }

    #[test]
    fn long_sessions_are_strided_and_keep_the_last() {
        let snaps = snapshots(4_000);
        let sampled = downsample(&snaps, 1_800);

        // stride = ceil(4000/1800) = 3 -> 1334 samples, plus the final one.
        assert!(sampled.len() <= 1_800);
        assert_eq!(sampled[0].timestamp_sec, 0.0);
        assert_eq!(sampled.last().unwrap().timestamp_sec, 3_999.0);
    }

    #[test]
    fn hints_describe_path_and_alert_histogram() {
        let phases = vec![
            FlightPhase::Preflight,
            FlightPhase::TaxiOut,
            FlightPhase::Takeoff,
        ];
        let mut counts = BTreeMap::new();
        counts.insert("pull_up_now".to_string(), 2u64);

        let hints = flight_hints(1_834.2, &phases, &counts);
        assert!(hints[0].contains("1834 seconds"));
        assert!(hints[1].contains("preflight -> taxi_out -> takeoff"));
        assert!(hints[2].contains("pull_up_now x2"));
    }

    #[test]
    fn quiet_flight_notes_absence_of_alerts() {
        let hints = flight_hints(60.0, &[], &BTreeMap::new());
        assert!(hints.iter().any(|h| h.contains("No urgent alerts")));
    }
}
