//! Review-window aggregation
//!
//! Folds a time slice of snapshots into the metric summary and heuristic
//! hints the expert team reasons over. The builder learns the field
//! elevation the same way the telemetry path does, so AGL metrics stay
//! consistent across review ticks.

use thiserror::Error;

use crate::config::defaults::FIELD_ELEVATION_MAX_GS_KT;
use crate::types::{FlightPhase, FlightSnapshot, ReviewMetrics, ReviewWindow};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Cannot build a review window from an empty snapshot list")]
    EmptyWindow,
}

/// Builds [`ReviewWindow`]s, learning field elevation across calls.
#[derive(Debug, Default)]
pub struct ReviewWindowBuilder {
    field_elevation_m: Option<f64>,
}

impl ReviewWindowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the learned elevation when a new flight cycle starts.
    pub fn reset(&mut self) {
        self.field_elevation_m = None;
    }

    /// Aggregate `snapshots` (oldest first) into one window.
    pub fn build(
        &mut self,
        snapshots: &[FlightSnapshot],
        phase: FlightPhase,
    ) -> Result<ReviewWindow, ReviewError> {
        let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
            return Err(ReviewError::EmptyWindow);
        };

        for snapshot in snapshots {
            if snapshot.on_ground
                && snapshot.groundspeed_kt_or_zero() < FIELD_ELEVATION_MAX_GS_KT
            {
                if let Some(elevation) = snapshot.elevation_m {
                    self.field_elevation_m = Some(elevation);
                }
            }
        }

        let ias = series(snapshots, |s| s.indicated_airspeed_kt);
        let vs = series(snapshots, |s| s.vertical_speed_fpm);
        let roll = series(snapshots, |s| s.roll_deg.map(f64::abs));
        let agl = series(snapshots, |s| s.agl_ft(self.field_elevation_m));

        let metrics = ReviewMetrics {
            ias_min_kt: min_of(&ias),
            ias_max_kt: max_of(&ias),
            ias_mean_kt: mean_of(&ias),
            vs_min_fpm: min_of(&vs),
            vs_max_fpm: max_of(&vs),
            vs_mean_fpm: mean_of(&vs),
            roll_abs_max_deg: max_of(&roll),
            agl_min_ft: min_of(&agl),
            agl_max_ft: max_of(&agl),
        };

        Ok(ReviewWindow {
            start_epoch: first.timestamp_sec,
            end_epoch: last.timestamp_sec,
            phase,
            sample_count: snapshots.len(),
            event_hints: build_hints(phase, &metrics),
            metrics,
        })
    }
}

/// Phase-conditional observations that steer the expert team toward what
/// the deterministic pipeline already noticed.
fn build_hints(phase: FlightPhase, metrics: &ReviewMetrics) -> Vec<String> {
    let mut hints = Vec::new();

    if matches!(phase, FlightPhase::Approach | FlightPhase::Landing) && metrics.ias_max_kt > 95.0 {
        hints.push("Approach speed appears high for primary GA profile.".to_string());
    }
    if matches!(phase, FlightPhase::Takeoff | FlightPhase::InitialClimb)
        && metrics.ias_min_kt < 55.0
    {
        hints.push("Low airspeed observed during takeoff/climb segment.".to_string());
    }
    if metrics.roll_abs_max_deg > 35.0 {
        hints.push("Steep bank observed; coach smoother bank discipline.".to_string());
    }
    if metrics.agl_min_ft < 1000.0 && metrics.vs_min_fpm < -1000.0 {
        hints.push("High sink near ground seen in this window.".to_string());
    }

    hints
}

fn series<F>(snapshots: &[FlightSnapshot], extract: F) -> Vec<f64>
where
    F: Fn(&FlightSnapshot) -> Option<f64>,
{
    snapshots.iter().filter_map(extract).collect()
}

// Empty series report zero; the expert team treats zero as "not seen".
fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
