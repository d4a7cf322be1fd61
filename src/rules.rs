//! Rule Engine - session-lived evaluator producing P0/P1/P2 findings
//!
//! An independent state machine on the same snapshot stream as the phase
//! tracker, with its own taxonomy ([`MonitorPhase`]) tuned to the rule
//! set: ground-roll states, a Maneuver state entered by sustained steep
//! turns or slow flight, and a terminal Shutdown state confirmed by a
//! continuous engines-off dwell.
//!
//! P0 rules fire immediately; P1/P2 rules require their condition to be
//! sustained. Level-segment references (altitude, heading) are captured
//! on entry to a level segment and dropped when vertical speed exceeds
//! +/-300 fpm or the phase leaves cruise/maneuver.

use serde_json::json;
use std::collections::BTreeMap;

use crate::types::{FlightSnapshot, MonitorPhase, RuleFinding, Severity, M_TO_FT};

/// Sustain requirement for steep-turn quality evaluation (seconds).
pub const STEEP_TURN_SUSTAIN_SEC: f64 = 12.0;

/// Sustain requirement for slow-flight quality evaluation (seconds).
pub const SLOW_FLIGHT_SUSTAIN_SEC: f64 = 12.0;

/// Sustain requirement for the climb-out airspeed band (seconds).
pub const CLIMB_BAND_SUSTAIN_SEC: f64 = 8.0;

/// Groundspeed below which an on-ground elevation sample refreshes the
/// engine's field-elevation baseline (kt).
const FIELD_ELEVATION_MAX_GS_KT: f64 = 40.0;

#[derive(Debug, Clone, Default)]
struct EngineState {
    phase: MonitorPhase,
    field_elevation_ft: Option<f64>,
    had_airborne: bool,
    shutdown_confirmed: bool,

    previous_on_ground: Option<bool>,
    previous_vertical_speed_fpm: Option<f64>,

    climb_out_violation_since: Option<f64>,

    steep_turn_candidate_since: Option<f64>,
    steep_turn_reference_alt_ft: Option<f64>,

    slow_flight_candidate_since: Option<f64>,
    slow_flight_reference_alt_ft: Option<f64>,

    level_reference_alt_ft: Option<f64>,
    level_reference_heading_deg: Option<f64>,

    stall_event_started_at: Option<f64>,
    stall_recovery_seconds: Vec<f64>,

    shutdown_candidate_since: Option<f64>,
}

/// The session-lived rule evaluator.
pub struct RuleEngine {
    state: EngineState,
    engine_shutdown_hold_sec: f64,
}

impl RuleEngine {
    pub fn new(engine_shutdown_hold_sec: f64) -> Self {
        Self {
            state: EngineState::default(),
            engine_shutdown_hold_sec,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.state.phase
    }

    pub fn had_airborne(&self) -> bool {
        self.state.had_airborne
    }

    /// Confirmed engines-off shutdown; terminal for this flight cycle.
    pub fn shutdown_confirmed(&self) -> bool {
        self.state.shutdown_confirmed
    }

    /// Seconds from each stall-warning onset to recovery, in order.
    pub fn stall_recovery_seconds(&self) -> &[f64] {
        &self.state.stall_recovery_seconds
    }

    /// Reset for a new flight cycle; the field elevation baseline is kept.
    pub fn reset(&mut self) {
        let field = self.state.field_elevation_ft;
        self.state = EngineState {
            field_elevation_ft: field,
            ..EngineState::default()
        };
    }

    /// Advance the machine by one snapshot, returning any findings.
    pub fn update(&mut self, snapshot: &FlightSnapshot) -> Vec<RuleFinding> {
        self.update_field_elevation(snapshot);
        self.update_maneuver_trackers(snapshot);

        self.state.phase = self.detect_phase(snapshot);

        let findings = self.evaluate_rules(snapshot);

        self.update_shutdown_state(snapshot);
        if self.state.shutdown_confirmed {
            self.state.phase = MonitorPhase::Shutdown;
        }

        self.state.previous_on_ground = Some(snapshot.on_ground);
        self.state.previous_vertical_speed_fpm = snapshot.vertical_speed_fpm;

        findings
    }

    fn altitude_ft(snapshot: &FlightSnapshot) -> Option<f64> {
        snapshot.elevation_m.map(|m| m * M_TO_FT)
    }

    fn agl_ft(&self, snapshot: &FlightSnapshot) -> Option<f64> {
        match (Self::altitude_ft(snapshot), self.state.field_elevation_ft) {
            (Some(alt), Some(field)) => Some(alt - field),
            _ => None,
        }
    }

    fn update_field_elevation(&mut self, snapshot: &FlightSnapshot) {
        let Some(altitude_ft) = Self::altitude_ft(snapshot) else {
            return;
        };
        if snapshot.on_ground && snapshot.groundspeed_kt_or_zero() < FIELD_ELEVATION_MAX_GS_KT {
            self.state.field_elevation_ft = Some(altitude_ft);
        }
    }

    fn update_maneuver_trackers(&mut self, snapshot: &FlightSnapshot) {
        let timestamp = snapshot.timestamp_sec;
        let bank_deg = snapshot.bank_abs_deg();
        let agl_ft = self.agl_ft(snapshot);
        let vs_abs = snapshot.vs_fpm_or_zero().abs();

        let steep_turn_candidate = !snapshot.on_ground
            && agl_ft.is_some_and(|agl| agl > 1500.0)
            && (35.0..=60.0).contains(&bank_deg);
        if steep_turn_candidate {
            if self.state.steep_turn_candidate_since.is_none() {
                self.state.steep_turn_candidate_since = Some(timestamp);
                self.state.steep_turn_reference_alt_ft = Self::altitude_ft(snapshot);
            }
        } else {
            self.state.steep_turn_candidate_since = None;
            self.state.steep_turn_reference_alt_ft = None;
        }

        let slow_flight_candidate = !snapshot.on_ground
            && snapshot
                .indicated_airspeed_kt
                .is_some_and(|ias| (40.0..=70.0).contains(&ias))
            && snapshot.flap_ratio.is_some_and(|flaps| flaps > 0.2)
            && vs_abs < 300.0;
        if slow_flight_candidate {
            if self.state.slow_flight_candidate_since.is_none() {
                self.state.slow_flight_candidate_since = Some(timestamp);
                self.state.slow_flight_reference_alt_ft = Self::altitude_ft(snapshot);
            }
        } else {
            self.state.slow_flight_candidate_since = None;
            self.state.slow_flight_reference_alt_ft = None;
        }
    }

    fn detect_phase(&mut self, snapshot: &FlightSnapshot) -> MonitorPhase {
        if self.state.shutdown_confirmed {
            return MonitorPhase::Shutdown;
        }

        let groundspeed = snapshot.groundspeed_kt_or_zero();
        let ias = snapshot.ias_kt_or_zero();
        let vs = snapshot.vs_fpm_or_zero();

        let steep_turn_active = self.is_steep_turn_active(snapshot.timestamp_sec);
        let slow_flight_active = self.is_slow_flight_active(snapshot.timestamp_sec);

        if self.state.had_airborne {
            if snapshot.on_ground {
                if groundspeed > 15.0 {
                    return MonitorPhase::LandingRollout;
                }
                return MonitorPhase::TaxiIn;
            }

            if steep_turn_active || slow_flight_active {
                return MonitorPhase::Maneuver;
            }

            if self.agl_ft(snapshot).is_some_and(|agl| agl < 800.0) && vs < -200.0 {
                return MonitorPhase::Approach;
            }
            if vs > 300.0 {
                return MonitorPhase::Climb;
            }
            if vs < -300.0 {
                return MonitorPhase::Descent;
            }
            return MonitorPhase::Cruise;
        }

        if !snapshot.on_ground {
            self.state.had_airborne = true;
            return MonitorPhase::Climb;
        }

        if ias >= 40.0 || groundspeed >= 30.0 {
            return MonitorPhase::TakeoffRoll;
        }
        if groundspeed >= 2.0 {
            return MonitorPhase::TaxiOut;
        }
        MonitorPhase::PreFlight
    }

    fn is_steep_turn_active(&self, timestamp: f64) -> bool {
        self.state
            .steep_turn_candidate_since
            .is_some_and(|start| timestamp - start >= STEEP_TURN_SUSTAIN_SEC)
    }

    fn is_slow_flight_active(&self, timestamp: f64) -> bool {
        self.state
            .slow_flight_candidate_since
            .is_some_and(|start| timestamp - start >= SLOW_FLIGHT_SUSTAIN_SEC)
    }

    fn evaluate_rules(&mut self, snapshot: &FlightSnapshot) -> Vec<RuleFinding> {
        let mut findings = Vec::new();
        let phase = self.state.phase;
        let t = snapshot.timestamp_sec;

        let ias = snapshot.indicated_airspeed_kt;
        let agl_ft = self.agl_ft(snapshot);
        let vs = snapshot.vertical_speed_fpm;
        let bank = snapshot.bank_abs_deg();
        let groundspeed = snapshot.groundspeed_kt();
        let altitude_ft = Self::altitude_ft(snapshot);
        let heading = snapshot
            .magnetic_heading_deg
            .or(snapshot.heading_true_deg);

        if snapshot.stall_warning {
            if self.state.stall_event_started_at.is_none() {
                self.state.stall_event_started_at = Some(t);
            }
            findings.push(RuleFinding::new(
                "stall_warning",
                Severity::P0,
                phase,
                "Stall warning active. Reduce angle of attack and recover immediately.",
                t,
                evidence([("stall_warning_active", json!(true))]),
            ));
        } else if let Some(started) = self.state.stall_event_started_at.take() {
            self.state
                .stall_recovery_seconds
                .push((t - started).max(0.0));
        }

        if let (Some(agl), Some(vs_val)) = (agl_ft, vs) {
            if !snapshot.on_ground && agl < 500.0 && vs_val < -1200.0 {
                findings.push(RuleFinding::new(
                    "low_agl_sink_rate",
                    Severity::P0,
                    phase,
                    "Dangerous sink rate close to the ground.",
                    t,
                    evidence([
                        ("agl_ft", json!(agl)),
                        ("vertical_speed_fpm", json!(vs_val)),
                    ]),
                ));
            }
        }

        if let Some(agl) = agl_ft {
            if !snapshot.on_ground && agl < 1000.0 && bank > 45.0 {
                findings.push(RuleFinding::new(
                    "low_agl_excessive_bank",
                    Severity::P0,
                    phase,
                    "Excessive bank angle at low altitude.",
                    t,
                    evidence([("agl_ft", json!(agl)), ("bank_deg", json!(bank))]),
                ));
            }
        }

        let touchdown = self.state.previous_on_ground == Some(false) && snapshot.on_ground;
        if touchdown {
            if let Some(prev_vs) = self.state.previous_vertical_speed_fpm {
                if prev_vs < -700.0 {
                    findings.push(RuleFinding::new(
                        "hard_landing",
                        Severity::P0,
                        phase,
                        "Hard landing detected. Manage flare and descent rate earlier.",
                        t,
                        evidence([("touchdown_vertical_speed_fpm", json!(prev_vs))]),
                    ));
                }
            }
        }

        if phase.is_taxi() {
            if let Some(gs) = groundspeed {
                if gs > 20.0 {
                    findings.push(RuleFinding::new(
                        "taxi_speed_high",
                        Severity::P1,
                        phase,
                        "Taxi speed too high for checkride standards.",
                        t,
                        evidence([("groundspeed_kt", json!(gs))]),
                    ));
                }
            }
        }

        let climb_out_violation = phase == MonitorPhase::Climb
            && agl_ft.is_some_and(|agl| agl < 2000.0)
            && ias.is_some_and(|v| !(60.0..=90.0).contains(&v));
        if climb_out_violation {
            match self.state.climb_out_violation_since {
                None => self.state.climb_out_violation_since = Some(t),
                Some(since) if t - since >= CLIMB_BAND_SUSTAIN_SEC => {
                    findings.push(RuleFinding::new(
                        "climb_out_airspeed_out_of_band",
                        Severity::P1,
                        phase,
                        "Climb-out airspeed outside 60 to 90 knots.",
                        t,
                        evidence([
                            ("indicated_airspeed_kt", json!(ias)),
                            ("agl_ft", json!(agl_ft)),
                        ]),
                    ));
                }
                Some(_) => {}
            }
        } else {
            self.state.climb_out_violation_since = None;
        }

        let unstable_approach = phase == MonitorPhase::Approach
            && agl_ft.is_some_and(|agl| agl < 500.0)
            && (ias.is_some_and(|v| !(55.0..=95.0).contains(&v))
                || vs.is_some_and(|v| v < -1000.0));
        if unstable_approach {
            findings.push(RuleFinding::new(
                "unstable_approach",
                Severity::P1,
                phase,
                "Unstable approach detected below 500 feet AGL.",
                t,
                evidence([
                    ("agl_ft", json!(agl_ft)),
                    ("indicated_airspeed_kt", json!(ias)),
                    ("vertical_speed_fpm", json!(vs)),
                ]),
            ));
        }

        let is_level_segment = !snapshot.on_ground
            && vs.is_some_and(|v| v.abs() < 300.0)
            && matches!(phase, MonitorPhase::Cruise | MonitorPhase::Maneuver);
        if is_level_segment {
            if self.state.level_reference_alt_ft.is_none() {
                self.state.level_reference_alt_ft = altitude_ft;
                self.state.level_reference_heading_deg = heading;
            } else {
                if let (Some(alt), Some(reference)) =
                    (altitude_ft, self.state.level_reference_alt_ft)
                {
                    if (alt - reference).abs() > 150.0 {
                        findings.push(RuleFinding::new(
                            "level_altitude_wander",
                            Severity::P2,
                            phase,
                            "Altitude wander exceeds 150 feet in a level segment.",
                            t,
                            evidence([
                                ("altitude_ft_msl", json!(alt)),
                                ("reference_altitude_ft_msl", json!(reference)),
                            ]),
                        ));
                    }
                }
                if let (Some(hdg), Some(reference)) =
                    (heading, self.state.level_reference_heading_deg)
                {
                    if heading_delta_deg(hdg, reference) > 20.0 {
                        findings.push(RuleFinding::new(
                            "level_heading_wander",
                            Severity::P2,
                            phase,
                            "Heading wander exceeds 20 degrees in a level segment.",
                            t,
                            evidence([
                                ("heading_deg", json!(hdg)),
                                ("reference_heading_deg", json!(reference)),
                            ]),
                        ));
                    }
                }
            }
        } else {
            self.state.level_reference_alt_ft = None;
            self.state.level_reference_heading_deg = None;
        }

        if self.is_steep_turn_active(t) {
            let reference_alt = self.state.steep_turn_reference_alt_ft;
            let bank_error = (bank - 45.0).abs();
            let altitude_drift = match (altitude_ft, reference_alt) {
                (Some(alt), Some(reference)) => Some((alt - reference).abs()),
                _ => None,
            };
            if bank_error > 10.0 || altitude_drift.is_some_and(|drift| drift > 100.0) {
                findings.push(RuleFinding::new(
                    "steep_turn_quality",
                    Severity::P2,
                    phase,
                    "Steep-turn quality outside target (bank/altitude control).",
                    t,
                    evidence([
                        ("bank_deg", json!(bank)),
                        ("bank_error_deg", json!(bank_error)),
                        ("altitude_drift_ft", json!(altitude_drift)),
                    ]),
                ));
            }
        }

        if self.is_slow_flight_active(t) {
            let altitude_drift = match (altitude_ft, self.state.slow_flight_reference_alt_ft) {
                (Some(alt), Some(reference)) => Some((alt - reference).abs()),
                _ => None,
            };
            if altitude_drift.is_some_and(|drift| drift > 100.0) {
                findings.push(RuleFinding::new(
                    "slow_flight_quality",
                    Severity::P2,
                    phase,
                    "Slow-flight altitude control exceeds 100 feet drift.",
                    t,
                    evidence([("altitude_drift_ft", json!(altitude_drift))]),
                ));
            }
        }

        findings
    }

    /// Shutdown confirms after the aircraft has flown, is stationary on
    /// the ground, and the engines report not-running continuously for
    /// the hold duration. Any restart resets the dwell.
    fn update_shutdown_state(&mut self, snapshot: &FlightSnapshot) {
        if self.state.shutdown_confirmed {
            return;
        }

        let stationary = snapshot.groundspeed_kt_or_zero() < 2.0;
        let engines_off = snapshot.engine_running == Some(false);
        let conditions_met =
            self.state.had_airborne && snapshot.on_ground && stationary && engines_off;

        if !conditions_met {
            self.state.shutdown_candidate_since = None;
            return;
        }

        match self.state.shutdown_candidate_since {
            None => self.state.shutdown_candidate_since = Some(snapshot.timestamp_sec),
            Some(since) => {
                if snapshot.timestamp_sec - since >= self.engine_shutdown_hold_sec {
                    self.state.shutdown_confirmed = true;
                }
            }
        }
    }
}

fn evidence<const N: usize>(entries: [(&str, serde_json::Value); N]) -> BTreeMap<String, serde_json::Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Smallest angular distance between two headings (degrees).
fn heading_delta_deg(a: f64, b: f64) -> f64 {
    let diff = ((a - b) % 360.0).abs();
    diff.min(360.0 - diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_delta_wraps() {
        assert!((heading_delta_deg(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((heading_delta_deg(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert!((heading_delta_deg(180.0, 180.0)).abs() < 1e-9);
    }
}
