//! Flight phase tracking with anti-flap dwell
//!
//! A nine-state machine over the snapshot stream. Candidate phases are
//! selected by priority-ordered predicates (first match wins); a
//! candidate only becomes the confirmed phase after persisting for that
//! phase's minimum dwell. Confidence reports dwell progress while a
//! candidate is pending.

use crate::config::defaults::FIELD_ELEVATION_MAX_GS_KT;
use crate::types::{FlightPhase, FlightSnapshot, PhaseState};

/// Per-phase minimum dwell before confirmation (seconds).
///
/// LANDING confirms fast so the callout lands while it still matters;
/// CRUISE is slow because level flight is the noisiest candidate.
pub fn default_min_dwell_sec(phase: FlightPhase) -> f64 {
    match phase {
        FlightPhase::Preflight => 3.0,
        FlightPhase::TaxiOut => 3.0,
        FlightPhase::Takeoff => 2.0,
        FlightPhase::InitialClimb => 3.0,
        FlightPhase::Cruise => 5.0,
        FlightPhase::Descent => 4.0,
        FlightPhase::Approach => 3.0,
        FlightPhase::Landing => 1.0,
        FlightPhase::TaxiIn => 3.0,
    }
}

/// IAS at which the airborne latch engages (kt).
const AIRBORNE_LATCH_IAS_KT: f64 = 60.0;

#[derive(Debug, Clone)]
struct TrackerState {
    phase: FlightPhase,
    phase_started_at: f64,
    candidate: FlightPhase,
    candidate_since: f64,
    field_elevation_m: Option<f64>,
    was_airborne: bool,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            phase: FlightPhase::Preflight,
            phase_started_at: 0.0,
            candidate: FlightPhase::Preflight,
            candidate_since: 0.0,
            field_elevation_m: None,
            was_airborne: false,
        }
    }
}

/// The nine-phase state machine.
pub struct FlightPhaseTracker {
    state: TrackerState,
}

impl Default for FlightPhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightPhaseTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::default(),
        }
    }

    /// The current confirmed phase.
    pub fn phase(&self) -> FlightPhase {
        self.state.phase
    }

    /// Latches true once IAS >= 60 while airborne; never resets within a
    /// flight cycle.
    pub fn was_airborne(&self) -> bool {
        self.state.was_airborne
    }

    /// The elevation baseline learned while parked or taxiing slowly.
    pub fn field_elevation_m(&self) -> Option<f64> {
        self.state.field_elevation_m
    }

    /// Reset for a new flight cycle. The field elevation baseline is kept;
    /// the airport did not move.
    pub fn reset(&mut self) {
        let field = self.state.field_elevation_m;
        self.state = TrackerState {
            field_elevation_m: field,
            ..TrackerState::default()
        };
    }

    /// Advance the machine by one snapshot.
    pub fn update(&mut self, snapshot: &FlightSnapshot) -> PhaseState {
        if self.state.phase_started_at <= 0.0 {
            self.state.phase_started_at = snapshot.timestamp_sec;
            self.state.candidate_since = snapshot.timestamp_sec;
        }

        let gs_kt = snapshot.groundspeed_kt_or_zero();
        let ias = snapshot.ias_kt_or_zero();

        if snapshot.on_ground && gs_kt < FIELD_ELEVATION_MAX_GS_KT {
            if let Some(elevation) = snapshot.elevation_m {
                self.state.field_elevation_m = Some(elevation);
            }
        }

        if !snapshot.on_ground && ias >= AIRBORNE_LATCH_IAS_KT {
            self.state.was_airborne = true;
        }

        let candidate = self.determine_candidate(snapshot);
        if candidate != self.state.candidate {
            self.state.candidate = candidate;
            self.state.candidate_since = snapshot.timestamp_sec;
        }

        let dwell_required = default_min_dwell_sec(candidate);
        let dwell = (snapshot.timestamp_sec - self.state.candidate_since).max(0.0);

        let mut changed = false;
        let previous = self.state.phase;
        if candidate != self.state.phase && dwell >= dwell_required {
            self.state.phase = candidate;
            self.state.phase_started_at = snapshot.timestamp_sec;
            changed = true;
        }

        let confidence = if candidate == self.state.phase {
            1.0
        } else {
            (dwell / dwell_required.max(0.1)).min(0.99)
        };

        PhaseState {
            phase: self.state.phase,
            confidence,
            changed,
            previous_phase: changed.then_some(previous),
            changed_at_epoch: changed.then_some(snapshot.timestamp_sec),
        }
    }

    /// Candidate selection. Predicates evaluate in order; first match wins.
    fn determine_candidate(&self, snapshot: &FlightSnapshot) -> FlightPhase {
        let ias = snapshot.ias_kt_or_zero();
        let gs_kt = snapshot.groundspeed_kt_or_zero();
        let vs = snapshot.vs_fpm_or_zero();
        let throttle = snapshot.throttle_ratio.unwrap_or(0.0);
        let park = snapshot.parking_brake_ratio.unwrap_or(0.0);
        let agl_ft = snapshot.agl_ft(self.state.field_elevation_m);

        if snapshot.on_ground {
            if self.state.was_airborne {
                if gs_kt > 40.0 || ias > 45.0 {
                    return FlightPhase::Landing;
                }
                return FlightPhase::TaxiIn;
            }

            if gs_kt < 2.0 && ias < 5.0 && throttle < 0.2 && park > 0.3 {
                return FlightPhase::Preflight;
            }
            if gs_kt >= 35.0 && ias >= 40.0 {
                return FlightPhase::Takeoff;
            }
            return FlightPhase::TaxiOut;
        }

        // Airborne without an elevation baseline: climb/descend/cruise on
        // vertical speed alone.
        let Some(agl_ft) = agl_ft else {
            if vs > 300.0 {
                return FlightPhase::InitialClimb;
            }
            if vs < -300.0 {
                return FlightPhase::Descent;
            }
            return FlightPhase::Cruise;
        };

        if agl_ft < 250.0 && vs < -150.0 && ias > 55.0 {
            return FlightPhase::Landing;
        }
        if agl_ft <= 2500.0 && vs < -400.0 {
            return FlightPhase::Approach;
        }
        if vs > 300.0 && agl_ft < 3000.0 {
            return FlightPhase::InitialClimb;
        }
        if vs < -300.0 && agl_ft > 2500.0 {
            return FlightPhase::Descent;
        }
        if vs.abs() < 400.0 && agl_ft >= 3000.0 {
            return FlightPhase::Cruise;
        }

        // Ambiguous band: stick with the trajectory the previous phase implies.
        match self.state.phase {
            FlightPhase::Takeoff | FlightPhase::InitialClimb => FlightPhase::InitialClimb,
            FlightPhase::Approach | FlightPhase::Landing => FlightPhase::Approach,
            _ => FlightPhase::Cruise,
        }
    }
}
