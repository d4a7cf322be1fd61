//! Flight-phase taxonomies: FlightPhase (tracker), MonitorPhase (rule engine)

use serde::{Deserialize, Serialize};

/// The nine confirmed phases of a normal flight cycle.
///
/// Produced by the phase tracker with anti-flap dwell; drives hazard
/// gating and review context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    #[default]
    Preflight,
    TaxiOut,
    Takeoff,
    InitialClimb,
    Cruise,
    Descent,
    Approach,
    Landing,
    TaxiIn,
}

impl FlightPhase {
    /// Stable snake_case identifier for journals and speech context.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightPhase::Preflight => "preflight",
            FlightPhase::TaxiOut => "taxi_out",
            FlightPhase::Takeoff => "takeoff",
            FlightPhase::InitialClimb => "initial_climb",
            FlightPhase::Cruise => "cruise",
            FlightPhase::Descent => "descent",
            FlightPhase::Approach => "approach",
            FlightPhase::Landing => "landing",
            FlightPhase::TaxiIn => "taxi_in",
        }
    }

    /// Phases where the aircraft is taxiing under its own power.
    pub fn is_taxi(&self) -> bool {
        matches!(self, FlightPhase::TaxiOut | FlightPhase::TaxiIn)
    }
}

impl std::fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rule engine's own phase taxonomy.
///
/// Overlaps with [`FlightPhase`] but is tailored to the rule set:
/// ground-roll states are distinct from taxi, sustained maneuvers get
/// their own state, and a terminal Shutdown state exists. The two
/// machines run independently on the same snapshot stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    #[default]
    PreFlight,
    TaxiOut,
    TakeoffRoll,
    Climb,
    Cruise,
    Maneuver,
    Descent,
    Approach,
    LandingRollout,
    TaxiIn,
    Shutdown,
}

impl MonitorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorPhase::PreFlight => "preflight",
            MonitorPhase::TaxiOut => "taxi_out",
            MonitorPhase::TakeoffRoll => "takeoff_roll",
            MonitorPhase::Climb => "climb",
            MonitorPhase::Cruise => "cruise",
            MonitorPhase::Maneuver => "maneuver",
            MonitorPhase::Descent => "descent",
            MonitorPhase::Approach => "approach",
            MonitorPhase::LandingRollout => "landing_rollout",
            MonitorPhase::TaxiIn => "taxi_in",
            MonitorPhase::Shutdown => "shutdown",
        }
    }

    pub fn is_taxi(&self) -> bool {
        matches!(self, MonitorPhase::TaxiOut | MonitorPhase::TaxiIn)
    }
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FlightPhase> for MonitorPhase {
    /// One-way mapping used only where a tracker phase must seed the
    /// engine's view (journal records); the engine otherwise derives its
    /// own phase from the stream.
    fn from(phase: FlightPhase) -> Self {
        match phase {
            FlightPhase::Preflight => MonitorPhase::PreFlight,
            FlightPhase::TaxiOut => MonitorPhase::TaxiOut,
            FlightPhase::Takeoff => MonitorPhase::TakeoffRoll,
            FlightPhase::InitialClimb => MonitorPhase::Climb,
            FlightPhase::Cruise => MonitorPhase::Cruise,
            FlightPhase::Descent => MonitorPhase::Descent,
            FlightPhase::Approach => MonitorPhase::Approach,
            FlightPhase::Landing => MonitorPhase::LandingRollout,
            FlightPhase::TaxiIn => MonitorPhase::TaxiIn,
        }
    }
}

/// Phase tracker output for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    /// The confirmed phase after dwell.
    pub phase: FlightPhase,
    /// 1.0 when candidate == confirmed, else dwell progress capped at 0.99.
    pub confidence: f64,
    /// True exactly on the tick the phase was confirmed.
    pub changed: bool,
    /// The previous confirmed phase, present only when `changed`.
    pub previous_phase: Option<FlightPhase>,
    /// Epoch of confirmation, present only when `changed`.
    pub changed_at_epoch: Option<f64>,
}

impl PhaseState {
    /// State at supervisor start, before the first tracker update.
    pub fn initial() -> Self {
        Self {
            phase: FlightPhase::Preflight,
            confidence: 0.0,
            changed: false,
            previous_phase: None,
            changed_at_epoch: None,
        }
    }
}
