//! Skycoach: Autonomous CFI Supervisor
//!
//! Real-time flight coaching from simulator telemetry.
//!
//! ## Architecture
//!
//! - **Telemetry**: binary UDP dataref client with beacon discovery
//! - **Phase Tracker**: nine-phase state machine with anti-flap dwell
//! - **Hazard Monitor**: per-tick urgent callout rules
//! - **Rule Engine**: session-lived P0/P1/P2 findings with shutdown detection
//! - **Review Builder**: trailing-window summaries for the expert team
//! - **Speech Sink**: urgent/non-urgent arbitration over one `speak` endpoint
//! - **Runtime Supervisor**: the tick loop composing all of the above

pub mod config;
pub mod types;
pub mod telemetry;
pub mod phase;
pub mod hazards;
pub mod rules;
pub mod review;
pub mod speech;
pub mod team;
pub mod journal;
pub mod debrief;
pub mod runtime;

// Re-export commonly used types
pub use types::{
    AlertSeverity, FlightDebrief, FlightPhase, FlightSnapshot, HazardAlert, HazardProfile,
    MonitorPhase, PhaseState, ReviewMetrics, ReviewWindow, RuleFinding, SessionProfile, Severity,
    TeamDecision,
};

// Re-export the pipeline components
pub use hazards::HazardMonitor;
pub use phase::FlightPhaseTracker;
pub use review::ReviewWindowBuilder;
pub use rules::RuleEngine;
pub use runtime::{CoachRuntime, RuntimeOptions};
pub use speech::SpeechSink;

// Re-export configuration
pub use config::CoachConfig;
