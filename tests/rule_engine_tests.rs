//! Rule Engine Regression Tests
//!
//! Covers the engine's phase taxonomy, the sustained P1/P2 rules, the
//! hard-landing touchdown edge, and the engines-off shutdown dwell with
//! restart reset.

use skycoach::rules::RuleEngine;
use skycoach::types::{FlightSnapshot, MonitorPhase, Severity, M_TO_FT};

/// Build an airborne snapshot at a given altitude (ft MSL).
#[allow(clippy::too_many_arguments)]
fn airborne(
    t: f64,
    altitude_ft: f64,
    ias: f64,
    vs: f64,
    gs_kt: f64,
    bank: f64,
    flaps: f64,
    heading: f64,
) -> FlightSnapshot {
    FlightSnapshot {
        timestamp_sec: t,
        on_ground: false,
        elevation_m: Some(altitude_ft / M_TO_FT),
        indicated_airspeed_kt: Some(ias),
        vertical_speed_fpm: Some(vs),
        groundspeed_m_s: Some(gs_kt / 1.943_84),
        roll_deg: Some(bank),
        flap_ratio: Some(flaps),
        magnetic_heading_deg: Some(heading),
        engine_running: Some(true),
        ..FlightSnapshot::default()
    }
}

fn on_ground(t: f64, field_ft: f64, gs_kt: f64, ias: f64, engine_on: bool) -> FlightSnapshot {
    FlightSnapshot {
        timestamp_sec: t,
        on_ground: true,
        elevation_m: Some(field_ft / M_TO_FT),
        indicated_airspeed_kt: Some(ias),
        vertical_speed_fpm: Some(0.0),
        groundspeed_m_s: Some(gs_kt / 1.943_84),
        engine_running: Some(engine_on),
        ..FlightSnapshot::default()
    }
}

#[test]
fn phase_progression_preflight_to_climb() {
    let mut engine = RuleEngine::new(15.0);

    engine.update(&on_ground(0.0, 500.0, 0.0, 0.0, true));
    assert_eq!(engine.phase(), MonitorPhase::PreFlight);

    engine.update(&on_ground(1.0, 500.0, 6.0, 8.0, true));
    assert_eq!(engine.phase(), MonitorPhase::TaxiOut);

    engine.update(&on_ground(2.0, 500.0, 35.0, 45.0, true));
    assert_eq!(engine.phase(), MonitorPhase::TakeoffRoll);

    engine.update(&airborne(3.0, 800.0, 75.0, 900.0, 80.0, 0.0, 0.0, 90.0));
    assert_eq!(engine.phase(), MonitorPhase::Climb);
    assert!(engine.had_airborne());
}

#[test]
fn p0_low_agl_sink_rate_triggers() {
    let mut engine = RuleEngine::new(15.0);

    // Field elevation learned at 480 ft.
    engine.update(&on_ground(0.0, 480.0, 0.0, 0.0, true));
    engine.update(&airborne(1.0, 900.0, 80.0, -1305.0, 85.0, 0.0, 0.0, 90.0));
    let findings = engine.update(&airborne(2.0, 840.0, 78.0, -1250.0, 90.0, 0.0, 0.0, 90.0));

    assert!(findings
        .iter()
        .any(|f| f.rule_id == "low_agl_sink_rate" && f.severity == Severity::P0));
}

/// S3: climb-out airspeed out of band must be sustained eight seconds.
#[test]
fn climb_out_airspeed_band_fires_once_after_sustain() {
    let mut engine = RuleEngine::new(15.0);
    engine.update(&on_ground(-1.0, 500.0, 0.0, 0.0, true));

    let mut fired = 0;
    // Six snapshots over nine seconds, IAS 52, AGL < 2000.
    for (i, t) in [0.0, 1.8, 3.6, 5.4, 7.2, 9.0].iter().enumerate() {
        let altitude = 700.0 + 150.0 * i as f64;
        let findings = engine.update(&airborne(*t, altitude, 52.0, 700.0, 60.0, 0.0, 0.0, 90.0));
        fired += findings
            .iter()
            .filter(|f| f.rule_id == "climb_out_airspeed_out_of_band")
            .count();
        for finding in &findings {
            if finding.rule_id == "climb_out_airspeed_out_of_band" {
                assert_eq!(finding.severity, Severity::P1);
            }
        }
    }
    assert_eq!(fired, 1);
}

#[test]
fn climb_out_band_resets_when_airspeed_recovers() {
    let mut engine = RuleEngine::new(15.0);
    engine.update(&on_ground(-1.0, 500.0, 0.0, 0.0, true));

    engine.update(&airborne(0.0, 700.0, 52.0, 700.0, 60.0, 0.0, 0.0, 90.0));
    // Back in the band: the sustain clock must restart.
    engine.update(&airborne(4.0, 1100.0, 70.0, 700.0, 75.0, 0.0, 0.0, 90.0));
    let findings = engine.update(&airborne(9.0, 1500.0, 52.0, 700.0, 60.0, 0.0, 0.0, 90.0));
    assert!(findings
        .iter()
        .all(|f| f.rule_id != "climb_out_airspeed_out_of_band"));
}

/// S4: touchdown after a -850 fpm final tick is a hard landing.
#[test]
fn hard_landing_on_touchdown_tick() {
    let mut engine = RuleEngine::new(15.0);
    engine.update(&on_ground(0.0, 500.0, 0.0, 0.0, true));
    engine.update(&airborne(1.0, 600.0, 65.0, -850.0, 60.0, 0.0, 0.3, 90.0));

    let findings = engine.update(&on_ground(2.0, 500.0, 35.0, 50.0, true));
    assert!(findings
        .iter()
        .any(|f| f.rule_id == "hard_landing" && f.severity == Severity::P0));

    // The next ground tick is no longer a touchdown.
    let later = engine.update(&on_ground(3.0, 500.0, 20.0, 25.0, true));
    assert!(later.iter().all(|f| f.rule_id != "hard_landing"));
}

#[test]
fn steep_turn_quality_after_sustain() {
    let mut engine = RuleEngine::new(15.0);
    engine.update(&on_ground(0.0, 1000.0, 0.0, 0.0, true));

    engine.update(&airborne(1.0, 3000.0, 95.0, 50.0, 100.0, 40.0, 0.0, 90.0));
    let findings = engine.update(&airborne(14.0, 3170.0, 98.0, 100.0, 100.0, 60.0, 0.0, 90.0));

    assert!(findings
        .iter()
        .any(|f| f.rule_id == "steep_turn_quality" && f.severity == Severity::P2));
    assert_eq!(engine.phase(), MonitorPhase::Maneuver);
}

#[test]
fn level_heading_wander_uses_circular_distance() {
    let mut engine = RuleEngine::new(15.0);
    engine.update(&on_ground(0.0, 500.0, 0.0, 0.0, true));
    // First airborne tick classifies as climb; the second is level cruise
    // and captures the 356-degree reference heading.
    engine.update(&airborne(1.0, 3500.0, 100.0, 0.0, 100.0, 5.0, 0.0, 355.0));
    engine.update(&airborne(2.0, 3500.0, 100.0, 0.0, 100.0, 5.0, 0.0, 356.0));

    // 25 degrees across the north wrap.
    let findings = engine.update(&airborne(3.0, 3500.0, 100.0, 0.0, 100.0, 5.0, 0.0, 20.0));
    assert!(findings.iter().any(|f| f.rule_id == "level_heading_wander"));
}

#[test]
fn stall_recovery_duration_is_recorded() {
    let mut engine = RuleEngine::new(15.0);
    let mut stalled = airborne(1.0, 3000.0, 48.0, -300.0, 55.0, 0.0, 0.0, 90.0);
    stalled.stall_warning = true;

    let findings = engine.update(&stalled);
    assert!(findings.iter().any(|f| f.rule_id == "stall_warning"));

    let recovered = airborne(4.5, 2900.0, 70.0, -100.0, 75.0, 0.0, 0.0, 90.0);
    engine.update(&recovered);

    let recoveries = engine.stall_recovery_seconds();
    assert_eq!(recoveries.len(), 1);
    assert!((recoveries[0] - 3.5).abs() < 1e-9);
}

/// Law 7 shape: shutdown confirms only after the hold, and an engine
/// restart resets the dwell.
#[test]
fn shutdown_dwell_resets_on_engine_restart() {
    let mut engine = RuleEngine::new(15.0);

    engine.update(&airborne(0.0, 1500.0, 95.0, 500.0, 100.0, 0.0, 0.0, 90.0));

    engine.update(&on_ground(10.0, 500.0, 0.5, 0.0, false));
    assert!(!engine.shutdown_confirmed());

    // Restart clears the dwell.
    engine.update(&on_ground(20.0, 500.0, 0.5, 0.0, true));
    assert!(!engine.shutdown_confirmed());

    engine.update(&on_ground(30.0, 500.0, 0.5, 0.0, false));
    engine.update(&on_ground(44.0, 500.0, 0.5, 0.0, false));
    assert!(!engine.shutdown_confirmed());

    engine.update(&on_ground(46.0, 500.0, 0.5, 0.0, false));
    assert!(engine.shutdown_confirmed());
    assert_eq!(engine.phase(), MonitorPhase::Shutdown);
}

#[test]
fn reset_clears_the_cycle_but_keeps_field_elevation() {
    let mut engine = RuleEngine::new(15.0);
    engine.update(&on_ground(0.0, 500.0, 0.0, 0.0, true));
    engine.update(&airborne(1.0, 1500.0, 95.0, 500.0, 100.0, 0.0, 0.0, 90.0));
    for t in [10.0, 30.0] {
        engine.update(&on_ground(t, 500.0, 0.5, 0.0, false));
    }
    assert!(engine.shutdown_confirmed());

    engine.reset();
    assert!(!engine.shutdown_confirmed());
    assert!(!engine.had_airborne());
    assert_eq!(engine.phase(), MonitorPhase::PreFlight);

    // AGL still works immediately after the reset.
    let findings = engine.update(&airborne(50.0, 900.0, 80.0, -1305.0, 85.0, 0.0, 0.0, 90.0));
    let _ = findings;
    let findings = engine.update(&airborne(51.0, 850.0, 80.0, -1250.0, 85.0, 0.0, 0.0, 90.0));
    assert!(findings.iter().any(|f| f.rule_id == "low_agl_sink_rate"));
}
