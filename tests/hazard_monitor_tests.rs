//! Hazard Monitor Scenario Tests
//!
//! End-to-end urgent path: monitor rules through the cooldown-gated
//! speech sink, asserting each scenario produces exactly the expected
//! downstream `speak` traffic.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use skycoach::config::SpeechConfig;
use skycoach::hazards::HazardMonitor;
use skycoach::speech::{SpeechError, SpeechSink, SpeechTransport};
use skycoach::types::{FlightPhase, FlightSnapshot, HazardProfile, PhaseState};

struct RecordingTransport {
    calls: Arc<AtomicUsize>,
    texts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SpeechTransport for RecordingTransport {
    async fn start(&self) -> Result<(), SpeechError> {
        Ok(())
    }
    async fn stop(&self) {}
    async fn speak(&self, message: &str) -> Result<bool, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(message.to_string());
        Ok(true)
    }
}

fn monitor(profile: HazardProfile) -> HazardMonitor {
    HazardMonitor::with_rng(
        Arc::new(ArcSwap::from_pointee(profile)),
        8.0,
        StdRng::seed_from_u64(11),
    )
}

fn phase(phase: FlightPhase) -> PhaseState {
    PhaseState {
        phase,
        confidence: 1.0,
        changed: false,
        previous_phase: None,
        changed_at_epoch: None,
    }
}

fn ground_at(elevation_m: f64) -> FlightSnapshot {
    FlightSnapshot {
        timestamp_sec: 0.0,
        on_ground: true,
        elevation_m: Some(elevation_m),
        groundspeed_m_s: Some(0.0),
        parking_brake_ratio: Some(1.0),
        ..FlightSnapshot::default()
    }
}

/// Low speed airborne: the alert fires and the sink speaks exactly once
/// despite repeated ticks inside the cooldown.
#[tokio::test]
async fn low_speed_airborne_speaks_exactly_once() {
    let mut monitor = monitor(HazardProfile::default());
    monitor.evaluate(&ground_at(100.0), &phase(FlightPhase::Preflight));

    let snapshot = FlightSnapshot {
        timestamp_sec: 10.0,
        on_ground: false,
        indicated_airspeed_kt: Some(45.0),
        vertical_speed_fpm: Some(-200.0),
        elevation_m: Some(500.0),
        ..FlightSnapshot::default()
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let texts = Arc::new(Mutex::new(Vec::new()));
    let mut sink = SpeechSink::new(
        &SpeechConfig::default(),
        Box::new(RecordingTransport {
            calls: Arc::clone(&calls),
            texts: Arc::clone(&texts),
        }),
        false,
    );

    for _ in 0..5 {
        let alerts = monitor.evaluate(&snapshot, &phase(FlightPhase::Cruise));
        let stall = alerts
            .iter()
            .find(|a| a.alert_id == "stall_or_low_speed")
            .expect("stall_or_low_speed should fire at 45 kt with AGL above the floor");
        sink.speak_urgent(&stall.speak_text, &stall.alert_id)
            .await
            .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let texts = texts.lock().unwrap();
    assert_eq!(
        texts[0],
        "Airspeed critical. Lower the nose and add power now."
    );
}

#[test]
fn stall_rule_holds_fire_in_ground_effect() {
    let mut monitor = monitor(HazardProfile::default());
    monitor.evaluate(&ground_at(100.0), &phase(FlightPhase::Preflight));

    // 45 kt at 50 ft AGL is a normal flare, not a stall callout.
    let flare = FlightSnapshot {
        timestamp_sec: 5.0,
        on_ground: false,
        indicated_airspeed_kt: Some(45.0),
        elevation_m: Some(115.0),
        ..FlightSnapshot::default()
    };
    let alerts = monitor.evaluate(&flare, &phase(FlightPhase::Landing));
    assert!(alerts.iter().all(|a| a.alert_id != "stall_or_low_speed"));
}

#[test]
fn stall_warning_fires_regardless_of_speed() {
    let mut monitor = monitor(HazardProfile::default());
    let snapshot = FlightSnapshot {
        timestamp_sec: 1.0,
        on_ground: false,
        indicated_airspeed_kt: Some(90.0),
        stall_warning: true,
        ..FlightSnapshot::default()
    };
    let alerts = monitor.evaluate(&snapshot, &phase(FlightPhase::Cruise));
    assert!(alerts.iter().any(|a| a.alert_id == "stall_or_low_speed"));
}

#[test]
fn disabled_rules_stay_silent() {
    let mut profile = HazardProfile::default();
    profile.enabled_rules.remove("stall_or_low_speed");
    let mut monitor = monitor(profile);

    let snapshot = FlightSnapshot {
        timestamp_sec: 1.0,
        on_ground: false,
        indicated_airspeed_kt: Some(40.0),
        stall_warning: true,
        ..FlightSnapshot::default()
    };
    let alerts = monitor.evaluate(&snapshot, &phase(FlightPhase::Cruise));
    assert!(alerts.iter().all(|a| a.alert_id != "stall_or_low_speed"));
}

#[test]
fn unstable_approach_requires_approach_or_landing_phase() {
    let mut monitor = monitor(HazardProfile::default());
    monitor.evaluate(&ground_at(100.0), &phase(FlightPhase::Preflight));

    // 105 kt at ~650 ft AGL.
    let snapshot = FlightSnapshot {
        timestamp_sec: 8.0,
        on_ground: false,
        indicated_airspeed_kt: Some(105.0),
        vertical_speed_fpm: Some(-600.0),
        elevation_m: Some(300.0),
        ..FlightSnapshot::default()
    };

    let in_approach = monitor.evaluate(&snapshot, &phase(FlightPhase::Approach));
    assert!(in_approach
        .iter()
        .any(|a| a.alert_id == "unstable_approach_fast_or_sink"));

    let in_cruise = monitor.evaluate(&snapshot, &phase(FlightPhase::Cruise));
    assert!(in_cruise
        .iter()
        .all(|a| a.alert_id != "unstable_approach_fast_or_sink"));
}

#[test]
fn sink_and_pull_up_rules_fire_together_near_the_ground() {
    let mut monitor = monitor(HazardProfile::default());
    monitor.evaluate(&ground_at(100.0), &phase(FlightPhase::Preflight));

    // ~230 ft AGL, 1600 fpm down.
    let snapshot = FlightSnapshot {
        timestamp_sec: 20.0,
        on_ground: false,
        indicated_airspeed_kt: Some(80.0),
        vertical_speed_fpm: Some(-1600.0),
        elevation_m: Some(170.0),
        ..FlightSnapshot::default()
    };
    let alerts = monitor.evaluate(&snapshot, &phase(FlightPhase::Approach));
    let ids: Vec<&str> = alerts.iter().map(|a| a.alert_id.as_str()).collect();
    assert!(ids.contains(&"excessive_sink_low_alt"));
    assert!(ids.contains(&"pull_up_now"));
}
