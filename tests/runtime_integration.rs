//! Runtime Integration Tests
//!
//! Drives the full supervisor with a scripted telemetry source, a
//! recording speech transport, and a deterministic expert team, then
//! asserts behavior through the event journal — the journal is the
//! truth of side effects.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use skycoach::config::CoachConfig;
use skycoach::runtime::{CoachRuntime, RuntimeOptions};
use skycoach::speech::{SpeechError, SpeechSink, SpeechTransport};
use skycoach::team::{ExpertTeam, TeamError};
use skycoach::telemetry::{TelemetryError, TelemetrySource};
use skycoach::types::{
    FlightSnapshot, ReviewWindow, SessionProfile, TeamDecision,
};

// ============================================================================
// Fakes
// ============================================================================

/// Delivers a scripted snapshot sequence, one per `latest()` call; the
/// final snapshot repeats once the script is exhausted.
struct ScriptedSource {
    snapshots: Vec<FlightSnapshot>,
    cursor: Mutex<usize>,
}

impl ScriptedSource {
    fn new(snapshots: Vec<FlightSnapshot>) -> Self {
        Self {
            snapshots,
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn start(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
    async fn stop(&mut self) {}

    fn latest(&self) -> Option<FlightSnapshot> {
        let mut cursor = self.cursor.lock().unwrap();
        let snapshot = self
            .snapshots
            .get(*cursor)
            .or_else(|| self.snapshots.last())
            .cloned()?;
        if *cursor < self.snapshots.len() {
            *cursor += 1;
        }
        Some(snapshot)
    }

    fn window(&self, _seconds: f64) -> Vec<FlightSnapshot> {
        self.snapshots.clone()
    }
}

struct RecordingTransport {
    texts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SpeechTransport for RecordingTransport {
    async fn start(&self) -> Result<(), SpeechError> {
        Ok(())
    }
    async fn stop(&self) {}
    async fn speak(&self, message: &str) -> Result<bool, SpeechError> {
        self.texts.lock().unwrap().push(message.to_string());
        Ok(true)
    }
}

struct FakeTeam {
    speak_text: String,
    review_calls: Arc<Mutex<usize>>,
}

#[async_trait]
impl ExpertTeam for FakeTeam {
    async fn start(&mut self) -> Result<(), TeamError> {
        Ok(())
    }
    async fn stop(&mut self) {}

    async fn run_review(
        &mut self,
        window: &ReviewWindow,
        _profile: Option<&SessionProfile>,
    ) -> Result<TeamDecision, TeamError> {
        *self.review_calls.lock().unwrap() += 1;
        Ok(TeamDecision {
            phase: window.phase,
            summary: "review complete".to_string(),
            feedback_items: vec!["item".to_string()],
            speak_now: true,
            speak_text: self.speak_text.clone(),
            raw_output: "{}".to_string(),
        })
    }

    async fn bootstrap_session(
        &mut self,
        _snapshots: &[FlightSnapshot],
    ) -> Result<SessionProfile, TeamError> {
        // Empty welcome keeps the transport log clean for assertions.
        Ok(SessionProfile {
            welcome_message: String::new(),
            ..SessionProfile::default()
        })
    }

    async fn refresh_hazard_phrase_variants(
        &mut self,
        _profile: &SessionProfile,
        _recent_alert_counts: &BTreeMap<String, u64>,
    ) -> Result<BTreeMap<String, Vec<String>>, TeamError> {
        Ok(BTreeMap::new())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config(tmpdir: &Path) -> CoachConfig {
    let mut config = CoachConfig::default();
    config.runtime.poll_sec = 0.005;
    config.runtime.startup_bootstrap_wait_sec = 0.0;
    config.runtime.shutdown_detect_dwell_sec = 4.0;
    config.runtime.engine_shutdown_hold_sec = 15.0;
    config.review.review_tick_sec = 0.05;
    config.review.review_window_sec = 30.0;
    config.speech.nonurgent_cooldown_sec = 0.0;
    config.speech.nonurgent_suppress_after_urgent_sec = 5.0;
    config.team.hazard_phrase_runtime_enabled = false;
    config.journal.runtime_events_log = tmpdir
        .join("runtime.events.log.jsonl")
        .to_string_lossy()
        .into_owned();
    config.journal.telemetry_log = tmpdir
        .join("telemetry.log.jsonl")
        .to_string_lossy()
        .into_owned();
    config.journal.team_chat_log = tmpdir
        .join("team.chat.log.jsonl")
        .to_string_lossy()
        .into_owned();
    config
}

fn read_events(path: &str) -> Vec<Value> {
    let contents = std::fs::read_to_string(path).unwrap_or_default();
    contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn events_named<'a>(events: &'a [Value], name: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| e["event"].as_str() == Some(name))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build_runtime(
    config: &CoachConfig,
    snapshots: Vec<FlightSnapshot>,
    texts: Arc<Mutex<Vec<String>>>,
    review_calls: Arc<Mutex<usize>>,
    speak_text: &str,
    nonurgent_enabled: bool,
) -> CoachRuntime {
    let source = Box::new(ScriptedSource::new(snapshots));
    let speech = SpeechSink::new(
        &config.speech,
        Box::new(RecordingTransport { texts }),
        false,
    );
    let team = Box::new(FakeTeam {
        speak_text: speak_text.to_string(),
        review_calls,
    });
    CoachRuntime::new(
        config.clone(),
        RuntimeOptions {
            nonurgent_speak_enabled: nonurgent_enabled,
        },
        source,
        speech,
        team,
    )
}

// ============================================================================
// Scenarios
// ============================================================================

/// Suppression law: an urgent callout within the horizon silences
/// non-urgent coaching, and the journal records why.
#[tokio::test]
async fn urgent_alert_suppresses_nonurgent_review() {
    let tmpdir = tempfile::tempdir().unwrap();
    let config = test_config(tmpdir.path());

    // One airborne low-speed snapshot: stall_or_low_speed fires urgent.
    let snapshot = FlightSnapshot {
        timestamp_sec: 100.0,
        on_ground: false,
        indicated_airspeed_kt: Some(45.0),
        vertical_speed_fpm: Some(-200.0),
        ..FlightSnapshot::default()
    };

    let texts = Arc::new(Mutex::new(Vec::new()));
    let review_calls = Arc::new(Mutex::new(0));
    let mut runtime = build_runtime(
        &config,
        vec![snapshot],
        Arc::clone(&texts),
        Arc::clone(&review_calls),
        "Watch your trend and keep refining the profile.",
        true,
    );
    runtime.run(Some(0.3)).await.unwrap();

    let texts = texts.lock().unwrap();
    assert!(
        texts.iter().any(|t| t.contains("Airspeed critical")),
        "urgent callout should reach the transport"
    );
    assert!(
        texts.iter().all(|t| !t.contains("keep refining")),
        "coaching must be suppressed after a recent urgent callout"
    );
    assert!(*review_calls.lock().unwrap() >= 1);

    let events = read_events(&config.journal.runtime_events_log);
    assert!(!events_named(&events, "team_decision").is_empty());
    let suppressed = events_named(&events, "nonurgent_speech_suppressed");
    assert!(!suppressed.is_empty());
    assert!(suppressed
        .iter()
        .any(|e| e["reason"].as_str() == Some("recent_urgent")));
}

#[tokio::test]
async fn nonurgent_coaching_spoken_without_recent_urgent() {
    let tmpdir = tempfile::tempdir().unwrap();
    let config = test_config(tmpdir.path());

    // Parked on the ramp: no hazards fire.
    let snapshot = FlightSnapshot {
        timestamp_sec: 100.0,
        on_ground: true,
        elevation_m: Some(100.0),
        groundspeed_m_s: Some(0.0),
        indicated_airspeed_kt: Some(0.0),
        vertical_speed_fpm: Some(0.0),
        parking_brake_ratio: Some(1.0),
        ..FlightSnapshot::default()
    };

    let texts = Arc::new(Mutex::new(Vec::new()));
    let review_calls = Arc::new(Mutex::new(0));
    let mut runtime = build_runtime(
        &config,
        vec![snapshot],
        Arc::clone(&texts),
        Arc::clone(&review_calls),
        "Hold the centerline during your next taxi.",
        true,
    );
    runtime.run(Some(0.3)).await.unwrap();

    let texts = texts.lock().unwrap();
    assert!(texts.iter().any(|t| t.contains("Hold the centerline")));
    assert!(*review_calls.lock().unwrap() >= 1);

    let events = read_events(&config.journal.runtime_events_log);
    let spoken = events_named(&events, "nonurgent_speech");
    assert!(spoken.iter().any(|e| e["spoken"].as_bool() == Some(true)));
}

#[tokio::test]
async fn no_nonurgent_flag_logs_reviews_but_never_speaks_them() {
    let tmpdir = tempfile::tempdir().unwrap();
    let config = test_config(tmpdir.path());

    let snapshot = FlightSnapshot {
        timestamp_sec: 100.0,
        on_ground: true,
        elevation_m: Some(100.0),
        groundspeed_m_s: Some(0.0),
        parking_brake_ratio: Some(1.0),
        ..FlightSnapshot::default()
    };

    let texts = Arc::new(Mutex::new(Vec::new()));
    let review_calls = Arc::new(Mutex::new(0));
    let mut runtime = build_runtime(
        &config,
        vec![snapshot],
        Arc::clone(&texts),
        Arc::clone(&review_calls),
        "Hold the centerline during your next taxi.",
        false,
    );
    runtime.run(Some(0.3)).await.unwrap();

    assert!(texts.lock().unwrap().is_empty());
    let events = read_events(&config.journal.runtime_events_log);
    assert!(!events_named(&events, "team_decision").is_empty());
    assert!(events_named(&events, "nonurgent_speech").is_empty());
}

/// S5: a full cycle — takeoff, landing, engines-off dwell — emits exactly
/// one shutdown detection and one debrief, and the next engine-on taxi
/// starts flight #2 with a clean session.
#[tokio::test]
async fn shutdown_cycle_emits_one_debrief_then_restarts() {
    let tmpdir = tempfile::tempdir().unwrap();
    let mut config = test_config(tmpdir.path());
    // Keep reviews out of the way; this scenario is about the debrief.
    config.review.review_tick_sec = 1_000.0;

    let ground = |t: f64, gs_m_s: f64, ias: f64, throttle: f64, engine_on: bool| FlightSnapshot {
        timestamp_sec: t,
        on_ground: true,
        elevation_m: Some(100.0),
        groundspeed_m_s: Some(gs_m_s),
        indicated_airspeed_kt: Some(ias),
        vertical_speed_fpm: Some(0.0),
        throttle_ratio: Some(throttle),
        parking_brake_ratio: Some(1.0),
        engine_running: Some(engine_on),
        engine_rpm: Some(if engine_on { 2_200.0 } else { 0.0 }),
        ..FlightSnapshot::default()
    };
    let airborne = |t: f64, elevation: f64, vs: f64| FlightSnapshot {
        timestamp_sec: t,
        on_ground: false,
        elevation_m: Some(elevation),
        groundspeed_m_s: Some(40.0),
        indicated_airspeed_kt: Some(75.0),
        vertical_speed_fpm: Some(vs),
        throttle_ratio: Some(0.9),
        engine_running: Some(true),
        engine_rpm: Some(2_400.0),
        ..FlightSnapshot::default()
    };

    let mut script = vec![
        ground(0.0, 0.0, 0.0, 0.0, true),
        ground(1.0, 20.0, 45.0, 0.9, true),
        airborne(2.0, 130.0, 800.0),
        airborne(3.0, 160.0, 800.0),
        airborne(4.0, 200.0, 500.0),
        airborne(5.0, 220.0, 300.0),
        ground(6.0, 10.0, 25.0, 0.1, true),
    ];
    // Parked with engines off: supervisor dwell (4 s) runs from the tick
    // where TAXI_IN confirms.
    for t in 7..=13 {
        script.push(ground(f64::from(t), 0.5, 1.0, 0.0, false));
    }
    // Engine-on taxi starts the next flight.
    script.push(ground(14.0, 0.5, 1.0, 0.5, true));

    let texts = Arc::new(Mutex::new(Vec::new()));
    let review_calls = Arc::new(Mutex::new(0));
    let mut runtime = build_runtime(
        &config,
        script,
        Arc::clone(&texts),
        Arc::clone(&review_calls),
        "Keep the pattern tight next time.",
        true,
    );
    runtime.run(Some(0.6)).await.unwrap();

    let events = read_events(&config.journal.runtime_events_log);
    assert_eq!(events_named(&events, "engine_shutdown_detected").len(), 1);
    assert_eq!(events_named(&events, "shutdown_debrief").len(), 1);

    let cycles = events_named(&events, "flight_cycle_started");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0]["flight_index"].as_u64(), Some(2));
    assert_eq!(runtime.flight_index(), 2);
    assert!(!runtime.shutdown_debrief_emitted());

    // The debrief went through the team and was spoken.
    assert!(texts
        .lock()
        .unwrap()
        .iter()
        .any(|t| t.contains("Keep the pattern tight")));
}
