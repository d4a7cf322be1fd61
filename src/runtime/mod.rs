//! Runtime Supervisor - the tick loop that composes the pipeline
//!
//! Owns every component and all mutable session state. Per tick:
//! snapshot -> phase tracker -> hazard monitor -> urgent speech ->
//! rule engine -> shutdown check. Non-urgent reviews run between ticks
//! on their own cadence; a child task refreshes hazard speech variants;
//! a confirmed shutdown emits the full-flight debrief and arms the
//! new-flight detector for the next cycle.
//!
//! Transient failures (speech, team, review) are journaled and skipped;
//! they never cross the tick boundary.

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::defaults::{
    BOOTSTRAP_MIN_SNAPSHOTS, DEBRIEF_MAX_SNAPSHOTS, NEW_FLIGHT_BRAKE_RELEASED_RATIO,
    NEW_FLIGHT_GROUNDSPEED_M_S, NEW_FLIGHT_IAS_KT, NEW_FLIGHT_ROLLING_GS_M_S,
    NEW_FLIGHT_THROTTLE_RATIO, SESSION_BUFFER_CAP,
};
use crate::config::CoachConfig;
use crate::debrief;
use crate::hazards::{merge_speech_variants, HazardMonitor};
use crate::journal::{epoch_now, JsonlJournal, TelemetryCollector};
use crate::phase::FlightPhaseTracker;
use crate::review::ReviewWindowBuilder;
use crate::rules::RuleEngine;
use crate::speech::SpeechSink;
use crate::team::{compose_fallback_debrief, ExpertTeam, TeamError};
use crate::telemetry::TelemetrySource;
use crate::types::{
    FlightPhase, FlightSnapshot, HazardProfile, PhaseState, RuleFinding, SessionProfile,
};

/// Phrases that mark a review as priority coaching, exempt from
/// low-value suppression and eligible for the urgent fallback.
const PRIORITY_KEYWORDS: [&str; 7] = [
    "stall",
    "sink rate",
    "unstable",
    "hazard",
    "critical",
    "go around",
    "immediately",
];

/// Negations that mark a review as low-value filler.
const NEGATION_MARKERS: [&str; 5] = [
    "no issues",
    "no major",
    "no significant",
    "nothing to report",
    "looks good",
];

/// Verbs that make a nominally negative review still actionable.
const ACTION_KEYWORDS: [&str; 10] = [
    "maintain", "hold", "reduce", "increase", "watch", "correct", "adjust", "trim", "slow",
    "stabilize",
];

/// Synthetic urgent key used when priority coaching falls back to the
/// urgent channel.
const PRIORITY_FALLBACK_KEY: &str = "priority_coach";

// ============================================================================
// Dispatch Gating
// ============================================================================

/// Cooldown gate for repeated rule findings with the same id.
pub fn should_emit(last_emitted_epoch: Option<f64>, now_epoch: f64, cooldown_sec: f64) -> bool {
    match last_emitted_epoch {
        None => true,
        Some(last) => now_epoch - last >= cooldown_sec,
    }
}

/// New-flight activity test, applied only after a shutdown debrief.
///
/// Airborne always counts. On the ground the engine must be running and
/// the aircraft doing something: meaningful throttle, meaningful speed,
/// or rolling with the parking brake released.
pub fn is_new_flight_activity(snapshot: &FlightSnapshot) -> bool {
    if !snapshot.on_ground {
        return true;
    }
    if snapshot.engine_running != Some(true) {
        return false;
    }

    let throttle = snapshot.throttle_ratio.unwrap_or(0.0);
    let gs = snapshot.groundspeed_m_s.unwrap_or(0.0);
    let ias = snapshot.ias_kt_or_zero();
    let brake = snapshot.parking_brake_ratio.unwrap_or(1.0);

    throttle > NEW_FLIGHT_THROTTLE_RATIO
        || gs > NEW_FLIGHT_GROUNDSPEED_M_S
        || ias > NEW_FLIGHT_IAS_KT
        || (brake < NEW_FLIGHT_BRAKE_RELEASED_RATIO && gs > NEW_FLIGHT_ROLLING_GS_M_S)
}

/// Low-value filter: a negation phrase with no actionable verb.
pub fn is_low_value_coaching(text: &str) -> bool {
    let lower = text.to_lowercase();
    let negated = NEGATION_MARKERS.iter().any(|marker| lower.contains(marker));
    let actionable = ACTION_KEYWORDS.iter().any(|verb| lower.contains(verb));
    negated && !actionable
}

/// Priority filter: hazard-adjacent vocabulary anywhere in the text.
pub fn is_priority_coaching(text: &str) -> bool {
    let lower = text.to_lowercase();
    PRIORITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

// ============================================================================
// Runtime Options
// ============================================================================

/// Flags carried in from the CLI.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// When false, reviews still run and log but never speak.
    pub nonurgent_speak_enabled: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            nonurgent_speak_enabled: true,
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// The supervising event loop. Owns the only instances of the telemetry
/// source, trackers, evaluators, speech sink, and session state.
pub struct CoachRuntime {
    config: CoachConfig,
    options: RuntimeOptions,

    source: Box<dyn TelemetrySource>,
    speech: SpeechSink,
    team: Arc<Mutex<Box<dyn ExpertTeam>>>,

    phase_tracker: FlightPhaseTracker,
    hazard_profile: Arc<ArcSwap<HazardProfile>>,
    hazard_monitor: HazardMonitor,
    rule_engine: RuleEngine,
    review_builder: ReviewWindowBuilder,

    runtime_log: JsonlJournal,
    telemetry: TelemetryCollector,

    session_profile: Arc<RwLock<SessionProfile>>,
    alert_counts: Arc<RwLock<BTreeMap<String, u64>>>,

    phase_state: PhaseState,
    phase_history: Vec<FlightPhase>,
    session_snapshots: Vec<FlightSnapshot>,
    session_findings: Vec<RuleFinding>,
    finding_last_emitted: HashMap<String, f64>,

    last_snapshot_ts: f64,
    flight_index: u32,
    flight_started_epoch: f64,
    shutdown_candidate_since: Option<f64>,
    shutdown_debrief_emitted: bool,

    degraded_announced: HashSet<&'static str>,
    cancel: CancellationToken,
    refresher: Option<JoinHandle<()>>,
}

impl CoachRuntime {
    pub fn new(
        config: CoachConfig,
        options: RuntimeOptions,
        source: Box<dyn TelemetrySource>,
        speech: SpeechSink,
        team: Box<dyn ExpertTeam>,
    ) -> Self {
        let hazard_profile = Arc::new(ArcSwap::from_pointee(HazardProfile::default()));
        let hazard_monitor = HazardMonitor::new(
            Arc::clone(&hazard_profile),
            config.speech.urgent_cooldown_sec,
        );
        let rule_engine = RuleEngine::new(config.runtime.engine_shutdown_hold_sec);
        let runtime_log = JsonlJournal::new(&config.journal.runtime_events_log);
        let telemetry = TelemetryCollector::new(
            config.journal.telemetry_enabled,
            JsonlJournal::new(&config.journal.telemetry_log),
        );

        Self {
            config,
            options,
            source,
            speech,
            team: Arc::new(Mutex::new(team)),
            phase_tracker: FlightPhaseTracker::new(),
            hazard_profile,
            hazard_monitor,
            rule_engine,
            review_builder: ReviewWindowBuilder::new(),
            runtime_log,
            telemetry,
            session_profile: Arc::new(RwLock::new(SessionProfile::default())),
            alert_counts: Arc::new(RwLock::new(BTreeMap::new())),
            phase_state: PhaseState::initial(),
            phase_history: Vec::new(),
            session_snapshots: Vec::new(),
            session_findings: Vec::new(),
            finding_last_emitted: HashMap::new(),
            last_snapshot_ts: 0.0,
            flight_index: 1,
            flight_started_epoch: 0.0,
            shutdown_candidate_since: None,
            shutdown_debrief_emitted: false,
            degraded_announced: HashSet::new(),
            cancel: CancellationToken::new(),
            refresher: None,
        }
    }

    /// Token that stops the loop cleanly when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn flight_index(&self) -> u32 {
        self.flight_index
    }

    pub fn shutdown_debrief_emitted(&self) -> bool {
        self.shutdown_debrief_emitted
    }

    /// Run the supervisor until cancellation, the optional duration, or
    /// the configured maximum flight hours.
    pub async fn run(&mut self, duration_sec: Option<f64>) -> Result<()> {
        self.start_with_retry().await?;
        self.bootstrap_session().await;
        self.spawn_phrase_refresher();

        let start_epoch = epoch_now();
        self.flight_started_epoch = start_epoch;
        let mut next_review_epoch = start_epoch + self.config.review.review_tick_sec;
        let max_run_sec = self.config.runtime.max_flight_hours * 3600.0;

        info!(
            review_tick_sec = self.config.review.review_tick_sec,
            poll_sec = self.config.runtime.poll_sec,
            "Supervisor tick loop running"
        );

        while !self.cancel.is_cancelled() {
            let now = epoch_now();
            if let Some(limit) = duration_sec {
                if limit > 0.0 && now - start_epoch >= limit {
                    break;
                }
            }
            if max_run_sec > 0.0 && now - start_epoch >= max_run_sec {
                self.runtime_log.event(
                    "max_flight_hours_reached",
                    json!({ "max_flight_hours": self.config.runtime.max_flight_hours }),
                );
                break;
            }

            if let Some(snapshot) = self.source.latest() {
                if snapshot.timestamp_sec > self.last_snapshot_ts {
                    self.last_snapshot_ts = snapshot.timestamp_sec;
                    self.process_snapshot(&snapshot).await;
                }
            }

            if now >= next_review_epoch {
                self.run_nonurgent_review(now).await;
                next_review_epoch = now + self.config.review.review_tick_sec;
            }

            tokio::time::sleep(Duration::from_secs_f64(self.config.runtime.poll_sec)).await;
        }

        self.shutdown().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    async fn start_with_retry(&mut self) -> Result<()> {
        let retry_sec = self.config.runtime.start_retry_sec;
        let max_retries = self.config.runtime.start_max_retries;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let failure = match self.speech.start().await {
                Err(e) => Some(format!("speech: {e}")),
                Ok(()) => match self.source.start().await {
                    Err(e) => Some(format!("telemetry: {e}")),
                    Ok(()) => None,
                },
            };

            let Some(reason) = failure else {
                return Ok(());
            };

            warn!(attempt = attempt, reason = %reason, "Startup attempt failed");
            self.runtime_log.event(
                "start_retry",
                json!({ "attempt": attempt, "reason": reason }),
            );

            if max_retries > 0 && attempt >= max_retries {
                return Err(anyhow::anyhow!(
                    "startup failed after {attempt} attempts: {reason}"
                ))
                .context("supervisor start");
            }
            tokio::time::sleep(Duration::from_secs_f64(retry_sec)).await;
        }
    }

    /// Wait for initial telemetry, then ask the team for the session
    /// profile; degrade to the default trainer profile on any failure.
    async fn bootstrap_session(&mut self) {
        let deadline = epoch_now() + self.config.runtime.startup_bootstrap_wait_sec;
        let mut snapshots = Vec::new();
        while epoch_now() < deadline {
            snapshots = self
                .source
                .window(self.config.runtime.startup_bootstrap_wait_sec.max(30.0));
            if snapshots.len() >= BOOTSTRAP_MIN_SNAPSHOTS {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let started = {
            let mut team = self.team.lock().await;
            team.start().await
        };
        if let Err(e) = started {
            warn!(error = %e, "Expert team start failed — continuing degraded");
        }

        let profile = {
            let mut team = self.team.lock().await;
            team.bootstrap_session(&snapshots).await
        };
        let (profile, bootstrapped) = match profile {
            Ok(profile) => (profile, true),
            Err(e) => {
                self.note_team_error("bootstrap", &e).await;
                (SessionProfile::default(), false)
            }
        };

        info!(
            aircraft = %profile.aircraft_icao,
            category = %profile.category,
            confidence = profile.confidence,
            bootstrapped = bootstrapped,
            "Session profile active"
        );
        self.runtime_log.event(
            "session_bootstrap",
            json!({
                "flight_index": self.flight_index,
                "bootstrapped": bootstrapped,
                "profile": &profile,
                "snapshot_count": snapshots.len(),
            }),
        );

        self.hazard_monitor.set_profile(profile.hazard_profile.clone());
        let welcome = profile.welcome_message.clone();
        if let Ok(mut slot) = self.session_profile.write() {
            *slot = profile;
        }

        if self.options.nonurgent_speak_enabled && !welcome.trim().is_empty() {
            match self.speech.speak_nonurgent(welcome.trim()).await {
                Ok(spoken) => {
                    self.runtime_log
                        .event("welcome_speech", json!({ "spoken": spoken }));
                }
                Err(e) => debug!(error = %e, "Welcome speech failed"),
            }
        }
    }

    /// Child task: periodically ask the team for fresh hazard phrases and
    /// swap an updated profile in. Thresholds are never touched.
    fn spawn_phrase_refresher(&mut self) {
        if !self.config.team.hazard_phrase_runtime_enabled {
            return;
        }

        let team = Arc::clone(&self.team);
        let hazard_profile = Arc::clone(&self.hazard_profile);
        let session_profile = Arc::clone(&self.session_profile);
        let alert_counts = Arc::clone(&self.alert_counts);
        let journal = JsonlJournal::new(self.runtime_log.path());
        let cancel = self.cancel.clone();
        let refresh = Duration::from_secs_f64(self.config.runtime.hazard_phrase_refresh_sec);

        self.refresher = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let profile = session_profile.read().map(|p| p.clone()).ok();
                let counts = alert_counts.read().map(|c| c.clone()).unwrap_or_default();
                let Some(profile) = profile else { continue };

                let result = {
                    let mut team = team.lock().await;
                    team.refresh_hazard_phrase_variants(&profile, &counts).await
                };
                match result {
                    Ok(variants) if !variants.is_empty() => {
                        let current = hazard_profile.load_full();
                        hazard_profile.store(Arc::new(merge_speech_variants(&current, &variants)));
                        journal.event(
                            "hazard_phrases_refreshed",
                            json!({ "rules": variants.keys().collect::<Vec<_>>() }),
                        );
                    }
                    Ok(_) => debug!("Phrase refresh returned no variants"),
                    Err(e) => debug!(error = %e, "Phrase refresh failed"),
                }
            }
        }));
    }

    // ------------------------------------------------------------------
    // Per-Tick Processing
    // ------------------------------------------------------------------

    async fn process_snapshot(&mut self, snapshot: &FlightSnapshot) {
        if self.shutdown_debrief_emitted {
            if !is_new_flight_activity(snapshot) {
                return;
            }
            self.start_new_flight_cycle(snapshot);
        }

        if self.session_snapshots.len() >= SESSION_BUFFER_CAP {
            self.session_snapshots.remove(0);
        }
        self.session_snapshots.push(snapshot.clone());

        self.phase_state = self.phase_tracker.update(snapshot);
        if self.phase_state.changed {
            let previous = self
                .phase_state
                .previous_phase
                .map_or("none", |p| p.as_str());
            info!(
                previous = previous,
                phase = %self.phase_state.phase,
                confidence = self.phase_state.confidence,
                "Phase change"
            );
            self.phase_history.push(self.phase_state.phase);
            self.runtime_log.event(
                "phase_change",
                json!({
                    "flight_index": self.flight_index,
                    "phase": self.phase_state.phase,
                    "previous_phase": self.phase_state.previous_phase,
                    "confidence": self.phase_state.confidence,
                }),
            );
        }

        let findings = self.rule_engine.update(snapshot);
        for finding in findings {
            let last = self.finding_last_emitted.get(&finding.rule_id).copied();
            if !should_emit(last, finding.timestamp_epoch, finding.cooldown_sec) {
                continue;
            }
            self.finding_last_emitted
                .insert(finding.rule_id.clone(), finding.timestamp_epoch);
            self.runtime_log.event(
                "rule_finding",
                json!({
                    "flight_index": self.flight_index,
                    "finding": &finding,
                }),
            );
            self.session_findings.push(finding);
        }

        let alerts = self.hazard_monitor.evaluate(snapshot, &self.phase_state);
        for alert in alerts {
            if let Ok(mut counts) = self.alert_counts.write() {
                *counts.entry(alert.alert_id.clone()).or_insert(0) += 1;
            }

            let spoken = match self
                .speech
                .speak_urgent(&alert.speak_text, &alert.alert_id)
                .await
            {
                Ok(spoken) => spoken,
                Err(e) => {
                    warn!(error = %e, alert_id = %alert.alert_id, "Urgent speech failed");
                    false
                }
            };
            if spoken {
                info!(alert_id = %alert.alert_id, text = %alert.speak_text, "Urgent callout");
                self.telemetry.emit(
                    "urgent_alert_spoken",
                    1.0,
                    json!({ "alert_id": alert.alert_id.as_str() }),
                );
            }
            self.runtime_log.event(
                "hazard_alert",
                json!({
                    "flight_index": self.flight_index,
                    "phase": self.phase_state.phase,
                    "alert": &alert,
                    "spoken": spoken,
                }),
            );
        }

        if !self.shutdown_debrief_emitted {
            self.check_shutdown(snapshot).await;
        }
    }

    fn start_new_flight_cycle(&mut self, snapshot: &FlightSnapshot) {
        self.flight_index += 1;
        self.phase_tracker.reset();
        self.rule_engine.reset();
        self.review_builder.reset();
        self.session_snapshots.clear();
        self.session_findings.clear();
        self.phase_history.clear();
        self.finding_last_emitted.clear();
        if let Ok(mut counts) = self.alert_counts.write() {
            counts.clear();
        }
        self.phase_state = PhaseState::initial();
        self.shutdown_candidate_since = None;
        self.shutdown_debrief_emitted = false;
        self.flight_started_epoch = snapshot.timestamp_sec;

        info!(flight_index = self.flight_index, "New flight cycle started");
        self.runtime_log.event(
            "flight_cycle_started",
            json!({
                "flight_index": self.flight_index,
                "trigger_ts": snapshot.timestamp_sec,
            }),
        );
    }

    // ------------------------------------------------------------------
    // Shutdown Detection + Debrief
    // ------------------------------------------------------------------

    /// Two independent confirmations: the rule engine's engines-off hold,
    /// or the supervisor's own dwell over parked-and-quiet conditions.
    async fn check_shutdown(&mut self, snapshot: &FlightSnapshot) {
        let was_airborne = self.phase_tracker.was_airborne() || self.rule_engine.had_airborne();

        if self.rule_engine.shutdown_confirmed() {
            self.emit_shutdown(snapshot, "rule_engine_hold").await;
            return;
        }

        let parked_phase = matches!(
            self.phase_state.phase,
            FlightPhase::TaxiIn | FlightPhase::Preflight
        );
        let quiet = snapshot.groundspeed_kt_or_zero() < 2.0
            && snapshot.ias_kt_or_zero() < 8.0
            && snapshot.throttle_ratio.unwrap_or(0.0) < 0.12;
        let engines_stopped = match snapshot.engine_running {
            Some(running) => !running,
            None => match snapshot.engine_rpm {
                Some(rpm) => rpm <= 200.0,
                None => snapshot.parking_brake_ratio.unwrap_or(0.0) >= 0.5,
            },
        };

        let conditions = was_airborne && snapshot.on_ground && parked_phase && quiet && engines_stopped;
        if !conditions {
            self.shutdown_candidate_since = None;
            return;
        }

        match self.shutdown_candidate_since {
            None => self.shutdown_candidate_since = Some(snapshot.timestamp_sec),
            Some(since) => {
                if snapshot.timestamp_sec - since
                    >= self.config.runtime.shutdown_detect_dwell_sec
                {
                    self.emit_shutdown(snapshot, "supervisor_dwell").await;
                }
            }
        }
    }

    async fn emit_shutdown(&mut self, snapshot: &FlightSnapshot, trigger: &str) {
        info!(trigger = trigger, flight_index = self.flight_index, "Engine shutdown detected");
        self.runtime_log.event(
            "engine_shutdown_detected",
            json!({
                "flight_index": self.flight_index,
                "trigger": trigger,
                "ts_snapshot": snapshot.timestamp_sec,
            }),
        );

        self.run_flight_debrief().await;
        self.shutdown_debrief_emitted = true;
        self.shutdown_candidate_since = None;
    }

    async fn run_flight_debrief(&mut self) {
        let duration_sec = self
            .session_snapshots
            .last()
            .map(|s| s.timestamp_sec - self.flight_started_epoch)
            .unwrap_or(0.0);
        let sampled = debrief::downsample(&self.session_snapshots, DEBRIEF_MAX_SNAPSHOTS);

        let window = match self.review_builder.build(&sampled, self.phase_state.phase) {
            Ok(mut window) => {
                let counts = self
                    .alert_counts
                    .read()
                    .map(|c| c.clone())
                    .unwrap_or_default();
                window.event_hints.extend(debrief::flight_hints(
                    duration_sec,
                    &self.phase_history,
                    &counts,
                ));
                Some(window)
            }
            Err(e) => {
                warn!(error = %e, "Debrief window could not be built");
                None
            }
        };

        let profile = self.session_profile.read().map(|p| p.clone()).ok();

        let decision = match &window {
            Some(window) => {
                let mut team = self.team.lock().await;
                team.run_review(window, profile.as_ref()).await
            }
            None => Err(TeamError::Disabled),
        };

        let speak_text = match decision {
            Ok(decision) => {
                self.runtime_log.event(
                    "shutdown_debrief",
                    json!({
                        "flight_index": self.flight_index,
                        "fallback": false,
                        "decision": &decision,
                        "findings_total": self.session_findings.len(),
                    }),
                );
                pick_coach_text(&decision.speak_text, &decision.feedback_items, &decision.summary)
            }
            Err(e) => {
                if !matches!(e, TeamError::Disabled) {
                    self.note_team_error("debrief", &e).await;
                }
                let fallback = compose_fallback_debrief(&self.session_findings);
                let spoken = fallback.spoken_segments.join(" ");
                self.runtime_log.event(
                    "shutdown_debrief",
                    json!({
                        "flight_index": self.flight_index,
                        "fallback": true,
                        "debrief": &fallback,
                    }),
                );
                spoken
            }
        };

        if self.options.nonurgent_speak_enabled && !speak_text.trim().is_empty() {
            match self.speech.speak_nonurgent(speak_text.trim()).await {
                Ok(spoken) => {
                    self.runtime_log.event(
                        "debrief_speech",
                        json!({ "flight_index": self.flight_index, "spoken": spoken }),
                    );
                }
                Err(e) => debug!(error = %e, "Debrief speech failed"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Non-Urgent Review
    // ------------------------------------------------------------------

    async fn run_nonurgent_review(&mut self, now_epoch: f64) {
        let snapshots = self.source.window(self.config.review.review_window_sec);
        if snapshots.is_empty() {
            debug!("Review skipped: no snapshots in window");
            return;
        }

        let window = match self.review_builder.build(&snapshots, self.phase_state.phase) {
            Ok(window) => window,
            Err(e) => {
                self.runtime_log
                    .event("review_skipped", json!({ "reason": e.to_string() }));
                return;
            }
        };

        let profile = self.session_profile.read().map(|p| p.clone()).ok();
        let decision = {
            let mut team = self.team.lock().await;
            team.run_review(&window, profile.as_ref()).await
        };
        let decision = match decision {
            Ok(decision) => decision,
            Err(TeamError::Disabled) => {
                debug!("Review skipped: expert team not configured");
                return;
            }
            Err(e) => {
                self.note_team_error("review", &e).await;
                self.runtime_log
                    .event("review_skipped", json!({ "reason": e.to_string() }));
                return;
            }
        };

        info!(phase = %self.phase_state.phase, summary = %decision.summary, "Review complete");
        self.runtime_log.event(
            "team_decision",
            json!({
                "flight_index": self.flight_index,
                "phase": self.phase_state.phase,
                "review_window": &window,
                "decision": &decision,
            }),
        );

        if !self.options.nonurgent_speak_enabled {
            return;
        }

        let coach_text =
            pick_coach_text(&decision.speak_text, &decision.feedback_items, &decision.summary);
        if coach_text.trim().is_empty() {
            return;
        }

        let priority = is_priority_coaching(&coach_text);
        if is_low_value_coaching(&coach_text) && !priority {
            self.runtime_log.event(
                "nonurgent_speech_suppressed",
                json!({
                    "reason": "low_value",
                    "phase": self.phase_state.phase,
                }),
            );
            return;
        }

        if self
            .speech
            .recent_urgent(self.config.speech.nonurgent_suppress_after_urgent_sec)
        {
            self.runtime_log.event(
                "nonurgent_speech_suppressed",
                json!({
                    "reason": "recent_urgent",
                    "phase": self.phase_state.phase,
                }),
            );
            return;
        }

        let spoken = match self.speech.speak_nonurgent(coach_text.trim()).await {
            Ok(spoken) => spoken,
            Err(e) => {
                warn!(error = %e, "Non-urgent speech failed");
                false
            }
        };
        self.runtime_log.event(
            "nonurgent_speech",
            json!({
                "ts_review": now_epoch,
                "phase": self.phase_state.phase,
                "spoken": spoken,
                "text": coach_text.trim(),
            }),
        );
        if spoken {
            self.telemetry.emit(
                "nonurgent_speech_spoken",
                1.0,
                json!({ "phase": self.phase_state.phase }),
            );
            return;
        }

        // Priority coaching must land even when the non-urgent channel is
        // cooling down; escalate under a synthetic urgent key.
        if priority {
            let escalated = self
                .speech
                .speak_urgent(coach_text.trim(), PRIORITY_FALLBACK_KEY)
                .await
                .unwrap_or(false);
            self.runtime_log.event(
                "nonurgent_priority_escalated",
                json!({
                    "phase": self.phase_state.phase,
                    "spoken": escalated,
                }),
            );
        }
    }

    // ------------------------------------------------------------------
    // Degraded Modes + Teardown
    // ------------------------------------------------------------------

    async fn note_team_error(&mut self, operation: &str, error: &TeamError) {
        if error.is_auth() {
            error!(operation = operation, error = %error, "Expert team authentication failed");
            self.announce_degraded("expert coaching").await;
        } else {
            warn!(operation = operation, error = %error, "Expert team call failed");
        }
        self.runtime_log.event(
            "team_error",
            json!({ "operation": operation, "error": error.to_string(), "auth": error.is_auth() }),
        );
    }

    /// Announce a degraded collaborator once per session.
    async fn announce_degraded(&mut self, component: &'static str) {
        if !self.degraded_announced.insert(component) {
            return;
        }
        let line = format!("Limited monitoring: {component} unavailable.");
        let spoken = self
            .speech
            .speak_nonurgent(&line)
            .await
            .unwrap_or(false);
        self.runtime_log.event(
            "degraded_mode",
            json!({ "component": component, "spoken": spoken }),
        );
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(refresher) = self.refresher.take() {
            let _ = refresher.await;
        }
        {
            let mut team = self.team.lock().await;
            team.stop().await;
        }
        self.source.stop().await;
        self.speech.stop().await;

        info!(
            flight_index = self.flight_index,
            findings = self.session_findings.len(),
            snapshots = self.session_snapshots.len(),
            "Supervisor stopped"
        );
        self.runtime_log.event(
            "supervisor_stopped",
            json!({
                "flight_index": self.flight_index,
                "findings": self.session_findings.len(),
            }),
        );
    }
}

/// Spoken coaching selection: explicit speak text, else the first
/// non-empty feedback item, else the summary.
fn pick_coach_text(speak_text: &str, feedback_items: &[String], summary: &str) -> String {
    let speak = speak_text.trim();
    if !speak.is_empty() {
        return speak.to_string();
    }
    if let Some(item) = feedback_items.iter().map(|s| s.trim()).find(|s| !s.is_empty()) {
        return item.to_string();
    }
    summary.trim().to_string()
}
