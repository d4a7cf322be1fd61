//! Hazard Monitor - urgent callout rules evaluated every tick
//!
//! Six deterministic rules gated by phase and the active [`HazardProfile`].
//! Thresholds come from the profile with literal fallbacks, so a thin
//! bootstrap profile still protects the flight. Spoken phrases rotate
//! through the profile's variant list without repeating the previous
//! pick.
//!
//! The profile lives behind an `ArcSwap`: the phrase refresher replaces
//! it wholesale and the monitor reads the current reference at the start
//! of each evaluation. No lock, no torn reads.

use arc_swap::ArcSwap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::defaults::{FIELD_ELEVATION_MAX_GS_KT, SPEECH_VARIANTS_PER_RULE};
use crate::speech::normalize_phrase;
use crate::types::{
    AlertSeverity, FlightPhase, FlightSnapshot, HazardAlert, HazardProfile, PhaseState,
};

/// Per-tick urgent rule evaluator.
pub struct HazardMonitor {
    profile: Arc<ArcSwap<HazardProfile>>,
    urgent_cooldown_sec: f64,
    rng: StdRng,
    last_variant_idx: HashMap<String, usize>,
    field_elevation_m: Option<f64>,
    taxi_in_rollout_cleared: bool,
}

impl HazardMonitor {
    pub fn new(profile: Arc<ArcSwap<HazardProfile>>, urgent_cooldown_sec: f64) -> Self {
        Self::with_rng(profile, urgent_cooldown_sec, StdRng::from_entropy())
    }

    /// Seeded construction for deterministic variant-rotation tests.
    pub fn with_rng(
        profile: Arc<ArcSwap<HazardProfile>>,
        urgent_cooldown_sec: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            profile,
            urgent_cooldown_sec,
            rng,
            last_variant_idx: HashMap::new(),
            field_elevation_m: None,
            taxi_in_rollout_cleared: false,
        }
    }

    /// Replace the whole profile (session bootstrap). Variant rotation
    /// state and the rollout latch restart with the new profile.
    pub fn set_profile(&mut self, profile: HazardProfile) {
        self.profile.store(Arc::new(profile));
        self.last_variant_idx.clear();
        self.taxi_in_rollout_cleared = false;
    }

    /// Forget the rotation state after an external variant refresh so the
    /// next pick starts fresh against the new lists.
    pub fn reset_variant_rotation(&mut self) {
        self.last_variant_idx.clear();
    }

    /// Evaluate all enabled rules against one snapshot.
    ///
    /// Alerts come back in rule-declaration order; the caller dispatches
    /// them to the urgent speech channel as-is.
    pub fn evaluate(&mut self, snapshot: &FlightSnapshot, phase_state: &PhaseState) -> Vec<HazardAlert> {
        let profile = self.profile.load_full();
        let mut alerts = Vec::new();
        let now = snapshot.timestamp_sec;

        let gs_kt = snapshot.groundspeed_kt_or_zero();
        if !snapshot.on_ground {
            // Re-arm the rollout latch for the next landing.
            self.taxi_in_rollout_cleared = false;
        }
        if snapshot.on_ground && gs_kt < FIELD_ELEVATION_MAX_GS_KT {
            if let Some(elevation) = snapshot.elevation_m {
                self.field_elevation_m = Some(elevation);
            }
        }

        let ias = snapshot.ias_kt_or_zero();
        let vs = snapshot.vs_fpm_or_zero();
        let bank_abs = snapshot.bank_abs_deg();
        let agl_ft = snapshot.agl_ft(self.field_elevation_m);

        if snapshot.on_ground {
            if profile.is_enabled("excessive_taxi_speed") {
                if !self.should_monitor_taxi_speed(&profile, snapshot, phase_state, gs_kt, ias) {
                    return alerts;
                }
                let max_taxi_speed = profile.threshold("max_taxi_speed_kt", 30.0);
                let max_taxi_ias = profile.threshold("max_taxi_ias_kt", 35.0);
                if gs_kt > max_taxi_speed || ias > max_taxi_ias {
                    alerts.push(self.alert(
                        &profile,
                        "excessive_taxi_speed",
                        AlertSeverity::Warning,
                        "Taxi speed exceeds configured limit.",
                        "Slow down taxi speed now and regain full directional control.",
                        now,
                    ));
                }
            }
            return alerts;
        }

        let stall_risk = snapshot.stall_warning
            || (ias < profile.threshold("low_airspeed_kt", 50.0)
                && agl_ft.map_or(true, |agl| {
                    agl > profile.threshold("low_airspeed_min_agl_ft", 100.0)
                }));
        if profile.is_enabled("stall_or_low_speed") && stall_risk {
            alerts.push(self.alert(
                &profile,
                "stall_or_low_speed",
                AlertSeverity::Critical,
                "Low energy / stall risk detected.",
                "Airspeed critical. Lower the nose and add power now.",
                now,
            ));
        }

        if profile.is_enabled("excessive_sink_low_alt") {
            if let Some(agl) = agl_ft {
                if agl < profile.threshold("excessive_sink_max_agl_ft", 1000.0)
                    && vs < profile.threshold("excessive_sink_fpm", -1500.0)
                {
                    alerts.push(self.alert(
                        &profile,
                        "excessive_sink_low_alt",
                        AlertSeverity::Critical,
                        "Excessive sink rate at low altitude.",
                        "Sink rate. Reduce descent and stabilize immediately.",
                        now,
                    ));
                }
            }
        }

        if profile.is_enabled("high_bank_low_alt") {
            if let Some(agl) = agl_ft {
                if agl < profile.threshold("high_bank_max_agl_ft", 1000.0)
                    && bank_abs > profile.threshold("high_bank_deg", 45.0)
                {
                    alerts.push(self.alert(
                        &profile,
                        "high_bank_low_alt",
                        AlertSeverity::Critical,
                        "High bank angle at low altitude.",
                        "Bank angle. Roll wings level and stabilize the approach.",
                        now,
                    ));
                }
            }
        }

        if profile.is_enabled("pull_up_now") {
            if let Some(agl) = agl_ft {
                if agl < profile.threshold("pull_up_max_agl_ft", 300.0)
                    && vs < profile.threshold("pull_up_fpm", -1000.0)
                {
                    alerts.push(self.alert(
                        &profile,
                        "pull_up_now",
                        AlertSeverity::Critical,
                        "Impact risk: very high descent close to ground.",
                        "Pull up. Arrest descent now.",
                        now,
                    ));
                }
            }
        }

        if profile.is_enabled("unstable_approach_fast_or_sink")
            && matches!(phase_state.phase, FlightPhase::Approach | FlightPhase::Landing)
        {
            if let Some(agl) = agl_ft {
                if agl < profile.threshold("unstable_approach_max_agl_ft", 1000.0)
                    && (ias > profile.threshold("unstable_approach_max_ias_kt", 95.0)
                        || vs < profile.threshold("unstable_approach_min_sink_fpm", -1000.0))
                {
                    alerts.push(self.alert(
                        &profile,
                        "unstable_approach_fast_or_sink",
                        AlertSeverity::Critical,
                        "Approach stability limits exceeded.",
                        "Unstable approach. Correct now or execute a go-around.",
                        now,
                    ));
                }
            }
        }

        alerts
    }

    /// Taxi-speed gating: only in taxi phases, never during a takeoff
    /// ground roll, and not until the after-landing rollout has decayed
    /// below taxi speeds at least once.
    fn should_monitor_taxi_speed(
        &mut self,
        profile: &HazardProfile,
        snapshot: &FlightSnapshot,
        phase_state: &PhaseState,
        gs_kt: f64,
        ias: f64,
    ) -> bool {
        let phase = phase_state.phase;
        if !phase.is_taxi() {
            return false;
        }

        if phase == FlightPhase::TaxiOut && self.is_takeoff_ground_roll(profile, snapshot, gs_kt, ias)
        {
            return false;
        }

        if phase == FlightPhase::TaxiIn && !self.taxi_in_rollout_cleared {
            let clear_gs = profile.threshold("taxi_in_rollout_clear_gs_kt", 25.0);
            let clear_ias = profile.threshold("taxi_in_rollout_clear_ias_kt", 30.0);
            if gs_kt <= clear_gs && ias <= clear_ias {
                self.taxi_in_rollout_cleared = true;
            } else {
                return false;
            }
        }

        true
    }

    fn is_takeoff_ground_roll(
        &self,
        profile: &HazardProfile,
        snapshot: &FlightSnapshot,
        gs_kt: f64,
        ias: f64,
    ) -> bool {
        let throttle = snapshot.throttle_ratio.unwrap_or(0.0);
        let thr_takeoff = profile.threshold("taxi_takeoff_roll_throttle_ratio", 0.65);
        let ias_takeoff = profile.threshold("taxi_takeoff_roll_ias_kt", 35.0);
        let gs_takeoff = profile.threshold("taxi_takeoff_roll_gs_kt", 30.0);
        throttle >= thr_takeoff && (ias >= ias_takeoff || gs_kt >= gs_takeoff)
    }

    fn alert(
        &mut self,
        profile: &HazardProfile,
        alert_id: &str,
        severity: AlertSeverity,
        message: &str,
        fallback_speak: &str,
        now: f64,
    ) -> HazardAlert {
        HazardAlert {
            alert_id: alert_id.to_string(),
            severity,
            message: message.to_string(),
            speak_text: self.speak_for(profile, alert_id, fallback_speak),
            cooldown_sec: self.urgent_cooldown_sec,
            triggered_at_epoch: now,
        }
    }

    /// Pick the spoken phrase for a rule.
    ///
    /// Single-variant lists always return that text. Multi-variant lists
    /// pick a random index and bump by one when it matches the previous
    /// pick, so adjacent utterances of the same rule never repeat.
    fn speak_for(&mut self, profile: &HazardProfile, alert_id: &str, fallback: &str) -> String {
        let variants: Vec<String> = profile
            .speech_variants
            .get(alert_id)
            .map(|raw| {
                raw.iter()
                    .map(|line| normalize_phrase(line))
                    .filter(|line| !line.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if variants.is_empty() {
            let normalized = normalize_phrase(fallback);
            return if normalized.is_empty() {
                fallback.to_string()
            } else {
                normalized
            };
        }
        if variants.len() == 1 {
            self.last_variant_idx.insert(alert_id.to_string(), 0);
            return variants[0].clone();
        }

        let mut idx = self.rng.gen_range(0..variants.len());
        if let Some(&prev) = self.last_variant_idx.get(alert_id) {
            if idx == prev % variants.len() {
                idx = (idx + 1) % variants.len();
            }
        }
        self.last_variant_idx.insert(alert_id.to_string(), idx);
        variants[idx].clone()
    }
}

/// Merge refreshed speech variants into a profile without touching
/// thresholds or the enabled-rule set. Used by the phrase refresher to
/// build the replacement profile it swaps in.
pub fn merge_speech_variants(
    profile: &HazardProfile,
    variants: &BTreeMap<String, Vec<String>>,
) -> HazardProfile {
    let mut merged = profile.clone();
    for (rule, lines) in variants {
        let cleaned: Vec<String> = lines
            .iter()
            .map(|line| normalize_phrase(line))
            .filter(|line| !line.is_empty())
            .take(SPEECH_VARIANTS_PER_RULE)
            .collect();
        if !cleaned.is_empty() {
            merged.speech_variants.insert(rule.clone(), cleaned);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PhaseState;

    fn monitor_with(profile: HazardProfile, seed: u64) -> HazardMonitor {
        HazardMonitor::with_rng(
            Arc::new(ArcSwap::from_pointee(profile)),
            8.0,
            StdRng::seed_from_u64(seed),
        )
    }

    fn airborne_phase(phase: FlightPhase) -> PhaseState {
        PhaseState {
            phase,
            confidence: 1.0,
            changed: false,
            previous_phase: None,
            changed_at_epoch: None,
        }
    }

    #[test]
    fn variant_rotation_never_repeats_adjacent() {
        let mut profile = HazardProfile::default();
        profile.speech_variants.insert(
            "stall_or_low_speed".to_string(),
            vec![
                "Airspeed low".to_string(),
                "Add power".to_string(),
                "Nose down".to_string(),
            ],
        );
        let mut monitor = monitor_with(profile, 7);

        let snapshot = FlightSnapshot {
            timestamp_sec: 10.0,
            on_ground: false,
            indicated_airspeed_kt: Some(40.0),
            ..FlightSnapshot::default()
        };
        let phase = airborne_phase(FlightPhase::Cruise);

        let mut previous: Option<String> = None;
        for _ in 0..50 {
            let alerts = monitor.evaluate(&snapshot, &phase);
            assert_eq!(alerts.len(), 1);
            let text = alerts[0].speak_text.clone();
            if let Some(prev) = &previous {
                assert_ne!(prev, &text, "adjacent utterances must differ");
            }
            previous = Some(text);
        }
    }

    #[test]
    fn single_variant_list_always_returns_it() {
        let mut profile = HazardProfile::default();
        profile.speech_variants.insert(
            "pull_up_now".to_string(),
            vec!["Pull up immediately".to_string()],
        );
        let mut monitor = monitor_with(profile, 1);

        let snapshot = FlightSnapshot {
            timestamp_sec: 5.0,
            on_ground: false,
            elevation_m: Some(160.0),
            vertical_speed_fpm: Some(-1500.0),
            indicated_airspeed_kt: Some(80.0),
            ..FlightSnapshot::default()
        };
        // Learn field elevation first so AGL is defined.
        let ground = FlightSnapshot {
            timestamp_sec: 1.0,
            on_ground: true,
            elevation_m: Some(100.0),
            groundspeed_m_s: Some(0.0),
            parking_brake_ratio: Some(1.0),
            ..FlightSnapshot::default()
        };
        monitor.evaluate(&ground, &airborne_phase(FlightPhase::Preflight));

        for _ in 0..3 {
            let alerts = monitor.evaluate(&snapshot, &airborne_phase(FlightPhase::Approach));
            let pull_up = alerts
                .iter()
                .find(|a| a.alert_id == "pull_up_now")
                .expect("pull_up_now should fire");
            assert_eq!(pull_up.speak_text, "Pull up immediately.");
        }
    }

    #[test]
    fn takeoff_ground_roll_suppresses_taxi_speed() {
        let mut monitor = monitor_with(HazardProfile::default(), 2);
        // S2: 19 m/s (~37 kt) with takeoff throttle — no alert.
        let snapshot = FlightSnapshot {
            timestamp_sec: 3.0,
            on_ground: true,
            groundspeed_m_s: Some(19.0),
            indicated_airspeed_kt: Some(44.0),
            throttle_ratio: Some(0.9),
            ..FlightSnapshot::default()
        };
        let alerts = monitor.evaluate(&snapshot, &airborne_phase(FlightPhase::TaxiOut));
        assert!(alerts.is_empty());
    }

    #[test]
    fn taxi_in_waits_for_rollout_to_clear() {
        let mut monitor = monitor_with(HazardProfile::default(), 3);
        let phase = airborne_phase(FlightPhase::TaxiIn);

        // Still decelerating through 45 kt: suppressed.
        let rollout = FlightSnapshot {
            timestamp_sec: 1.0,
            on_ground: true,
            groundspeed_m_s: Some(23.0),
            indicated_airspeed_kt: Some(45.0),
            ..FlightSnapshot::default()
        };
        assert!(monitor.evaluate(&rollout, &phase).is_empty());

        // Decayed below taxi speeds once: latch clears.
        let slow = FlightSnapshot {
            timestamp_sec: 5.0,
            on_ground: true,
            groundspeed_m_s: Some(5.0),
            indicated_airspeed_kt: Some(10.0),
            ..FlightSnapshot::default()
        };
        assert!(monitor.evaluate(&slow, &phase).is_empty());

        // Speeding up again on the way to parking now alerts.
        let speeding = FlightSnapshot {
            timestamp_sec: 9.0,
            on_ground: true,
            groundspeed_m_s: Some(18.0),
            indicated_airspeed_kt: Some(20.0),
            ..FlightSnapshot::default()
        };
        let alerts = monitor.evaluate(&speeding, &phase);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_id, "excessive_taxi_speed");
    }

    #[test]
    fn profile_thresholds_override_literals() {
        let mut profile = HazardProfile::default();
        profile
            .thresholds
            .insert("low_airspeed_kt".to_string(), 42.0);
        let mut monitor = monitor_with(profile, 4);

        // 45 kt is above the overridden 42 kt floor: quiet.
        let snapshot = FlightSnapshot {
            timestamp_sec: 2.0,
            on_ground: false,
            indicated_airspeed_kt: Some(45.0),
            ..FlightSnapshot::default()
        };
        let alerts = monitor.evaluate(&snapshot, &airborne_phase(FlightPhase::Cruise));
        assert!(alerts.iter().all(|a| a.alert_id != "stall_or_low_speed"));
    }

    #[test]
    fn merge_keeps_thresholds_and_caps_variants() {
        let mut profile = HazardProfile::default();
        profile.thresholds.insert("high_bank_deg".to_string(), 50.0);

        let mut refresh = BTreeMap::new();
        refresh.insert(
            "high_bank_low_alt".to_string(),
            (0..10).map(|i| format!("variant {i}")).collect::<Vec<_>>(),
        );
        refresh.insert("unknown_rule".to_string(), vec!["   ".to_string()]);

        let merged = merge_speech_variants(&profile, &refresh);
        assert_eq!(merged.thresholds.get("high_bank_deg"), Some(&50.0));
        assert_eq!(
            merged.speech_variants["high_bank_low_alt"].len(),
            SPEECH_VARIANTS_PER_RULE
        );
        assert!(!merged.speech_variants.contains_key("unknown_rule"));
    }
}
