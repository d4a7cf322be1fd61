//! Coach configuration - all supervisor tunables as TOML + env values
//!
//! Every threshold carries a `Default` matching the shipped behavior, so
//! a missing config file changes nothing. Environment variables override
//! file values for the handful of options operators tune per machine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one supervisor deployment.
///
/// Load with `CoachConfig::load()` which searches:
/// 1. `$SKYCOACH_CONFIG` env var
/// 2. `./skycoach.toml`
/// 3. Built-in defaults
/// and then applies `SKYCOACH_*` environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoachConfig {
    /// Simulator UDP link
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Speech endpoint and cooldowns
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Expert-team endpoint
    #[serde(default)]
    pub team: TeamConfig,

    /// Review cadence
    #[serde(default)]
    pub review: ReviewConfig,

    /// Supervisor loop timing and shutdown detection
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Journal file paths
    #[serde(default)]
    pub journal: JournalConfig,
}

impl CoachConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env_overrides();
        config
    }

    fn load_file() -> Self {
        if let Ok(path) = std::env::var("SKYCOACH_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded coach config from SKYCOACH_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SKYCOACH_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SKYCOACH_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("skycoach.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded coach config from ./skycoach.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./skycoach.toml, using defaults");
                }
            }
        }

        info!("No skycoach.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SKYCOACH_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        override_string("SKYCOACH_UDP_HOST", &mut self.telemetry.host);
        override_parse("SKYCOACH_UDP_PORT", &mut self.telemetry.port);
        override_parse("SKYCOACH_UDP_LOCAL_PORT", &mut self.telemetry.local_port);
        override_parse("SKYCOACH_RREF_HZ", &mut self.telemetry.rref_hz);
        override_parse(
            "SKYCOACH_BEACON_ENABLED",
            &mut self.telemetry.discovery_enabled,
        );
        override_string(
            "SKYCOACH_BEACON_GROUP",
            &mut self.telemetry.beacon_multicast_group,
        );
        override_parse("SKYCOACH_BEACON_PORT", &mut self.telemetry.beacon_port);
        override_parse(
            "SKYCOACH_BEACON_TIMEOUT_SEC",
            &mut self.telemetry.beacon_timeout_sec,
        );

        override_string("SKYCOACH_SPEECH_URL", &mut self.speech.endpoint_url);
        override_parse(
            "SKYCOACH_URGENT_COOLDOWN_SEC",
            &mut self.speech.urgent_cooldown_sec,
        );
        override_parse(
            "SKYCOACH_NONURGENT_COOLDOWN_SEC",
            &mut self.speech.nonurgent_cooldown_sec,
        );
        override_parse(
            "SKYCOACH_NONURGENT_SUPPRESS_AFTER_URGENT_SEC",
            &mut self.speech.nonurgent_suppress_after_urgent_sec,
        );

        override_string("SKYCOACH_TEAM_URL", &mut self.team.endpoint_url);
        override_parse(
            "SKYCOACH_TEAM_TIMEOUT_SEC",
            &mut self.team.request_timeout_sec,
        );
        override_parse(
            "SKYCOACH_HAZARD_PHRASE_RUNTIME_ENABLED",
            &mut self.team.hazard_phrase_runtime_enabled,
        );

        override_parse(
            "SKYCOACH_REVIEW_WINDOW_SEC",
            &mut self.review.review_window_sec,
        );
        override_parse(
            "SKYCOACH_REVIEW_TICK_SEC",
            &mut self.review.review_tick_sec,
        );

        override_parse("SKYCOACH_POLL_SEC", &mut self.runtime.poll_sec);
        override_parse("SKYCOACH_RETRY_SEC", &mut self.runtime.start_retry_sec);
        override_parse(
            "SKYCOACH_START_MAX_RETRIES",
            &mut self.runtime.start_max_retries,
        );
        override_parse(
            "SKYCOACH_STARTUP_BOOTSTRAP_WAIT_SEC",
            &mut self.runtime.startup_bootstrap_wait_sec,
        );
        override_parse(
            "SKYCOACH_SHUTDOWN_DETECT_DWELL_SEC",
            &mut self.runtime.shutdown_detect_dwell_sec,
        );
        override_parse(
            "SKYCOACH_ENGINE_SHUTDOWN_HOLD_SEC",
            &mut self.runtime.engine_shutdown_hold_sec,
        );
        override_parse(
            "SKYCOACH_HAZARD_PHRASE_REFRESH_SEC",
            &mut self.runtime.hazard_phrase_refresh_sec,
        );
        override_parse(
            "SKYCOACH_MAX_FLIGHT_HOURS",
            &mut self.runtime.max_flight_hours,
        );

        override_string(
            "SKYCOACH_RUNTIME_EVENTS_LOG_PATH",
            &mut self.journal.runtime_events_log,
        );
        override_string(
            "SKYCOACH_TELEMETRY_LOG_PATH",
            &mut self.journal.telemetry_log,
        );
        override_string(
            "SKYCOACH_TEAM_CHAT_LOG_PATH",
            &mut self.journal.team_chat_log,
        );
        override_parse(
            "SKYCOACH_TELEMETRY_ENABLED",
            &mut self.journal.telemetry_enabled,
        );
    }

    /// Reject configurations the supervisor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.port == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.port must be > 0".to_string(),
            ));
        }
        if self.telemetry.local_port == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.local_port must be > 0".to_string(),
            ));
        }
        if !(1..=50).contains(&self.telemetry.rref_hz) {
            return Err(ConfigError::Invalid(format!(
                "telemetry.rref_hz must be in 1..=50, got {}",
                self.telemetry.rref_hz
            )));
        }
        if self.review.review_window_sec <= 0.0 || self.review.review_tick_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "review.review_window_sec and review.review_tick_sec must be > 0".to_string(),
            ));
        }
        if self.runtime.poll_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "runtime.poll_sec must be > 0".to_string(),
            ));
        }
        if self.runtime.shutdown_detect_dwell_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "runtime.shutdown_detect_dwell_sec must be > 0".to_string(),
            ));
        }
        if self.runtime.engine_shutdown_hold_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "runtime.engine_shutdown_hold_sec must be > 0".to_string(),
            ));
        }
        if self.runtime.hazard_phrase_refresh_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "runtime.hazard_phrase_refresh_sec must be > 0".to_string(),
            ));
        }
        if self.runtime.start_retry_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "runtime.start_retry_sec must be > 0".to_string(),
            ));
        }
        if self.speech.urgent_cooldown_sec < 0.0 || self.speech.nonurgent_cooldown_sec < 0.0 {
            return Err(ConfigError::Invalid(
                "speech cooldowns must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_string(name: &str, slot: &mut String) {
    if let Ok(raw) = std::env::var(name) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            *slot = trimmed.to_string();
        }
    }
}

fn override_parse<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!(var = name, value = %raw, "Ignoring unparseable env override"),
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Simulator UDP link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Simulator host. Empty, "auto", or "discover" requests beacon
    /// discovery; an explicit host always wins.
    #[serde(default = "default_udp_host")]
    pub host: String,
    #[serde(default = "default_udp_port")]
    pub port: u16,
    /// Local port the response stream is bound to.
    #[serde(default = "default_udp_local_port")]
    pub local_port: u16,
    /// Subscription rate in Hz, valid range 1..=50.
    #[serde(default = "default_rref_hz")]
    pub rref_hz: u32,
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,
    #[serde(default = "default_beacon_group")]
    pub beacon_multicast_group: String,
    #[serde(default = "default_beacon_port")]
    pub beacon_port: u16,
    #[serde(default = "default_beacon_timeout_sec")]
    pub beacon_timeout_sec: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: default_udp_host(),
            port: default_udp_port(),
            local_port: default_udp_local_port(),
            rref_hz: default_rref_hz(),
            discovery_enabled: default_true(),
            beacon_multicast_group: default_beacon_group(),
            beacon_port: default_beacon_port(),
            beacon_timeout_sec: default_beacon_timeout_sec(),
        }
    }
}

/// Speech endpoint and arbitration cooldowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_url")]
    pub endpoint_url: String,
    #[serde(default = "default_speech_timeout_sec")]
    pub request_timeout_sec: f64,
    /// Per-key cooldown on the urgent channel.
    #[serde(default = "default_urgent_cooldown_sec")]
    pub urgent_cooldown_sec: f64,
    /// Global cooldown on the non-urgent channel.
    #[serde(default = "default_nonurgent_cooldown_sec")]
    pub nonurgent_cooldown_sec: f64,
    /// Horizon within which a recent urgent utterance suppresses coaching.
    #[serde(default = "default_nonurgent_suppress_sec")]
    pub nonurgent_suppress_after_urgent_sec: f64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_speech_url(),
            request_timeout_sec: default_speech_timeout_sec(),
            urgent_cooldown_sec: default_urgent_cooldown_sec(),
            nonurgent_cooldown_sec: default_nonurgent_cooldown_sec(),
            nonurgent_suppress_after_urgent_sec: default_nonurgent_suppress_sec(),
        }
    }
}

/// Expert-team endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Empty disables the remote team; the supervisor then runs on
    /// deterministic fallback composers only.
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default = "default_team_timeout_sec")]
    pub request_timeout_sec: f64,
    /// Whether the runtime refreshes hazard speech variants from the team.
    #[serde(default = "default_true")]
    pub hazard_phrase_runtime_enabled: bool,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            request_timeout_sec: default_team_timeout_sec(),
            hazard_phrase_runtime_enabled: default_true(),
        }
    }
}

/// Non-urgent review cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Trailing window summarized per review (seconds).
    #[serde(default = "default_review_window_sec")]
    pub review_window_sec: f64,
    /// Interval between reviews (seconds).
    #[serde(default = "default_review_tick_sec")]
    pub review_tick_sec: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            review_window_sec: default_review_window_sec(),
            review_tick_sec: default_review_tick_sec(),
        }
    }
}

/// Supervisor loop timing, startup policy, and shutdown detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Tick-loop sleep between iterations (seconds).
    #[serde(default = "default_poll_sec")]
    pub poll_sec: f64,
    /// Delay between start-retry attempts (seconds).
    #[serde(default = "default_start_retry_sec")]
    pub start_retry_sec: f64,
    /// Bounded start attempts; zero means retry forever.
    #[serde(default)]
    pub start_max_retries: u32,
    /// How long to wait for initial snapshots before bootstrap (seconds).
    #[serde(default = "default_bootstrap_wait_sec")]
    pub startup_bootstrap_wait_sec: f64,
    /// Dwell before the supervisor's shutdown path fires (seconds).
    #[serde(default = "default_shutdown_dwell_sec")]
    pub shutdown_detect_dwell_sec: f64,
    /// Continuous engines-off hold for rule-engine shutdown (seconds).
    #[serde(default = "default_engine_shutdown_hold_sec")]
    pub engine_shutdown_hold_sec: f64,
    /// Cadence of hazard speech-variant refreshes (seconds).
    #[serde(default = "default_phrase_refresh_sec")]
    pub hazard_phrase_refresh_sec: f64,
    /// Maximum run duration in hours; zero means unlimited.
    #[serde(default)]
    pub max_flight_hours: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_sec: default_poll_sec(),
            start_retry_sec: default_start_retry_sec(),
            start_max_retries: 0,
            startup_bootstrap_wait_sec: default_bootstrap_wait_sec(),
            shutdown_detect_dwell_sec: default_shutdown_dwell_sec(),
            engine_shutdown_hold_sec: default_engine_shutdown_hold_sec(),
            hazard_phrase_refresh_sec: default_phrase_refresh_sec(),
            max_flight_hours: 0.0,
        }
    }
}

/// Append-only JSONL journal paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_runtime_events_log")]
    pub runtime_events_log: String,
    #[serde(default = "default_telemetry_log")]
    pub telemetry_log: String,
    #[serde(default = "default_team_chat_log")]
    pub team_chat_log: String,
    /// Whether counter records are written to the telemetry journal.
    #[serde(default)]
    pub telemetry_enabled: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            runtime_events_log: default_runtime_events_log(),
            telemetry_log: default_telemetry_log(),
            team_chat_log: default_team_chat_log(),
            telemetry_enabled: false,
        }
    }
}

// ============================================================================
// Serde default functions
// ============================================================================

fn default_true() -> bool {
    true
}
fn default_udp_host() -> String {
    "127.0.0.1".to_string()
}
fn default_udp_port() -> u16 {
    49_000
}
fn default_udp_local_port() -> u16 {
    49_001
}
fn default_rref_hz() -> u32 {
    10
}
fn default_beacon_group() -> String {
    "239.255.1.1".to_string()
}
fn default_beacon_port() -> u16 {
    49_707
}
fn default_beacon_timeout_sec() -> f64 {
    5.0
}
fn default_speech_url() -> String {
    "http://127.0.0.1:8765/speak".to_string()
}
fn default_speech_timeout_sec() -> f64 {
    10.0
}
fn default_urgent_cooldown_sec() -> f64 {
    8.0
}
fn default_nonurgent_cooldown_sec() -> f64 {
    45.0
}
fn default_nonurgent_suppress_sec() -> f64 {
    12.0
}
fn default_team_timeout_sec() -> f64 {
    120.0
}
fn default_review_window_sec() -> f64 {
    30.0
}
fn default_review_tick_sec() -> f64 {
    10.0
}
fn default_poll_sec() -> f64 {
    0.05
}
fn default_start_retry_sec() -> f64 {
    3.0
}
fn default_bootstrap_wait_sec() -> f64 {
    8.0
}
fn default_shutdown_dwell_sec() -> f64 {
    8.0
}
fn default_engine_shutdown_hold_sec() -> f64 {
    15.0
}
fn default_phrase_refresh_sec() -> f64 {
    90.0
}
fn default_runtime_events_log() -> String {
    "runtime.events.log.jsonl".to_string()
}
fn default_telemetry_log() -> String {
    "telemetry.log.jsonl".to_string()
}
fn default_team_chat_log() -> String {
    "team.chat.log.jsonl".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        CoachConfig::default().validate().unwrap();
    }

    #[test]
    fn rate_out_of_range_rejected() {
        let mut config = CoachConfig::default();
        config.telemetry.rref_hz = 0;
        assert!(config.validate().is_err());
        config.telemetry.rref_hz = 51;
        assert!(config.validate().is_err());
        config.telemetry.rref_hz = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_sections_deserialize_with_partial_content() {
        let config: CoachConfig = toml::from_str(
            r#"
            [telemetry]
            host = "10.0.0.5"
            rref_hz = 20

            [review]
            review_tick_sec = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(config.telemetry.host, "10.0.0.5");
        assert_eq!(config.telemetry.rref_hz, 20);
        assert_eq!(config.telemetry.port, 49_000);
        assert_eq!(config.review.review_tick_sec, 5.0);
        assert_eq!(config.review.review_window_sec, 30.0);
    }
}
