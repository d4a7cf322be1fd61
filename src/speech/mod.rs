//! Speech dispatch: phrase normalization, cooldown arbitration, transport
//!
//! Two channels share one downstream `speak` operation. Urgent callouts
//! are gated per alert key; non-urgent coaching is globally rate-limited
//! and additionally suppressed by the supervisor when an urgent callout
//! was recent. A dry-run mode skips the external call but still records
//! timestamps so arbitration behaves identically.

mod transport;

pub use transport::{HttpSpeechTransport, SpeechTransport};

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::config::defaults::SPEECH_PHRASE_MAX_CHARS;
use crate::config::SpeechConfig;

/// Speech endpoint errors
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Speech endpoint error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Speech endpoint returned status {0}")]
    ServerError(reqwest::StatusCode),

    #[error("Speech endpoint returned an undecodable body: {0}")]
    Decode(String),
}

// ============================================================================
// Phrase Normalization
// ============================================================================

/// Normalize a spoken phrase: collapse whitespace, truncate to the cap on
/// a word boundary, ensure terminal punctuation. Empty input stays empty.
pub fn normalize_phrase(text: &str) -> String {
    let mut value = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return value;
    }
    if value.chars().count() > SPEECH_PHRASE_MAX_CHARS {
        value = truncate_on_word_boundary(&value, SPEECH_PHRASE_MAX_CHARS);
    }
    if !value.ends_with(['.', '!', '?']) {
        value.push('.');
    }
    value
}

/// Cut at the last space inside the cap when that keeps at least 60% of
/// the allowed length; otherwise hard-cut at the cap. Trailing
/// separators are stripped either way.
fn truncate_on_word_boundary(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars + 1).collect();
    let cut = match head.rfind(' ') {
        Some(boundary) if boundary >= max_chars * 6 / 10 => head[..boundary].to_string(),
        _ => text.chars().take(max_chars).collect(),
    };
    cut.trim_end_matches([' ', ',', ';', ':', '-']).to_string()
}

// ============================================================================
// Cooldown Arbiter
// ============================================================================

/// Cooldown-gated front door to the speech endpoint.
///
/// Owns the per-key urgent timestamps and the global non-urgent
/// timestamp. All cooldown checks happen here so the supervisor never
/// has to reason about timing.
pub struct SpeechSink {
    transport: Box<dyn SpeechTransport>,
    urgent_cooldown_sec: f64,
    nonurgent_cooldown_sec: f64,
    dry_run: bool,

    last_urgent_by_key: HashMap<String, f64>,
    last_urgent_epoch: f64,
    last_nonurgent_epoch: f64,
}

impl SpeechSink {
    pub fn new(config: &SpeechConfig, transport: Box<dyn SpeechTransport>, dry_run: bool) -> Self {
        Self {
            transport,
            urgent_cooldown_sec: config.urgent_cooldown_sec,
            nonurgent_cooldown_sec: config.nonurgent_cooldown_sec,
            dry_run,
            last_urgent_by_key: HashMap::new(),
            last_urgent_epoch: 0.0,
            last_nonurgent_epoch: 0.0,
        }
    }

    pub async fn start(&self) -> Result<(), SpeechError> {
        self.transport.start().await
    }

    pub async fn stop(&self) {
        self.transport.stop().await;
    }

    /// Speak on the urgent channel, honoring the per-key cooldown.
    ///
    /// Returns false without speaking when the key is cooling down or the
    /// endpoint reports failure; timestamps advance only on success.
    pub async fn speak_urgent(&mut self, text: &str, key: &str) -> Result<bool, SpeechError> {
        let now = epoch_now();
        let last = self.last_urgent_by_key.get(key).copied().unwrap_or(0.0);
        if now - last < self.urgent_cooldown_sec {
            debug!(key = key, "Urgent speech within cooldown — skipped");
            return Ok(false);
        }

        if !self.dry_run && !self.transport.speak(text).await? {
            return Ok(false);
        }

        self.last_urgent_by_key.insert(key.to_string(), now);
        self.last_urgent_epoch = now;
        Ok(true)
    }

    /// Speak on the non-urgent channel, honoring the global cooldown.
    pub async fn speak_nonurgent(&mut self, text: &str) -> Result<bool, SpeechError> {
        let now = epoch_now();
        if now - self.last_nonurgent_epoch < self.nonurgent_cooldown_sec {
            debug!("Non-urgent speech within cooldown — skipped");
            return Ok(false);
        }

        if !self.dry_run && !self.transport.speak(text).await? {
            return Ok(false);
        }

        self.last_nonurgent_epoch = now;
        Ok(true)
    }

    /// True iff the most recent urgent utterance is within the horizon.
    pub fn recent_urgent(&self, within_sec: f64) -> bool {
        epoch_now() - self.last_urgent_epoch <= within_sec.max(0.0)
    }
}

fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
