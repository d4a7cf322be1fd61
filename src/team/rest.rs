//! REST expert-team client
//!
//! Posts JSON tasks to the configured endpoint and records the exchange
//! in the team transcript journal. An authentication failure latches:
//! it is surfaced once and every later call short-circuits until a
//! user-initiated restart.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use super::{decision_from_value, ExpertTeam, TeamError};
use crate::config::TeamConfig;
use crate::journal::{epoch_now, JsonlJournal};
use crate::types::{FlightSnapshot, ReviewWindow, SessionProfile, TeamDecision};

pub struct RestExpertTeam {
    http: reqwest::Client,
    base_url: String,
    request_timeout_sec: f64,
    chat_journal: JsonlJournal,
    auth_failed: bool,
}

impl RestExpertTeam {
    pub fn new(config: &TeamConfig, chat_journal: JsonlJournal) -> Result<Self, TeamError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.request_timeout_sec))
            .build()?;
        Ok(Self {
            http,
            base_url: config.endpoint_url.trim_end_matches('/').to_string(),
            request_timeout_sec: config.request_timeout_sec,
            chat_journal,
            auth_failed: false,
        })
    }

    fn ensure_usable(&self) -> Result<(), TeamError> {
        if self.base_url.is_empty() {
            return Err(TeamError::Disabled);
        }
        if self.auth_failed {
            return Err(TeamError::Auth(
                "authentication previously failed; restart to retry".to_string(),
            ));
        }
        Ok(())
    }

    async fn post(
        &mut self,
        path: &str,
        phase: &str,
        task: serde_json::Value,
    ) -> Result<String, TeamError> {
        self.ensure_usable()?;

        self.log_transcript(phase, "supervisor", &task.to_string());

        let result = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .json(&task)
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Err(TeamError::Timeout(self.request_timeout_sec)),
            Err(e) => return Err(TeamError::Http(e)),
        };

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            self.auth_failed = true;
            return Err(TeamError::Auth(format!(
                "endpoint returned {status}; check the team credentials"
            )));
        }
        if !status.is_success() {
            return Err(TeamError::Decode(format!("endpoint returned {status}")));
        }

        let body = resp.text().await.map_err(TeamError::Http)?;
        self.log_transcript(phase, "team", &body);
        Ok(body)
    }

    fn log_transcript(&self, phase: &str, source: &str, content: &str) {
        if let Err(e) = self.chat_journal.write(&json!({
            "ts": epoch_now(),
            "phase": phase,
            "source": source,
            "content": content,
        })) {
            warn!(error = %e, "Team transcript write failed");
        }
    }
}

#[async_trait]
impl ExpertTeam for RestExpertTeam {
    async fn start(&mut self) -> Result<(), TeamError> {
        if self.base_url.is_empty() {
            info!("Expert team not configured — running on deterministic fallbacks");
        } else {
            info!(endpoint = %self.base_url, "Expert team client ready");
        }
        Ok(())
    }

    async fn stop(&mut self) {}

    async fn run_review(
        &mut self,
        window: &ReviewWindow,
        profile: Option<&SessionProfile>,
    ) -> Result<TeamDecision, TeamError> {
        let task = json!({
            "review_window": window,
            "session_profile": profile,
            "instructions": {
                "output": "Return strict JSON: summary, feedback_items, speak_now, speak_text.",
            },
        });
        let body = self.post("review", window.phase.as_str(), task).await?;
        Ok(decision_from_value(&body, window.phase))
    }

    async fn bootstrap_session(
        &mut self,
        snapshots: &[FlightSnapshot],
    ) -> Result<SessionProfile, TeamError> {
        let task = json!({
            "snapshots": snapshots,
            "instructions": {
                "output": "Return strict JSON matching the session profile schema.",
            },
        });
        let body = self.post("bootstrap", "preflight", task).await?;
        serde_json::from_str(&body).map_err(|e| TeamError::Decode(e.to_string()))
    }

    async fn refresh_hazard_phrase_variants(
        &mut self,
        profile: &SessionProfile,
        recent_alert_counts: &BTreeMap<String, u64>,
    ) -> Result<BTreeMap<String, Vec<String>>, TeamError> {
        let task = json!({
            "session_profile": profile,
            "recent_alert_counts": recent_alert_counts,
            "instructions": {
                "output": "Return strict JSON: rule_id -> array of short spoken phrases.",
            },
        });
        let body = self.post("hazard_phrases", "any", task).await?;
        serde_json::from_str(&body).map_err(|e| TeamError::Decode(e.to_string()))
    }
}
