//! Expert-team seam
//!
//! The supervisor knows four operations and nothing else about the team:
//! review a window, bootstrap a session profile, refresh hazard speech
//! variants, and start/stop. The production implementation is a REST
//! client; tests script a deterministic fake; every operation may fail
//! and the supervisor degrades instead of crashing.

mod fallback;
mod rest;

pub use fallback::{compose_fallback_debrief, decision_from_value, extract_json_object};
pub use rest::RestExpertTeam;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{FlightSnapshot, ReviewWindow, SessionProfile, TeamDecision};

/// Expert-team errors
#[derive(Debug, Error)]
pub enum TeamError {
    #[error("Expert team is not configured")]
    Disabled,

    #[error("Expert team request timed out after {0:.0} s")]
    Timeout(f64),

    #[error("Expert team HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Expert team authentication failed: {0}")]
    Auth(String),

    #[error("Expert team returned an undecodable reply: {0}")]
    Decode(String),
}

impl TeamError {
    /// Auth failures are announced once and then suppressed; everything
    /// else is transient and simply skips the cycle.
    pub fn is_auth(&self) -> bool {
        matches!(self, TeamError::Auth(_))
    }
}

/// The four-operation expert-team contract.
#[async_trait]
pub trait ExpertTeam: Send {
    async fn start(&mut self) -> Result<(), TeamError>;

    async fn stop(&mut self);

    /// Turn one review window into coaching.
    async fn run_review(
        &mut self,
        window: &ReviewWindow,
        profile: Option<&SessionProfile>,
    ) -> Result<TeamDecision, TeamError>;

    /// Identify the aircraft and produce the session profile.
    async fn bootstrap_session(
        &mut self,
        snapshots: &[FlightSnapshot],
    ) -> Result<SessionProfile, TeamError>;

    /// Fresh spoken variants per hazard rule, biased by what has been
    /// firing recently.
    async fn refresh_hazard_phrase_variants(
        &mut self,
        profile: &SessionProfile,
        recent_alert_counts: &BTreeMap<String, u64>,
    ) -> Result<BTreeMap<String, Vec<String>>, TeamError>;
}
