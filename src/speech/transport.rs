//! Speech transport - HTTP client for the `speak` RPC endpoint

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::SpeechError;
use crate::config::SpeechConfig;

/// The downstream `speak(message) -> { success }` operation.
///
/// The sink treats `Ok(false)` as a failed utterance and never retries.
#[async_trait]
pub trait SpeechTransport: Send {
    async fn start(&self) -> Result<(), SpeechError>;
    async fn stop(&self);
    async fn speak(&self, message: &str) -> Result<bool, SpeechError>;
}

#[derive(Debug, Deserialize)]
struct SpeakResponse {
    #[serde(default)]
    success: bool,
}

/// HTTP POST transport: `{"message": …}` in, `{"success": bool}` out.
pub struct HttpSpeechTransport {
    http: reqwest::Client,
    endpoint_url: String,
}

impl HttpSpeechTransport {
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs_f64(
                config.request_timeout_sec,
            ))
            .build()?;
        Ok(Self {
            http,
            endpoint_url: config.endpoint_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SpeechTransport for HttpSpeechTransport {
    async fn start(&self) -> Result<(), SpeechError> {
        info!(endpoint = %self.endpoint_url, "Speech transport ready");
        Ok(())
    }

    async fn stop(&self) {}

    async fn speak(&self, message: &str) -> Result<bool, SpeechError> {
        let resp = self
            .http
            .post(&self.endpoint_url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SpeechError::ServerError(status));
        }

        let body: SpeakResponse = resp
            .json()
            .await
            .map_err(|e| SpeechError::Decode(e.to_string()))?;
        Ok(body.success)
    }
}
