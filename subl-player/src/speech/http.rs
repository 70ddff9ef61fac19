//! HTTP speech synthesis client

use super::{SpeechSynthesizer, SynthesisRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("subl-player/", env!("CARGO_PKG_VERSION"));

/// Posts `{ "text", "voice" }` to a synthesis endpoint and returns the body
pub struct HttpSynthesizer {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        debug!(voice = %request.voice, chars = request.text.len(), "Requesting speech synthesis");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Synthesis endpoint returned error");
            return Err(Error::Synthesis(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
