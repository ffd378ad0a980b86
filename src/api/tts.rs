//! Text-to-speech endpoint

use async_trait::async_trait;

use super::{ApiClient, TtsApi, check_status};
use crate::Result;
use crate::api::types::TtsRequest;

#[async_trait]
impl TtsApi for ApiClient {
    /// Returns `audio/mpeg` bytes as produced by the backend
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>> {
        let request = TtsRequest { text, voice };

        let response = self
            .client
            .post(self.endpoint("/api/tts"))
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "synthesized speech");
        Ok(audio.to_vec())
    }
}
