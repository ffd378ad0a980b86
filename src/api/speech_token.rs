use async_trait::async_trait;

use super::{ApiClient, SpeechTokenSource, handle_json};
use crate::Result;
use crate::api::types::SpeechToken;

#[async_trait]
impl SpeechTokenSource for ApiClient {
    async fn speech_token(&self) -> Result<SpeechToken> {
        let response = self
            .client
            .get(self.endpoint("/api/speech/token"))
            .send()
            .await?;
        let token: SpeechToken = handle_json(response).await?;

        tracing::debug!(
            region = %token.region,
            expires_in = token.expires_in_seconds,
            "speech token issued"
        );
        Ok(token)
    }
}
