//! Dialogue reply endpoint

use async_trait::async_trait;

use super::{ApiClient, DialogueApi, handle_json};
use crate::Result;
use crate::api::types::{DialogueRequest, DialogueResponse};

#[async_trait]
impl DialogueApi for ApiClient {
    async fn replies(&self, request: &DialogueRequest) -> Result<DialogueResponse> {
        tracing::debug!(question = %request.question_text, "requesting dialogue replies");

        let response = self
            .client
            .post(self.endpoint("/api/dialogue/replies"))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "dialogue request failed");
                e
            })?;

        let replies: DialogueResponse = handle_json(response).await?;
        tracing::debug!(
            intent = %replies.intent,
            replies = replies.top_replies.len(),
            groups = replies.option_groups.len(),
            "dialogue replies received"
        );
        Ok(replies)
    }
}
