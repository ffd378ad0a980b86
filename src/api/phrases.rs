//! Phrase library endpoints

use async_trait::async_trait;

use super::{ApiClient, PhrasesApi, check_status, encode_segment, handle_json};
use crate::Result;
use crate::api::types::{Phrase, PhraseDraft, PhraseFilter};

#[async_trait]
impl PhrasesApi for ApiClient {
    async fn list(&self, filter: &PhraseFilter) -> Result<Vec<Phrase>> {
        let url = self.endpoint_with_query("/api/phrases", &filter.query_pairs())?;
        tracing::debug!(url = %url, "listing phrases");

        let response = self.client.get(url).send().await?;
        handle_json(response).await
    }

    async fn get(&self, id: &str) -> Result<Phrase> {
        let url = self.endpoint(&format!("/api/phrases/{}", encode_segment(id)));
        let response = self.client.get(url).send().await?;
        handle_json(response).await
    }

    async fn create(&self, draft: &PhraseDraft) -> Result<Phrase> {
        let response = self
            .client
            .post(self.endpoint("/api/phrases"))
            .json(draft)
            .send()
            .await?;
        let phrase: Phrase = handle_json(response).await?;

        tracing::info!(id = %phrase.id, category = %phrase.category, "phrase created");
        Ok(phrase)
    }

    async fn update(&self, id: &str, draft: &PhraseDraft) -> Result<Phrase> {
        let url = self.endpoint(&format!("/api/phrases/{}", encode_segment(id)));
        let response = self.client.put(url).json(draft).send().await?;
        let phrase: Phrase = handle_json(response).await?;

        tracing::info!(id = %phrase.id, "phrase updated");
        Ok(phrase)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&format!("/api/phrases/{}", encode_segment(id)));
        let response = self.client.delete(url).send().await?;
        check_status(response).await?;

        tracing::info!(id, "phrase deleted");
        Ok(())
    }
}
