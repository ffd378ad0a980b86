//! Phrase suggestion endpoint

use async_trait::async_trait;

use super::{ApiClient, SuggestionsApi, handle_json};
use crate::Result;
use crate::api::types::{SuggestionsRequest, SuggestionsResponse};

#[async_trait]
impl SuggestionsApi for ApiClient {
    async fn suggest(&self, request: &SuggestionsRequest) -> Result<SuggestionsResponse> {
        tracing::debug!(
            prefix = %request.prefix,
            time_bucket = %request.time_bucket,
            location = %request.location_category,
            "requesting suggestions"
        );

        let response = self
            .client
            .post(self.endpoint("/api/suggestions"))
            .json(request)
            .send()
            .await?;
        handle_json(response).await
    }
}
